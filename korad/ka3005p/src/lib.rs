//! A rust driver for the Korad KA3005P programmable power supply.
//!
//! The KA3005P (30 V, 5 A) is controlled over RS-232 or USB-serial with short ASCII commands.
//! Neither commands nor responses are terminated: commands are simply written, and a response is
//! complete once the instrument stops sending. The serial port must be set up with 9600 baud,
//! 8 data bits, no parity, and one stop bit.
//!
//! Besides the driver itself, this crate contains the building blocks of a voltage sweep: a
//! [`VoltageSweep`], the back-and-forth [`SnakeIndices`] it is visited in, and [`run_session`],
//! which drives a full session from the identity query to switching the output off again.
//!
//! # Example
//!
//! ```no_run
//! use seriallink::SerialInterface;
//! use korad_ka3005p::{Ka3005p, Setpoint};
//!
//! let interface = SerialInterface::simple("/dev/ttyUSB0", 9600).unwrap();
//! let mut psu = Ka3005p::new(interface);
//! println!("Power supply: {}", psu.get_name().unwrap());
//!
//! let mut ch1 = psu.get_channel(0).unwrap();
//! ch1.set_voltage(Setpoint::new(5.0, 2)).unwrap();
//! psu.set_output(true).unwrap();
//! ```

#![warn(missing_docs)]

mod retry;
mod session;
mod setpoint;
mod status;
mod sweep;

pub use retry::RetryPolicy;
pub use session::{
    Delays, Session, SessionConfig, SessionReport, Sleeper, ThreadSleeper, run_session,
};
pub use setpoint::Setpoint;
pub use status::{RegulationMode, StatusRegister, TrackingMode};
pub use sweep::{MAX_SWEEP_LEN, SnakeIndices, VoltageSweep};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use seriallink::{InstrumentError, InstrumentInterface};

/// Maximum voltage setpoint in volts.
pub const MAX_VOLTAGE: f64 = 31.0;
/// Maximum current setpoint in amperes.
pub const MAX_CURRENT: f64 = 5.1;

/// A rust driver for the KA3005P.
///
/// To talk to the power supply, you have to first define what interface you want to use. For
/// example, you can use a blocking serial interface using [`seriallink::SerialInterface`]. All
/// commands that fail transiently, e.g., because a write to the port failed, are retried
/// according to the [`RetryPolicy`] of the driver.
pub struct Ka3005p<T: InstrumentInterface> {
    interface: Arc<Mutex<T>>,
    num_channels: usize,
    retry: RetryPolicy,
}

impl<T: InstrumentInterface> Ka3005p<T> {
    /// Create a new KA3005P instance with the given instrument interface.
    pub fn new(interface: T) -> Self {
        Ka3005p {
            interface: Arc::new(Mutex::new(interface)),
            num_channels: 1, // the KA3005P is a single channel supply
            retry: RetryPolicy::default(),
        }
    }

    /// Get a new channel with a given index for the Channel.
    ///
    /// Please note that channels are zero-indexed, while the instrument numbers them starting
    /// at one. Channel 0 therefore sends `VSET1`, etc.
    pub fn get_channel(&self, idx: usize) -> Result<Channel<T>, InstrumentError> {
        if idx >= self.num_channels {
            return Err(InstrumentError::ChannelIndexOutOfRange {
                idx,
                nof_channels: self.num_channels,
            });
        }
        Ok(Channel::new(idx, Arc::clone(&self.interface), self.retry))
    }

    /// Set the number of channels, e.g., to control a two channel supply of the same series.
    pub fn set_num_channels(&mut self, num: usize) {
        self.num_channels = num;
    }

    /// Set the retry policy for this instrument and all channels created afterwards.
    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Query the identity of the power supply, e.g., `KORAD KA3005P V5.8 SN:03379314`.
    ///
    /// The response is not validated, whatever the instrument sends is returned.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        let resp = self.query_raw("*IDN?")?;
        Ok(String::from_utf8_lossy(&resp).trim().to_string())
    }

    /// Query the status register of the power supply.
    pub fn get_status(&mut self) -> Result<StatusRegister, InstrumentError> {
        let resp = self.query_raw("STATUS?")?;
        StatusRegister::from_response(&resp)
    }

    /// Enable or disable the output.
    pub fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(if on { "OUT1" } else { "OUT0" })
    }

    /// Switch the beeper on or off.
    pub fn set_beep(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(if on { "BEEP1" } else { "BEEP0" })
    }

    /// Enable or disable the over-current protection.
    pub fn set_ocp(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(if on { "OCP1" } else { "OCP0" })
    }

    /// Enable or disable the over-voltage protection.
    pub fn set_ovp(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.sendcmd(if on { "OVP1" } else { "OVP0" })
    }

    /// Send a command to the instrument.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        sendcmd(&self.interface, &self.retry, cmd)
    }

    /// Query the instrument and return the raw response.
    fn query_raw(&mut self, cmd: &str) -> Result<Vec<u8>, InstrumentError> {
        query_raw(&self.interface, &self.retry, cmd)
    }
}

/// Channel structure representing a single output channel of the power supply.
///
/// The channel can only be created through the [`Ka3005p`] struct. This is to ensure that the
/// channel is always initialized with a valid interface.
pub struct Channel<T: InstrumentInterface> {
    idx: usize,
    interface: Arc<Mutex<T>>,
    retry: RetryPolicy,
}

impl<T: InstrumentInterface> Channel<T> {
    /// Set the output voltage of this channel.
    ///
    /// The setpoint is sent exactly as it is displayed, e.g. `VSET1:12.0`.
    pub fn set_voltage(&mut self, volts: Setpoint) -> Result<(), InstrumentError> {
        check_range(volts, MAX_VOLTAGE)?;
        self.sendcmd(&format!("VSET{}:{volts}", self.number()))
    }

    /// Set the current limit of this channel.
    pub fn set_current(&mut self, amps: Setpoint) -> Result<(), InstrumentError> {
        check_range(amps, MAX_CURRENT)?;
        self.sendcmd(&format!("ISET{}:{amps}", self.number()))
    }

    /// Read back the voltage setpoint in volts.
    pub fn get_voltage_setpoint(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("VSET")
    }

    /// Read back the current limit in amperes.
    pub fn get_current_setpoint(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("ISET")
    }

    /// Measure the actual output voltage in volts.
    pub fn get_voltage(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("VOUT")
    }

    /// Measure the actual output current in amperes.
    pub fn get_current(&mut self) -> Result<f64, InstrumentError> {
        self.query_f64("IOUT")
    }

    /// Get a new channel for the given instrument interface.
    ///
    /// This function can only be called from inside of the `Ka3005p` struct.
    fn new(idx: usize, interface: Arc<Mutex<T>>, retry: RetryPolicy) -> Self {
        Channel {
            idx,
            interface,
            retry,
        }
    }

    /// Channel number as used by the instrument.
    fn number(&self) -> usize {
        self.idx + 1
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        sendcmd(&self.interface, &self.retry, cmd)
    }

    /// Query `{cmd}{n}?` and parse the response as a decimal value.
    fn query_f64(&mut self, cmd: &str) -> Result<f64, InstrumentError> {
        let cmd = format!("{cmd}{}?", self.number());
        let resp = query_raw(&self.interface, &self.retry, &cmd)?;
        let text = String::from_utf8_lossy(&resp);
        text.trim().parse().map_err(|_| {
            InstrumentError::Protocol(format!("expected a decimal value for {cmd}, got '{text}'"))
        })
    }
}

fn check_range(setpoint: Setpoint, max: f64) -> Result<(), InstrumentError> {
    let value = setpoint.value();
    if !(0.0..=max).contains(&value) {
        return Err(InstrumentError::FloatValueOutOfRange {
            value,
            min: 0.0,
            max,
        });
    }
    Ok(())
}

/// Lock the shared interface, ignoring poisoning: the shutdown of a session must still reach the
/// supply after a panic inside the interface.
fn lock<T>(interface: &Mutex<T>) -> MutexGuard<'_, T> {
    interface.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sendcmd<T: InstrumentInterface>(
    interface: &Mutex<T>,
    retry: &RetryPolicy,
    cmd: &str,
) -> Result<(), InstrumentError> {
    retry.run(cmd, || lock(interface).sendcmd(cmd))
}

fn query_raw<T: InstrumentInterface>(
    interface: &Mutex<T>,
    retry: &RetryPolicy,
    cmd: &str,
) -> Result<Vec<u8>, InstrumentError> {
    retry.run(cmd, || lock(interface).query_raw(cmd))
}
