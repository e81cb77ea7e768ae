//! A complete sweep session: identify the supply, initialize it, sweep, and shut down.

use std::time::Duration;

use log::{error, info, warn};
use seriallink::{InstrumentError, InstrumentInterface};

use crate::{
    Channel, Ka3005p, RetryPolicy, Setpoint, SnakeIndices, StatusRegister, VoltageSweep,
};

/// Largest deviation between a written and a read back voltage setpoint, in volts.
const VERIFY_TOLERANCE: f64 = 0.005;

/// Something that can pause the session for a settling delay.
pub trait Sleeper {
    /// Block for the given duration.
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Settling delays of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Delays {
    /// After the port was opened and before the first query.
    pub after_open: Duration,
    /// After the output was switched off during initialization.
    pub after_output_off: Duration,
    /// After the initial voltage was set.
    pub after_voltage: Duration,
    /// After the current limit was set.
    pub after_current: Duration,
    /// After the output was switched on.
    pub after_output_on: Duration,
    /// After each voltage of the sweep.
    pub sweep_step: Duration,
    /// After the shutdown voltage was set, before the output is switched off.
    pub after_shutdown_voltage: Duration,
}

impl Default for Delays {
    fn default() -> Self {
        Delays {
            after_open: Duration::from_secs(1),
            after_output_off: Duration::from_secs(2),
            after_voltage: Duration::from_secs(2),
            after_current: Duration::from_millis(500),
            after_output_on: Duration::from_secs(5),
            sweep_step: Duration::from_secs(3),
            after_shutdown_voltage: Duration::from_secs(1),
        }
    }
}

/// Everything a session needs to know, built once before the session starts.
///
/// The default sweeps from 12.0 V up to (excluding) 12.4 V in 0.2 V steps, three cycles, with
/// the output initialized to 5 V and 0.30 A.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// First voltage of the sweep.
    pub sweep_start: f64,
    /// Exclusive upper bound of the sweep.
    pub sweep_bound: f64,
    /// Voltage increment of the sweep.
    pub sweep_step: f64,
    /// How often the sweep is walked up and down.
    pub cycles: usize,
    /// Voltage set during initialization, before the output is switched on.
    pub initial_voltage: Setpoint,
    /// Current limit set during initialization.
    pub current_limit: Setpoint,
    /// Voltage set before the output is switched off at the end.
    pub shutdown_voltage: Setpoint,
    /// Settling delays.
    pub delays: Delays,
    /// How often each command is attempted.
    pub retry_attempts: u32,
    /// Read back each sweep voltage after it settled and fail if it does not match.
    pub verify_setpoints: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            sweep_start: 12.0,
            sweep_bound: 12.4,
            sweep_step: 0.2,
            cycles: 3,
            initial_voltage: Setpoint::new(5.0, 0),
            current_limit: Setpoint::new(0.3, 2),
            shutdown_voltage: Setpoint::new(0.0, 2),
            delays: Delays::default(),
            retry_attempts: 3,
            verify_setpoints: false,
        }
    }
}

/// What was learned about the power supply during a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Identity string of the supply.
    pub identity: String,
    /// Status register read before initialization.
    pub status: StatusRegister,
    /// Number of sweep voltages that were set.
    pub steps: usize,
}

/// A validated sweep session, split into the identification and the sweep itself.
///
/// Creating the session checks the sweep parameters, so invalid parameters are reported before
/// anything is sent to the supply.
///
/// ```
/// use korad_ka3005p::{Session, SessionConfig};
///
/// let config = SessionConfig {
///     sweep_bound: 12.1,
///     ..Default::default()
/// };
/// // a single sweep value cannot be walked back and forth
/// assert!(Session::new(&config).is_err());
/// ```
#[derive(Debug)]
pub struct Session<'a> {
    config: &'a SessionConfig,
    sweep: VoltageSweep,
}

impl<'a> Session<'a> {
    /// Validate the sweep of the given configuration.
    pub fn new(config: &'a SessionConfig) -> Result<Self, InstrumentError> {
        let sweep =
            VoltageSweep::try_new(config.sweep_start, config.sweep_bound, config.sweep_step)?;
        SnakeIndices::try_new(sweep.len(), config.cycles)?;
        Ok(Session { config, sweep })
    }

    /// Wait for the port to settle, then query identity and status of the supply.
    ///
    /// Also applies the retry policy of the configuration to the driver. Nothing is changed on
    /// the supply.
    pub fn identify<T, S>(
        &self,
        psu: &mut Ka3005p<T>,
        sleeper: &mut S,
    ) -> Result<(String, StatusRegister), InstrumentError>
    where
        T: InstrumentInterface,
        S: Sleeper,
    {
        psu.set_retry_policy(RetryPolicy::new(self.config.retry_attempts));
        sleeper.sleep(self.config.delays.after_open);
        let identity = psu.get_name()?;
        info!("Power supply ID: {identity}");
        let status = psu.get_status()?;
        info!("Power supply status bits [7:0]: {status}");
        Ok((identity, status))
    }

    /// Initialize the output, walk the sweep back and forth, and shut down. Returns the number
    /// of sweep voltages that were set.
    ///
    /// Once the initialization has started, the shutdown is attempted on every exit path, also
    /// if a command fails or the session panics. The first error is returned; a failing shutdown
    /// after an earlier error is only logged.
    pub fn sweep<T, S>(
        &self,
        psu: &mut Ka3005p<T>,
        sleeper: &mut S,
    ) -> Result<usize, InstrumentError>
    where
        T: InstrumentInterface,
        S: Sleeper,
    {
        let steps = self.sweep.snake(self.config.cycles)?;
        info!(
            "Sweeping over {} for {} cycles",
            self.sweep
                .values()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.config.cycles
        );
        let channel = psu.get_channel(0)?;

        let mut guard = ShutdownGuard {
            psu,
            channel,
            config: self.config,
            sleeper,
            armed: true,
        };
        guard.initialize()?;
        let mut count = 0;
        for setpoint in steps {
            guard.step(setpoint)?;
            count += 1;
        }
        guard.finish()?;
        Ok(count)
    }
}

/// Run a full sweep session: [`Session::identify`] followed by [`Session::sweep`].
pub fn run_session<T, S>(
    psu: &mut Ka3005p<T>,
    config: &SessionConfig,
    sleeper: &mut S,
) -> Result<SessionReport, InstrumentError>
where
    T: InstrumentInterface,
    S: Sleeper,
{
    let session = Session::new(config)?;
    let (identity, status) = session.identify(psu, sleeper)?;
    let steps = session.sweep(psu, sleeper)?;
    Ok(SessionReport {
        identity,
        status,
        steps,
    })
}

/// Owns the supply while its output may be live and shuts it down when dropped while armed.
struct ShutdownGuard<'a, T: InstrumentInterface, S: Sleeper> {
    psu: &'a mut Ka3005p<T>,
    channel: Channel<T>,
    config: &'a SessionConfig,
    sleeper: &'a mut S,
    armed: bool,
}

impl<T: InstrumentInterface, S: Sleeper> ShutdownGuard<'_, T, S> {
    fn initialize(&mut self) -> Result<(), InstrumentError> {
        let delays = &self.config.delays;
        info!("Initializing the power supply");
        self.psu.set_output(false)?;
        self.sleeper.sleep(delays.after_output_off);
        self.channel.set_voltage(self.config.initial_voltage)?;
        self.sleeper.sleep(delays.after_voltage);
        self.channel.set_current(self.config.current_limit)?;
        self.sleeper.sleep(delays.after_current);
        self.psu.set_output(true)?;
        self.sleeper.sleep(delays.after_output_on);
        Ok(())
    }

    fn step(&mut self, setpoint: Setpoint) -> Result<(), InstrumentError> {
        self.channel.set_voltage(setpoint)?;
        info!("Power supply voltage: {setpoint}");
        self.sleeper.sleep(self.config.delays.sweep_step);
        if self.config.verify_setpoints {
            let readback = self.channel.get_voltage_setpoint()?;
            if (readback - setpoint.value()).abs() > VERIFY_TOLERANCE {
                return Err(InstrumentError::Protocol(format!(
                    "voltage setpoint reads back as {readback} V instead of {setpoint} V"
                )));
            }
        }
        Ok(())
    }

    /// Set the shutdown voltage and switch the output off. The output is switched off even if
    /// setting the voltage failed.
    fn shutdown(&mut self) -> Result<(), InstrumentError> {
        self.armed = false;
        info!("Shutting down the power supply");
        let voltage = self.channel.set_voltage(self.config.shutdown_voltage);
        if voltage.is_ok() {
            self.sleeper.sleep(self.config.delays.after_shutdown_voltage);
        }
        let output = self.psu.set_output(false);
        voltage.and(output)
    }

    fn finish(mut self) -> Result<(), InstrumentError> {
        self.shutdown()
    }
}

impl<T: InstrumentInterface, S: Sleeper> Drop for ShutdownGuard<'_, T, S> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Session aborted, attempting shutdown");
            if let Err(err) = self.shutdown() {
                error!("Shutdown failed, the output may still be live: {err}");
            }
        }
    }
}
