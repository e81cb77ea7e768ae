//! This module provides the implementation for an instrument controlled via a serial port.
//!
//! It includes a blocking implementation using the `serialport` crate.

use std::time::Duration;

use log::info;
use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::{Instrument, InstrumentError};

/// Serial parameters used to open a port.
///
/// The default matches the Korad KA series: 9600 baud, 8 data bits, no parity, one stop bit, and
/// a read timeout of ten seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialSettings {
    /// Name of the port, e.g., `/dev/ttyUSB0` or `COM1`.
    pub port: String,
    /// Baud rate.
    pub baud: u32,
    /// Number of data bits.
    pub data_bits: DataBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Number of stop bits.
    pub stop_bits: StopBits,
    /// Read timeout. A response is considered complete once a read times out.
    pub timeout: Duration,
}

impl SerialSettings {
    /// Create settings for the given port with all other parameters set to their defaults.
    pub fn new(port: &str) -> Self {
        SerialSettings {
            port: port.to_string(),
            ..Default::default()
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            port: String::new(),
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A blocking serial port implementation using the `serialport` crate.
///
/// The port is closed when the returned [`Instrument`] is dropped.
#[derive(Debug)]
pub struct SerialInterface {}

impl SerialInterface {
    /// Try to open a serial port with the given settings.
    ///
    /// A zero timeout is rejected: reading until idle relies on a finite, non-zero timeout.
    ///
    /// # Arguments
    /// * `settings` - Port name and serial parameters.
    pub fn open(
        settings: &SerialSettings,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        if settings.timeout.is_zero() {
            return Err(InstrumentError::Configuration(
                "serial read timeout must be larger than zero".to_string(),
            ));
        }
        let port = serialport::new(&settings.port, settings.baud)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(settings.timeout)
            .open()
            .map_err(|err| InstrumentError::Connection {
                port: settings.port.clone(),
                source: Box::new(err),
            })?;
        info!(
            "Opened {} at {} baud, timeout {:?}",
            settings.port, settings.baud, settings.timeout
        );
        Ok(Instrument::new(port, settings.timeout))
    }

    /// Open a serial port with the given name and baud rate, using default settings otherwise.
    ///
    /// # Arguments
    /// * `port` - Name of the port.
    /// * `baud` - Baud rate.
    pub fn simple(
        port: &str,
        baud: u32,
    ) -> Result<Instrument<Box<dyn SerialPort>>, InstrumentError> {
        let settings = SerialSettings {
            baud,
            ..SerialSettings::new(port)
        };
        Self::open(&settings)
    }
}
