//! SerialLink: talk to instruments that speak unterminated ASCII commands.
//!
//! Some bench instruments, like the Korad KA series power supplies, neither terminate their
//! commands nor their responses. A command is simply written to the port, and a response is
//! whatever the instrument sends back before it goes quiet. This crate provides the
//! [`InstrumentInterface`] trait for exactly this kind of link, the [`InstrumentError`] error
//! type that drivers built on top of it return, and a few implementations:
//!
//! - [`Instrument`]: a generic link over anything that implements [`std::io::Read`] and
//!   [`std::io::Write`].
//! - [`SerialInterface`]: opens a blocking serial port using the [`serialport`] crate (requires
//!   the `serial` feature).
//! - [`LoopbackInterface`]: a scripted instrument simulator to test drivers without hardware.
//!
//! # Reading until idle
//!
//! As there is no terminator, a response is read one byte at a time until a read attempt comes
//! back empty, i.e., until the read timeout of the link expired without any data. The timeout of
//! a link must therefore always be finite. To guard against an instrument that never stops
//! talking, responses are additionally limited to [`MAX_RESPONSE_LEN`] bytes.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![warn(missing_docs)]

mod instrument;
mod loopback;
#[cfg(feature = "serial")]
mod serial;

pub use instrument::Instrument;
pub use loopback::LoopbackInterface;
#[cfg(feature = "serial")]
pub use serial::{SerialInterface, SerialSettings};

use std::time::Duration;

use log::debug;
use thiserror::Error;

/// Maximum number of bytes a single response may contain before it is considered malformed.
pub const MAX_RESPONSE_LEN: usize = 256;

/// The error enum for all instruments.
///
/// Drivers should return this error from every command and query, such that errors propagate
/// nicely with the `?` operator. The variants fall into the following groups:
///
/// - Opening the link failed: [`InstrumentError::Connection`].
/// - Writing a command failed: [`InstrumentError::Command`].
/// - Reading failed or the response made no sense: [`InstrumentError::Io`],
///   [`InstrumentError::Protocol`].
/// - The request itself was invalid: [`InstrumentError::Configuration`] and the range errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// The link to the instrument could not be opened, e.g., because the port does not exist or
    /// is used by another program.
    #[error("Could not open connection to {port}: {source}")]
    Connection {
        /// The port or address that was tried.
        port: String,
        /// The underlying error reported when opening the port.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Writing a command to the instrument failed.
    #[error("Failed to send command '{cmd}': {source}")]
    Command {
        /// The command that could not be written.
        cmd: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Error when reading from an interface. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The response of the instrument was malformed, truncated, or too long. The string describes
    /// what was received and is intended to be displayed to the user.
    #[error("Unexpected response from instrument: {0}")]
    Protocol(String),
    /// The requested operation cannot be carried out with the given parameters, e.g., a sweep
    /// without any values to sweep over.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// The channel index requested is out of range.
    #[error(
        "Channel with index {idx} is out of range. Number of channels available: {nof_channels}"
    )]
    ChannelIndexOutOfRange {
        /// Index of the channel that is out of range.
        idx: usize,
        /// Total number of channels.
        nof_channels: usize,
    },
    /// A given float value is out of the specified range.
    #[error("Float value {value} is out of range. Allowed range is [{min}, {max}]")]
    FloatValueOutOfRange {
        /// The value that is out of range.
        value: f64,
        /// The minimum value that is allowed.
        min: f64,
        /// The maximum value that is allowed.
        max: f64,
    },
}

impl InstrumentError {
    /// Returns `true` if the error concerns a single exchange with the instrument and the
    /// exchange may succeed when it is simply tried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, InstrumentError::Command { .. } | InstrumentError::Io(_))
    }
}

/// The `InstrumentInterface` trait defines the interface for controlling instruments.
///
/// Implementors only need to provide how raw bytes are written and how a single byte is read.
/// Sending commands, reading until idle, and querying are provided on top of these.
pub trait InstrumentInterface {
    /// Write raw bytes to the instrument and flush the interface.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Read a single byte from the instrument.
    ///
    /// Returns `Ok(None)` if the read timeout elapsed without any data being received, i.e., if
    /// the instrument is idle.
    fn read_byte(&mut self) -> Result<Option<u8>, InstrumentError>;

    /// Get the read timeout of the interface.
    ///
    /// The default implementation returns three seconds.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Send a command to the instrument.
    ///
    /// The command is written as is, no terminator is appended. A failed write is reported as
    /// [`InstrumentError::Command`].
    ///
    /// # Arguments:
    /// - `cmd` - A string slice that will be sent to the instrument.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        debug!("-> {cmd}");
        self.write_raw(cmd.as_bytes()).map_err(|err| match err {
            InstrumentError::Io(source) => InstrumentError::Command {
                cmd: cmd.to_string(),
                source,
            },
            other => other,
        })
    }

    /// Read bytes until the instrument goes idle and return them.
    ///
    /// If the instrument does not send anything at all, an empty vector is returned. If the
    /// instrument sends more than [`MAX_RESPONSE_LEN`] bytes, a [`InstrumentError::Protocol`] is
    /// returned.
    fn read_until_idle(&mut self) -> Result<Vec<u8>, InstrumentError> {
        let mut response = Vec::new();
        while let Some(byte) = self.read_byte()? {
            if response.len() == MAX_RESPONSE_LEN {
                return Err(InstrumentError::Protocol(format!(
                    "response exceeds {MAX_RESPONSE_LEN} bytes"
                )));
            }
            response.push(byte);
        }
        debug!("<- {response:?}");
        Ok(response)
    }

    /// Send a command and return the raw bytes of the response.
    ///
    /// # Arguments
    /// * `cmd` - The command to send to the instrument for which we expect a response.
    fn query_raw(&mut self, cmd: &str) -> Result<Vec<u8>, InstrumentError> {
        self.sendcmd(cmd)?;
        self.read_until_idle()
    }

    /// Send a command and return the response as a String.
    ///
    /// Invalid UTF-8 is replaced, surrounding whitespace is trimmed.
    ///
    /// # Arguments
    /// * `cmd` - The command to send to the instrument for which we expect a response.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        let response = self.query_raw(cmd)?;
        Ok(String::from_utf8_lossy(&response).trim().to_string())
    }
}
