//! This module provides the main implementation for the Instrument Interface trait.
//!
//! It can be called with any type that implements [`std::io::Read`] and [`std::io::Write`],
//! such as a boxed `serialport::SerialPort`.

use std::{io::ErrorKind, time::Duration};

use crate::{InstrumentError, InstrumentInterface};

/// A general instrument interface that can be built with any interface that implements
/// [`std::io::Read`] and [`std::io::Write`].
///
/// The port must be configured with a finite read timeout by the caller: a read that times out,
/// would block, or returns zero bytes is what tells the [`Instrument`] that the response is
/// complete. The `timeout` passed here is only informational and returned by
/// [`InstrumentInterface::get_timeout`].
///
/// # Example
///
/// ```
/// use std::{collections::VecDeque, time::Duration};
///
/// use seriallink::{Instrument, InstrumentInterface};
///
/// let port = VecDeque::from(b"KORAD KA3005P V5.8 SN:03379314".to_vec());
/// let mut inst = Instrument::new(port, Duration::from_secs(10));
/// let response = inst.read_until_idle().unwrap();
/// assert_eq!(response, b"KORAD KA3005P V5.8 SN:03379314");
/// ```
pub struct Instrument<P: std::io::Read + std::io::Write> {
    port: P,
    timeout: Duration,
}

impl<P: std::io::Read + std::io::Write> Instrument<P> {
    /// Create a new instance of [`Instrument`] with a given port.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Consume the instrument and return the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: std::io::Read + std::io::Write> InstrumentInterface for Instrument<P> {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, InstrumentError> {
        let mut single_buf = [0u8];
        loop {
            match self.port.read(&mut single_buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(single_buf[0])),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }
}
