//! Loopback interface implemented for testing instruments that send unterminated commands.
//!
//! A response ends when the instrument goes idle, which the loopback simulates by returning one
//! empty read after every scripted response.

use std::{collections::VecDeque, io};

use crate::{InstrumentError, InstrumentInterface, loopback::IncrIndex};

/// An interface that allows you to simply write tests for your instrument driver.
///
/// # Example
///
/// Let us build a simple instrument that sends a `"*IDN?"` command and gets back a string, and
/// then write a test for it using the [`LoopbackInterface`].
///
/// ```
/// use seriallink::{InstrumentError, InstrumentInterface, LoopbackInterface};
///
/// struct MyInstrument<T: InstrumentInterface> {
///    interface: T,
/// }
///
/// impl<T: InstrumentInterface> MyInstrument<T> {
///    fn get_name(&mut self) -> Result<String, InstrumentError> {
///        self.interface.query("*IDN?")
///    }
/// }
///
/// let loopback = LoopbackInterface::from_strs(&["*IDN?"], &["KORAD KA3005P V5.8"]);
/// let mut inst = MyInstrument { interface: loopback };
/// assert_eq!("KORAD KA3005P V5.8", inst.get_name().unwrap());
/// ```
///
/// When the [`LoopbackInterface`] is dropped, it panics if any expected command or scripted
/// response was not used. Writing a command that is not the next expected one panics as well.
pub struct LoopbackInterface {
    from_host: Vec<String>,
    from_inst: Vec<Vec<u8>>,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: Option<VecDeque<u8>>,
    failing_writes: usize,
    failing_cmd: Option<String>,
}

impl LoopbackInterface {
    /// Create a new loopback instrument with given commands to and from instrument.
    ///
    /// The commands are used in order. Responses are given as bytes, as some instruments answer
    /// with binary data, e.g., a status register.
    ///
    /// # Arguments:
    /// * `from_host` - Commands from host to instrument.
    /// * `from_inst` - Responses from instrument to host. An empty response simulates an
    ///   instrument that does not answer at all.
    pub fn new(from_host: Vec<String>, from_inst: Vec<Vec<u8>>) -> Self {
        LoopbackInterface {
            from_host,
            from_inst,
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: None,
            failing_writes: 0,
            failing_cmd: None,
        }
    }

    /// Create a new loopback instrument from string slices.
    pub fn from_strs(from_host: &[&str], from_inst: &[&str]) -> Self {
        Self::new(
            from_host.iter().map(|s| s.to_string()).collect(),
            from_inst.iter().map(|s| s.as_bytes().to_vec()).collect(),
        )
    }

    /// Let the next `count` writes fail with a broken pipe error.
    ///
    /// Failing writes do not consume any expected command.
    pub fn fail_next_writes(&mut self, count: usize) {
        self.failing_writes = count;
        self.failing_cmd = None;
    }

    /// Let the next `count` writes of the given command fail with a broken pipe error.
    ///
    /// Other commands are written as usual. Failing writes do not consume any expected command.
    pub fn fail_command(&mut self, cmd: &str, count: usize) {
        self.failing_writes = count;
        self.failing_cmd = Some(cmd.to_string());
    }

    /// This command panics if not all commands in the [`LoopbackInterface`] have been used.
    ///
    /// It is automatically called when the [`LoopbackInterface`] is dropped, but you can also call
    /// it manually to ensure that all commands have been used.
    pub fn finalize(&mut self) {
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        if let Some(fil) = from_host_leftover {
            panic!("Leftover expected commands found from host to instrument: {fil}");
        }
        if let Some(fil) = from_inst_leftover {
            panic!("Leftover expected responses found from instrument to host: {fil:?}");
        }
    }

    /// Get the next command from host to instrument, or panic.
    fn get_next_from_host(&mut self) -> &str {
        self.from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to instrument.")
    }

    /// Get the next response from instrument to host, or panic.
    fn get_next_from_inst(&mut self) -> &[u8] {
        self.from_inst
            .get(self.from_inst_index.next())
            .expect("No more responses were expected from instrument to host.")
    }
}

impl InstrumentInterface for LoopbackInterface {
    fn write_raw(&mut self, cmd: &[u8]) -> Result<(), InstrumentError> {
        let fails = self
            .failing_cmd
            .as_ref()
            .is_none_or(|failing| failing.as_bytes() == cmd);
        if self.failing_writes > 0 && fails {
            self.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure").into());
        }
        let exp = self.get_next_from_host();
        assert_eq!(
            exp.as_bytes(),
            cmd,
            "Expected sendcmd '{0}', got '{1}'",
            exp,
            String::from_utf8_lossy(cmd)
        );
        Ok(())
    }

    /// Reads the current response byte by byte, loading the next scripted response if no response
    /// is in progress. Once a response is exhausted, one read returns `None`.
    fn read_byte(&mut self) -> Result<Option<u8>, InstrumentError> {
        if self.curr_bytes.is_none() {
            let next: VecDeque<u8> = self.get_next_from_inst().iter().copied().collect();
            self.curr_bytes = Some(next);
        }
        match self.curr_bytes.as_mut().and_then(VecDeque::pop_front) {
            Some(byte) => Ok(Some(byte)),
            None => {
                self.curr_bytes = None;
                Ok(None)
            }
        }
    }
}

impl Drop for LoopbackInterface {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.finalize();
        }
    }
}
