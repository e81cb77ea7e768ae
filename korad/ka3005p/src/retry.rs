//! Bounded retries for single exchanges with the power supply.

use log::warn;
use seriallink::InstrumentError;

/// How often a command or query is attempted before its error is returned.
///
/// Only transient errors (see [`InstrumentError::is_transient`]) are retried. All other errors
/// are returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy with the given number of attempts. Zero attempts is treated as one.
    pub fn new(attempts: u32) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
        }
    }

    /// Total number of attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds, fails permanently, or the attempts are used up.
    pub(crate) fn run<R>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<R, InstrumentError>,
    ) -> Result<R, InstrumentError> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(
                        "'{what}' failed (attempt {attempt} of {}): {err}",
                        self.attempts
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3)
    }
}
