//! The loopback module provides an instrument simulator for testing purposes.
//!
//! The [`LoopbackInterface`] checks every command the driver writes against a list of expected
//! commands and answers reads from a list of scripted responses. Each response is followed by an
//! idle read, just like a real instrument that goes quiet after answering.
//!
//! Check out the [`LoopbackInterface`] for more details and an example on how to use it.

mod loopback_interface;

pub use loopback_interface::*;

/// A self-incrementing index structure that by default starts at 0 and increments whenever `next`
/// is called.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}
