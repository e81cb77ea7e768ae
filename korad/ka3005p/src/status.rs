//! Module that contains the status register of the power supply and its meaning.

use std::fmt::Display;

use seriallink::InstrumentError;

/// Regulation mode of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulationMode {
    /// Constant current.
    Cc,
    /// Constant voltage.
    Cv,
}

/// Tracking mode of the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Channels operate independently.
    Independent,
    /// Channels are connected in series.
    Series,
    /// Channels are connected in parallel.
    Parallel,
    /// Bit pattern that is not documented.
    Unknown,
}

/// The status register as returned by `STATUS?`.
///
/// The register is a single byte. Its bits are laid out as follows:
///
/// | Bit | Meaning |
/// |---|---|
/// | 0 | CH1 regulation: 0 = CC, 1 = CV |
/// | 1 | CH2 regulation: 0 = CC, 1 = CV |
/// | 2, 3 | Tracking: 01 = independent, 11 = series, 10 = parallel |
/// | 4 | Beep: 0 = off, 1 = on |
/// | 5 | Lock: 0 = locked, 1 = unlocked |
/// | 6 | Output: 0 = off, 1 = on |
/// | 7 | Not used |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister(u8);

impl StatusRegister {
    /// Interpret the first byte of a `STATUS?` response.
    ///
    /// Any further bytes are ignored. An empty response returns a
    /// [`InstrumentError::Protocol`] error.
    pub fn from_response(response: &[u8]) -> Result<Self, InstrumentError> {
        response
            .first()
            .map(|&raw| StatusRegister(raw))
            .ok_or_else(|| InstrumentError::Protocol("empty response to STATUS?".to_string()))
    }

    /// The raw register value.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// The register rendered as eight binary digits, bit 7 first.
    pub fn bits(&self) -> String {
        format!("{:08b}", self.0)
    }

    /// Regulation mode of channel 1.
    pub fn ch1_mode(&self) -> RegulationMode {
        self.regulation(0)
    }

    /// Regulation mode of channel 2.
    pub fn ch2_mode(&self) -> RegulationMode {
        self.regulation(1)
    }

    /// Tracking mode of the channels.
    pub fn tracking(&self) -> TrackingMode {
        match (self.0 >> 2) & 0b11 {
            0b01 => TrackingMode::Independent,
            0b11 => TrackingMode::Series,
            0b10 => TrackingMode::Parallel,
            _ => TrackingMode::Unknown,
        }
    }

    /// Whether the beeper is on.
    pub fn beep(&self) -> bool {
        self.bit(4)
    }

    /// Whether the front panel is locked.
    pub fn locked(&self) -> bool {
        !self.bit(5)
    }

    /// Whether the output is enabled.
    pub fn output_enabled(&self) -> bool {
        self.bit(6)
    }

    fn bit(&self, idx: u8) -> bool {
        self.0 & (1 << idx) != 0
    }

    fn regulation(&self, idx: u8) -> RegulationMode {
        if self.bit(idx) {
            RegulationMode::Cv
        } else {
            RegulationMode::Cc
        }
    }
}

impl From<u8> for StatusRegister {
    fn from(raw: u8) -> Self {
        StatusRegister(raw)
    }
}

impl Display for StatusRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits())
    }
}
