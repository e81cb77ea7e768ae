//! Decimal setpoints that are sent to the power supply exactly as written.

use std::{fmt::Display, str::FromStr};

use seriallink::InstrumentError;

/// Maximum number of decimals a setpoint is written with.
pub(crate) const MAX_DECIMALS: usize = 6;

/// A voltage or current setpoint together with the number of decimals it is written with.
///
/// The power supply accepts values like `5`, `0.30`, or `12.0` and they should reach the
/// instrument in exactly that form. Parsing a [`Setpoint`] from a string therefore keeps the
/// number of decimals, and [`Display`] writes it back the same way.
///
/// ```
/// use korad_ka3005p::Setpoint;
///
/// let current: Setpoint = "0.30".parse().unwrap();
/// assert_eq!(current.to_string(), "0.30");
/// assert_eq!(Setpoint::new(12.2, 1).to_string(), "12.2");
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Setpoint {
    value: f64,
    decimals: usize,
}

impl Setpoint {
    /// Create a new setpoint with the given number of decimals.
    ///
    /// The number of decimals is capped at six.
    pub fn new(value: f64, decimals: usize) -> Self {
        Setpoint {
            value,
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    /// Numeric value of the setpoint.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Number of decimals the setpoint is written with.
    pub fn decimals(&self) -> usize {
        self.decimals
    }
}

impl Display for Setpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.*}", self.decimals, self.value)
    }
}

impl FromStr for Setpoint {
    type Err = InstrumentError;

    /// Parse plain decimal notation, e.g. `5`, `0.30`, or `12.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || InstrumentError::Configuration(format!("'{s}' is not a decimal value"));
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
            return Err(invalid());
        }
        let value: f64 = s.parse().map_err(|_| invalid())?;
        let decimals = s.split_once('.').map_or(0, |(_, frac)| frac.len());
        if decimals > MAX_DECIMALS {
            return Err(InstrumentError::Configuration(format!(
                "'{s}' has more than {MAX_DECIMALS} decimals"
            )));
        }
        Ok(Setpoint { value, decimals })
    }
}

/// Smallest number of decimals, at least one, that represents all given values.
pub(crate) fn decimals_for(values: &[f64]) -> usize {
    values
        .iter()
        .map(|&value| {
            (1..=MAX_DECIMALS)
                .find(|&d| {
                    let scaled = value * 10f64.powi(d as i32);
                    (scaled - scaled.round()).abs() < 1e-6
                })
                .unwrap_or(MAX_DECIMALS)
        })
        .max()
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_decimals() {
        for s in ["5", "0.30", "12.0", "0.00", "30.000"] {
            assert_eq!(s.parse::<Setpoint>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_parse_invalid() {
        for s in ["", "abc", "1e3", "1.2.3", "NaN", "inf", "0.1234567"] {
            assert!(s.parse::<Setpoint>().is_err(), "'{s}' should not parse");
        }
    }

    #[test]
    fn test_new_caps_decimals() {
        assert_eq!(Setpoint::new(1.0, 12).decimals(), MAX_DECIMALS);
    }

    #[test]
    fn test_decimals_for() {
        assert_eq!(decimals_for(&[12.0, 0.2]), 1);
        assert_eq!(decimals_for(&[12.0, 0.05]), 2);
        assert_eq!(decimals_for(&[1.125, 0.5]), 3);
        assert_eq!(decimals_for(&[]), 1);
    }
}
