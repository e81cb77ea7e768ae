//! Voltage sweeps and the back-and-forth ("snake") order in which they are visited.

use seriallink::InstrumentError;

use crate::setpoint::{Setpoint, decimals_for};

/// Upper limit for the number of values in a sweep.
pub const MAX_SWEEP_LEN: usize = 10_000;

/// Relative tolerance within which the number of steps is considered to be an integer.
const STEP_COUNT_TOLERANCE: f64 = 1e-9;

/// An ordered list of voltages from a start value up to, but excluding, an upper bound.
///
/// The values are computed as `start + i * step` for `i` in `0..count`, where `count` is the
/// number of steps that fit below the bound. If the span between start and bound is an integer
/// multiple of the step (within floating point noise), the bound itself is excluded.
///
/// ```
/// use korad_ka3005p::VoltageSweep;
///
/// let sweep = VoltageSweep::try_new(12.0, 12.4, 0.2).unwrap();
/// let values: Vec<String> = sweep.values().iter().map(|v| v.to_string()).collect();
/// assert_eq!(values, ["12.0", "12.2"]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct VoltageSweep {
    values: Vec<Setpoint>,
}

impl VoltageSweep {
    /// Create a new sweep.
    ///
    /// All values are written with the number of decimals required by `start` and `step`, but at
    /// least one. A [`InstrumentError::Configuration`] error is returned if any parameter is not
    /// finite, the step is not positive, the start is not below the bound, or the sweep would
    /// contain more than [`MAX_SWEEP_LEN`] values.
    ///
    /// # Arguments
    /// - `start`: First voltage of the sweep.
    /// - `bound`: Exclusive upper bound.
    /// - `step`: Increment between two consecutive voltages.
    pub fn try_new(start: f64, bound: f64, step: f64) -> Result<Self, InstrumentError> {
        if !(start.is_finite() && bound.is_finite() && step.is_finite()) {
            return Err(InstrumentError::Configuration(
                "sweep parameters must be finite".to_string(),
            ));
        }
        if step <= 0.0 {
            return Err(InstrumentError::Configuration(format!(
                "sweep step must be positive, got {step}"
            )));
        }
        if start >= bound {
            return Err(InstrumentError::Configuration(format!(
                "sweep start {start} must be below the bound {bound}"
            )));
        }

        let span = (bound - start) / step;
        let nearest = span.round();
        let count = if (span - nearest).abs() <= STEP_COUNT_TOLERANCE * nearest.max(1.0) {
            nearest
        } else {
            span.ceil()
        }
        .max(1.0);
        if count > MAX_SWEEP_LEN as f64 {
            return Err(InstrumentError::Configuration(format!(
                "sweep would contain more than {MAX_SWEEP_LEN} values"
            )));
        }

        let decimals = decimals_for(&[start, step]);
        let values = (0..count as usize)
            .map(|i| Setpoint::new(start + i as f64 * step, decimals))
            .collect();
        Ok(VoltageSweep { values })
    }

    /// The voltages of the sweep in ascending order.
    pub fn values(&self) -> &[Setpoint] {
        &self.values
    }

    /// Number of voltages in the sweep.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sweep contains no voltages. A successfully created sweep is never empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Visit the sweep back and forth for the given number of cycles.
    ///
    /// See [`SnakeIndices`] for the order in which the values are visited.
    pub fn snake(
        &self,
        cycles: usize,
    ) -> Result<impl Iterator<Item = Setpoint> + '_, InstrumentError> {
        let indices = SnakeIndices::try_new(self.len(), cycles)?;
        Ok(indices.map(|idx| self.values[idx]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

/// Indices that walk forward to the end of a list, back to its start, and so on.
///
/// For a list of length `len` and `cycles` cycles, `len * cycles + 1` indices are produced,
/// starting at zero and reversing direction at either end of the list. For a list of length 3 and
/// two cycles, this yields `0, 1, 2, 1, 0, 1, 2`.
#[derive(Debug, Clone)]
pub struct SnakeIndices {
    len: usize,
    idx: usize,
    direction: Direction,
    remaining: usize,
}

impl SnakeIndices {
    /// Create new snake indices.
    ///
    /// A list with fewer than two elements cannot be walked back and forth and returns a
    /// [`InstrumentError::Configuration`] error.
    pub fn try_new(len: usize, cycles: usize) -> Result<Self, InstrumentError> {
        if len < 2 {
            return Err(InstrumentError::Configuration(format!(
                "a snake sweep needs at least two values, got {len}"
            )));
        }
        let remaining = len
            .checked_mul(cycles)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| {
                InstrumentError::Configuration(format!("{cycles} cycles is too many"))
            })?;
        Ok(SnakeIndices {
            len,
            idx: 0,
            direction: Direction::Ascending,
            remaining,
        })
    }
}

impl Iterator for SnakeIndices {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.idx;
        match self.direction {
            Direction::Ascending if self.idx + 1 == self.len => {
                self.direction = Direction::Descending;
                self.idx -= 1;
            }
            Direction::Ascending => self.idx += 1,
            Direction::Descending if self.idx == 0 => {
                self.direction = Direction::Ascending;
                self.idx += 1;
            }
            Direction::Descending => self.idx -= 1,
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SnakeIndices {}
