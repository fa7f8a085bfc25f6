//! Signal strength smoothing.

use crate::{Error, Result};

/// Exponential smoothing of signal strength samples.
///
/// The next average moves from the current one towards the new sample by a
/// fixed weight, and is clamped to the interval between the two. The average
/// of any sample sequence therefore stays within the range of its samples,
/// whatever the sign of the values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSmoothing {
    weight: f64,
}

impl SignalSmoothing {
    /// Weight given to the newest sample by default.
    pub const DEFAULT_WEIGHT: f64 = 0.25;

    /// Creates a smoothing policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `0 < weight <= 1`.
    pub fn new(weight: f64) -> Result<Self> {
        if weight.is_finite() && weight > 0.0 && weight <= 1.0 {
            Ok(Self { weight })
        } else {
            Err(Error::InvalidInput(format!(
                "smoothing weight must be in (0, 1], got {weight}"
            )))
        }
    }

    /// Folds `sample` into `average`.
    #[must_use]
    pub fn next(&self, average: f64, sample: i8) -> f64 {
        let sample = f64::from(sample);
        let next = self.weight.mul_add(sample - average, average);
        next.clamp(average.min(sample), average.max(sample))
    }
}

impl Default for SignalSmoothing {
    fn default() -> Self {
        Self {
            weight: Self::DEFAULT_WEIGHT,
        }
    }
}
