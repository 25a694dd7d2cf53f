//! Soft and hard parameter limits
//!
//! Every parameter carries two nested intervals: the soft bounds `[min, max]`
//! an engine is allowed to explore, and the hard limits `[hard_min, hard_max]`
//! outside of which the model function is not valid. Whenever a parameter is
//! in use the nesting `hard_min <= min <= value <= max <= hard_max` holds.

use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when validating parameter limits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimitsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvertedBounds { min: f64, max: f64 },

    #[error("Bounds [{min}, {max}] fall outside hard limits [{hard_min}, {hard_max}]")]
    OutsideHardLimits {
        min: f64,
        max: f64,
        hard_min: f64,
        hard_max: f64,
    },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Non-finite parameter value {value} is not allowed")]
    NonFiniteValue { value: f64 },
}

/// The soft bounds and hard limits of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Lower soft bound
    pub min: f64,

    /// Upper soft bound
    pub max: f64,

    /// Lower validity limit
    pub hard_min: f64,

    /// Upper validity limit
    pub hard_max: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
            hard_min: NEG_INFINITY,
            hard_max: INFINITY,
        }
    }
}

impl Limits {
    /// Build limits from a function's default table.
    ///
    /// NaN hard limits mean "no limit" and inverted hard limits are swapped.
    /// NaN soft bounds fall back to the corresponding hard limit. The soft
    /// bounds must then nest inside the hard limits and `value` must lie
    /// within the soft bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use specfit_rs::parameters::limits::Limits;
    ///
    /// // hard limits (5, NaN) mean "at least 5"; soft max NaN falls back to it
    /// let limits = Limits::from_defaults(6.0, 5.5, f64::NAN, 5.0, f64::NAN).unwrap();
    /// assert_eq!(limits.hard_min, 5.0);
    /// assert_eq!(limits.hard_max, f64::INFINITY);
    /// assert_eq!(limits.max, f64::INFINITY);
    /// ```
    pub fn from_defaults(
        value: f64,
        min: f64,
        max: f64,
        hard_min: f64,
        hard_max: f64,
    ) -> Result<Self, LimitsError> {
        let mut hard_min = if hard_min.is_nan() { NEG_INFINITY } else { hard_min };
        let mut hard_max = if hard_max.is_nan() { INFINITY } else { hard_max };
        if hard_min > hard_max {
            std::mem::swap(&mut hard_min, &mut hard_max);
        }

        let min = if min.is_nan() { hard_min } else { min };
        let max = if max.is_nan() { hard_max } else { max };

        let limits = Self {
            min,
            max,
            hard_min,
            hard_max,
        };
        limits.check_soft(min, max)?;
        limits.check_value(value)?;
        Ok(limits)
    }

    /// Validate a proposed pair of soft bounds against the hard limits.
    pub fn check_soft(&self, min: f64, max: f64) -> Result<(), LimitsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(LimitsError::InvertedBounds { min, max });
        }
        if min < self.hard_min || max > self.hard_max {
            return Err(LimitsError::OutsideHardLimits {
                min,
                max,
                hard_min: self.hard_min,
                hard_max: self.hard_max,
            });
        }
        Ok(())
    }

    /// Validate a value against the soft bounds.
    pub fn check_value(&self, value: f64) -> Result<(), LimitsError> {
        if !value.is_finite() {
            return Err(LimitsError::NonFiniteValue { value });
        }
        if !self.contains(value) {
            return Err(LimitsError::ValueOutsideBounds {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Replace the soft bounds, keeping the hard limits.
    pub fn with_soft(&self, min: f64, max: f64) -> Result<Self, LimitsError> {
        self.check_soft(min, max)?;
        Ok(Self { min, max, ..*self })
    }

    /// Check if a value lies within the soft bounds
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if a value lies within the hard limits
    pub fn within_hard(&self, value: f64) -> bool {
        value.is_finite() && value >= self.hard_min && value <= self.hard_max
    }

    /// Clamp a value into the soft bounds
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_hard_limits_mean_unbounded() {
        let limits = Limits::from_defaults(1.0, 0.0, 2.0, f64::NAN, f64::NAN).unwrap();
        assert_eq!(limits.hard_min, NEG_INFINITY);
        assert_eq!(limits.hard_max, INFINITY);
        assert_eq!(limits.min, 0.0);
        assert_eq!(limits.max, 2.0);
    }

    #[test]
    fn test_inverted_hard_limits_are_swapped() {
        let limits = Limits::from_defaults(1.0, 0.0, 2.0, 5.0, -5.0).unwrap();
        assert_eq!(limits.hard_min, -5.0);
        assert_eq!(limits.hard_max, 5.0);
    }

    #[test]
    fn test_soft_bounds_outside_hard_rejected() {
        let err = Limits::from_defaults(1.0, -1.0, 2.0, 0.0, 10.0).unwrap_err();
        assert!(matches!(err, LimitsError::OutsideHardLimits { .. }));
    }

    #[test]
    fn test_value_outside_soft_rejected() {
        let err = Limits::from_defaults(3.0, 0.0, 2.0, 0.0, 10.0).unwrap_err();
        assert_eq!(
            err,
            LimitsError::ValueOutsideBounds {
                value: 3.0,
                min: 0.0,
                max: 2.0
            }
        );
    }

    #[test]
    fn test_with_soft() {
        let limits = Limits::from_defaults(1.0, 0.0, 2.0, 0.0, 10.0).unwrap();
        let widened = limits.with_soft(0.0, 8.0).unwrap();
        assert_eq!(widened.max, 8.0);
        assert_eq!(widened.hard_max, 10.0);

        assert!(limits.with_soft(3.0, 1.0).is_err());
        assert!(limits.with_soft(0.0, 11.0).is_err());
    }

    #[test]
    fn test_clamp_and_contains() {
        let limits = Limits::from_defaults(0.5, 0.0, 1.0, NEG_INFINITY, INFINITY).unwrap();
        assert_eq!(limits.clamp(-1.0), 0.0);
        assert_eq!(limits.clamp(2.0), 1.0);
        assert_eq!(limits.clamp(0.3), 0.3);
        assert!(limits.contains(1.0));
        assert!(!limits.contains(1.0001));
        assert!(limits.within_hard(1e300));
        assert!(!limits.within_hard(f64::NAN));
    }
}
