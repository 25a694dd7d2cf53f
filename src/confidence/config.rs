//! Configuration for the confidence-limit search.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Statistic increment for a 90% interval on one interesting parameter.
pub const DEFAULT_DELTA: f64 = 2.706;

/// Tuning of the bracket-and-interpolate search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Relative tolerance: a trial converges when its statistic is within
    /// `tolerance * delta` of the threshold. Default: 0.01
    pub tolerance: f64,

    /// Bracketing trials per direction. Default: 30
    pub max_tries: usize,

    /// Interpolation steps per direction. Default: 30
    pub max_iterations: usize,

    /// Overshoot above the threshold (absolute statistic units) that forces
    /// a bisection step. Default: 3.0
    pub overshoot_limit: f64,

    /// Refuse to search when the reduced statistic of the best fit exceeds
    /// this value. Default: none
    pub max_reduced_statistic: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_tries: 30,
            max_iterations: 30,
            overshoot_limit: 3.0,
            max_reduced_statistic: None,
        }
    }
}

impl SearchConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_overshoot_limit(mut self, overshoot_limit: f64) -> Self {
        self.overshoot_limit = overshoot_limit;
        self
    }

    pub fn with_max_reduced_statistic(mut self, limit: f64) -> Self {
        self.max_reduced_statistic = Some(limit);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(FitError::Configuration(format!(
                "search tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_tries == 0 || self.max_iterations == 0 {
            return Err(FitError::Configuration(
                "search needs at least one bracketing try and one iteration".to_string(),
            ));
        }
        if !(self.overshoot_limit > 0.0) {
            return Err(FitError::Configuration(format!(
                "overshoot limit must be positive, got {}",
                self.overshoot_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = SearchConfig::default();
        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.max_tries, 30);
        assert_eq!(config.max_iterations, 30);
        assert!(config.validate().is_ok());

        let config = config.with_tolerance(0.05).with_max_reduced_statistic(2.0);
        assert_eq!(config.tolerance, 0.05);
        assert_eq!(config.max_reduced_statistic, Some(2.0));
    }

    #[test]
    fn test_validation() {
        assert!(SearchConfig::default().with_tolerance(0.0).validate().is_err());
        assert!(SearchConfig::default().with_max_tries(0).validate().is_err());
        assert!(SearchConfig::default().with_overshoot_limit(-1.0).validate().is_err());
    }

    #[test]
    fn test_json() {
        let config: SearchConfig = serde_json::from_str(r#"{"tolerance": 0.02}"#).unwrap();
        assert_eq!(config.tolerance, 0.02);
        assert_eq!(config.max_tries, 30);
        let json = serde_json::to_string(&config).unwrap();
        let back: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
