use thiserror::Error;

use crate::fit::options::OptionError;
use crate::parameters::expression::ExpressionError;
use crate::parameters::limits::LimitsError;

/// Error types for the specfit-rs library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Malformed request: bad defaults, bad bounds, bad option string.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No statistic is registered under the requested name.
    #[error("Unknown statistic: {0}")]
    UnknownStatistic(String),

    /// No engine is registered under the requested name.
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// A fit object is already open.
    #[error("A fit is already in progress")]
    FitInProgress,

    /// No parameter with this global index, vary index or full name.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Packing found nothing to vary.
    #[error("No free parameters to fit")]
    NoFreeParameters,

    /// A tie refers to a parameter that is missing, unused or part of a cycle.
    #[error("Tie error: {0}")]
    Tie(String),

    /// A derived parameter could not be evaluated or produced an unusable value.
    #[error("Derived parameter {name}: {message}")]
    DerivedParameter { name: String, message: String },

    /// Array lengths disagree.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Numerical failure inside a model, statistic or engine.
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// Error reported by a caller-supplied model callback.
    #[error("Model evaluation error: {0}")]
    ModelEvaluation(String),

    /// Soft or hard limit violation.
    #[error("Limits error: {0}")]
    Limits(#[from] LimitsError),

    /// Formula parse or evaluation error.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Option-string error.
    #[error("Option error: {0}")]
    Option(#[from] OptionError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for specfit-rs operations.
pub type Result<T> = std::result::Result<T, FitError>;

impl From<String> for FitError {
    fn from(s: String) -> Self {
        FitError::Configuration(s)
    }
}

impl From<&str> for FitError {
    fn from(s: &str) -> Self {
        FitError::Configuration(s.to_string())
    }
}

impl FitError {
    /// True for errors that leave the table and registries untouched because
    /// the request itself was malformed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FitError::Configuration(_)
                | FitError::UnknownStatistic(_)
                | FitError::UnknownEngine(_)
                | FitError::FitInProgress
                | FitError::Limits(_)
                | FitError::Option(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::DimensionMismatch("expected 3 values, got 2".to_string());
        assert!(format!("{}", err).contains("expected 3 values, got 2"));

        let err = FitError::DerivedParameter {
            name: "powerlaw(1).norm".to_string(),
            message: "value is not finite".to_string(),
        };
        assert!(format!("{}", err).contains("powerlaw(1).norm"));
    }

    #[test]
    fn test_error_conversion() {
        let str_err: FitError = "bad option".into();
        match str_err {
            FitError::Configuration(s) => assert_eq!(s, "bad option"),
            _ => panic!("Expected Configuration variant"),
        }

        let limits: FitError = LimitsError::InvertedBounds { min: 2.0, max: 1.0 }.into();
        assert!(limits.is_configuration());
        assert!(!FitError::NoFreeParameters.is_configuration());
    }
}
