//! # Confidence Limits
//!
//! One-parameter confidence limits by refitting: the target parameter is
//! frozen at trial values, the remaining free parameters are re-optimized, and
//! the search looks for where the statistic crosses `min_statistic + delta`.
//!
//! ```rust
//! use ndarray::Array1;
//! use specfit_rs::confidence::{ConfidenceSearch, LimitRequest, SearchConfig};
//! use specfit_rs::error::Result;
//! use specfit_rs::fit::{FitResult, FitStatus};
//! use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
//!
//! let mut table = ParameterTable::new();
//! let defaults = vec![ParameterDefaults::new("p", 3.0).with_bounds(-7.0, 13.0)];
//! table.register("parabola", 1, 1, 1, &defaults).unwrap();
//!
//! // statistic 10 + (p - 3)^2
//! let mut refit = |table: &mut ParameterTable| -> Result<FitResult> {
//!     let p = table.find_by_index(1).unwrap().value();
//!     Ok(FitResult {
//!         params: Array1::zeros(0),
//!         statistic: 10.0 + (p - 3.0) * (p - 3.0),
//!         status: FitStatus::Converged,
//!         iterations: 0,
//!         evaluations: 1,
//!         message: String::new(),
//!     })
//! };
//!
//! let search = ConfidenceSearch::new(SearchConfig::default());
//! let result = search
//!     .run(&mut table, &mut refit, &LimitRequest::new(1, 10.0).with_delta(1.0))
//!     .unwrap();
//! assert!(result.is_valid());
//! assert!((result.lower.value - 2.0).abs() < 0.01);
//! assert!((result.upper.value - 4.0).abs() < 0.01);
//! ```

pub mod config;
pub mod search;


pub use config::{SearchConfig, DEFAULT_DELTA};
pub use search::{
    BreakCheck, ConfidenceResult, ConfidenceSearch, Direction, ImprovedFit, LimitRequest,
    LimitResult, NeverBreak, Refit, SearchState,
};
