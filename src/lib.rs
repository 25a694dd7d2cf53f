//! # specfit-rs
//!
//! `specfit-rs` is the fitting core of a spectral-analysis package: a
//! parameter table shared by every model instance, pluggable fit statistics
//! and optimization engines looked up by name, and a confidence-limit search
//! that refits the remaining parameters at each trial value.
//!
//! The library provides:
//! - A parameter table with soft bounds, hard limits, ties and derived parameters
//! - Registries of statistics and engines configured through option strings
//! - A fit object that guards against concurrent fits and applies constraints
//! - A bracket-and-interpolate search for one-parameter confidence limits
//! - A reference Levenberg-Marquardt engine (feature `lm`)
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::{array, Array1, ArrayView1};
//! use specfit_rs::confidence::{ConfidenceSearch, LimitRequest, SearchConfig};
//! use specfit_rs::fit::{FitData, FitEnvironment};
//! use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
//! use specfit_rs::Result;
//!
//! let mut table = ParameterTable::new();
//! let defaults = vec![
//!     ParameterDefaults::new("const", 1.0).with_bounds(-10.0, 10.0),
//!     ParameterDefaults::new("slope", 0.0).with_bounds(-10.0, 10.0),
//! ];
//! table.register("line", 1, 1, 2, &defaults).unwrap();
//!
//! let x = array![0.0, 1.0, 2.0, 3.0, 4.0];
//! let y = array![1.1, 1.4, 2.1, 2.4, 3.1];
//! let data = FitData::with_errors(x, y, &Array1::from_elem(5, 0.1)).unwrap();
//!
//! let env = FitEnvironment::with_defaults();
//! let model = Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
//!     Ok(x.mapv(|v| p[0] + p[1] * v))
//! });
//! let mut fit = env.open("leven", "chi", model, None, data.len()).unwrap();
//! let best = fit.run_on_table(&mut table, &data).unwrap();
//!
//! let search = ConfidenceSearch::new(SearchConfig::default());
//! let request = LimitRequest::new(2, best.statistic);
//! let limits = search.run(&mut table, &mut fit.bind(&data), &request).unwrap();
//! fit.close();
//!
//! assert!(limits.is_valid());
//! assert!(limits.lower.value < 0.5 && limits.upper.value > 0.5);
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

// Statistics, engines and the fit object
pub mod fit;

// Confidence-limit search
pub mod confidence;

#[cfg(feature = "lm")]
pub mod lm;

// Re-exports for convenience
pub use confidence::{ConfidenceResult, ConfidenceSearch, LimitRequest, SearchConfig};
pub use error::{FitError, Result};
pub use fit::{FitData, FitEnvironment, FitObject, FitResult, FitStatus};
pub use parameters::{ParameterDefaults, ParameterSnapshot, ParameterTable, Severity};

#[cfg(feature = "lm")]
pub use lm::LevenbergMarquardt;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
