//! # Fitting
//!
//! Statistics and engines are plugins looked up by name in a
//! [`StatisticRegistry`] and an [`EngineRegistry`]. A [`FitObject`] binds one
//! of each to a model callback for the duration of a fit.
//!
//! ```rust
//! use ndarray::{array, Array1, ArrayView1};
//! use specfit_rs::error::Result;
//! use specfit_rs::fit::{FitData, FitEnvironment};
//! use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
//!
//! let mut table = ParameterTable::new();
//! let defaults = vec![
//!     ParameterDefaults::new("norm", 1.0).with_bounds(0.0, 100.0),
//!     ParameterDefaults::new("slope", 0.0).with_bounds(-5.0, 5.0),
//! ];
//! table.register("line", 1, 1, 2, &defaults).unwrap();
//!
//! let x = array![0.0, 1.0, 2.0, 3.0];
//! let data = FitData::unweighted(x.clone(), x.mapv(|v| 2.0 + 0.5 * v)).unwrap();
//!
//! let env = FitEnvironment::with_defaults();
//! let model = Box::new(|x: ArrayView1<f64>, p: ArrayView1<f64>| -> Result<Array1<f64>> {
//!     Ok(x.mapv(|v| p[0] + p[1] * v))
//! });
//! let mut fit = env.open("leven", "chi", model, None, data.len()).unwrap();
//! let result = fit.run_on_table(&mut table, &data).unwrap();
//! fit.close();
//!
//! assert!(result.is_success());
//! assert!((table.find_by_index(1).unwrap().value() - 2.0).abs() < 1e-4);
//! ```

pub mod chi;
pub mod constraint;
pub mod data;
pub mod engine;
pub mod fit_object;
pub mod options;
pub mod statistic;

pub use chi::{ChiSquared, Weighting};
pub use constraint::{redistribute, ConstrainedStatistic, ConstraintFn};
pub use data::{FitData, ModelEvaluator};
pub use engine::{Engine, EngineFactory, EngineRegistry, EngineReport, Evaluation, Objective};
pub use fit_object::{BoundFit, FitEnvironment, FitObject, FitResult, FitSession, FitStatus};
pub use options::{FitOption, OptionError, OptionSpec, OptionString, ParseMode};
pub use statistic::{
    AuxiliaryData, Statistic, StatisticFactory, StatisticInput, StatisticRegistry, StatisticValue,
};
