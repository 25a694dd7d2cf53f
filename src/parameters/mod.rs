//! # Parameter System
//!
//! Every parameter of every model-function instance lives in one
//! [`ParameterTable`]. The table hands engines a compact vector of the free
//! parameters ([`ParameterTable::pack_variable`]) and writes optimized values
//! back ([`ParameterTable::unpack_variable`]), keeping tied and derived
//! parameters consistent at every synchronization point.
//!
//! ## Core Components
//!
//! - [`ParameterRecord`]: one scalar parameter with soft bounds, hard limits and step hints
//! - [`ParameterTable`]: blocks of records keyed by function instance
//! - [`Limits`]: validation of the `hard_min <= min <= value <= max <= hard_max` nesting
//! - [`DerivedExpression`]: formula or closure computing a parameter from others
//! - [`ParameterSnapshot`]: serializable values for save/restore
//!
//! ## Example Usage
//!
//! ```rust
//! use specfit_rs::parameters::{DerivedExpression, ParameterDefaults, ParameterTable};
//!
//! let mut table = ParameterTable::new();
//! let defaults = vec![
//!     ParameterDefaults::new("LineE", 6.4).with_bounds(0.0, 100.0),
//!     ParameterDefaults::new("Sigma", 0.1).with_bounds(0.0, 10.0),
//! ];
//! table.register("gaussian", 1, 1, 2, &defaults).unwrap();
//! table.register("gaussian", 2, 1, 2, &defaults).unwrap();
//!
//! // Second line shares the width of the first and sits 0.3 keV above it
//! table.set_tie(4, 2).unwrap();
//! table
//!     .set_derived_expression(3, Some(DerivedExpression::formula("p1 + 0.3").unwrap()))
//!     .unwrap();
//!
//! let packed = table.pack_variable().unwrap();
//! assert_eq!(packed.global_index, vec![1, 2]);
//! assert!((table.find_by_index(3).unwrap().value() - 6.7).abs() < 1e-12);
//! ```

pub mod derived;
pub mod expression;
pub mod limits;
pub mod record;
pub mod snapshot;
pub mod table;

#[cfg(test)]
mod tests;

// Re-export key types
pub use derived::{DerivedExpression, ParameterLookup, ParameterRef, Severity, SyncContext};
pub use expression::{EvaluationContext, Expression, ExpressionError};
pub use limits::{Limits, LimitsError};
pub use record::{full_name, FullName, ParameterDefaults, ParameterRecord};
pub use snapshot::{ParameterSnapshot, SnapshotEntry};
pub use table::{DefaultsProvider, PackedParameters, ParameterBlock, ParameterCount, ParameterTable};
