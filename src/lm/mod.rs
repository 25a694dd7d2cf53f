//! Levenberg-Marquardt engine.
//!
//! The reference [`Engine`](crate::fit::Engine) implementation, registered as
//! `leven` with `chi` as its default statistic. It minimizes the sum of
//! squared residuals handed back by the objective, using forward-difference
//! Jacobians and clamping every trial point into the soft bounds.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod jacobian;

// Re-export key types
pub use algorithm::LevenbergMarquardt;
pub use config::LmConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
