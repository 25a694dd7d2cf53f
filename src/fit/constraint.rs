//! Constraint decorator for statistics
//!
//! A constraint maps the raw statistic and the current free parameters to an
//! adjusted statistic (a penalty, a prior, a Lagrange term). Engines that
//! work on residuals never look at the scalar value, so the adjustment is also
//! spread over the residuals: every residual is shifted by the same `delta`,
//! chosen so that `sum((r_i + delta)^2)` equals the adjusted value.

use log::debug;
use ndarray::{Array1, ArrayView1};

use crate::error::{FitError, Result};
use crate::fit::options::{FitOption, OptionSpec};
use crate::fit::statistic::{AuxiliaryData, Statistic, StatisticInput, StatisticValue};

/// `(raw statistic, free parameters) -> adjusted statistic`
pub type ConstraintFn = Box<dyn FnMut(f64, ArrayView1<f64>) -> f64>;

/// Shift every residual by one common offset so that the sum of squares
/// becomes `target`.
///
/// When no real offset reaches `target` (it lies below what any common shift
/// can achieve), the offset minimizing the sum of squares is used.
pub fn redistribute(residuals: &Array1<f64>, target: f64) -> Array1<f64> {
    let n = residuals.len() as f64;
    if residuals.is_empty() {
        return residuals.clone();
    }
    let s1: f64 = residuals.sum();
    let s2: f64 = residuals.iter().map(|r| r * r).sum();

    // n d^2 + 2 s1 d + (s2 - target) = 0
    let c = s2 - target;
    let disc = s1 * s1 - n * c;
    let delta = if disc < 0.0 {
        debug!(
            "Adjusted statistic {} is unreachable by a common shift; using the minimum",
            target
        );
        -s1 / n
    } else {
        let q = -(s1 + s1.signum() * disc.sqrt());
        if q == 0.0 {
            // s1 == 0 and disc == 0
            0.0
        } else {
            let r1 = q / n;
            let r2 = c / q;
            if r1.abs() <= r2.abs() {
                r1
            } else {
                r2
            }
        }
    };
    residuals.mapv(|r| r + delta)
}

/// A statistic whose value passes through a constraint function.
pub struct ConstrainedStatistic {
    inner: Box<dyn Statistic>,
    constraint: ConstraintFn,
}

impl std::fmt::Debug for ConstrainedStatistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstrainedStatistic")
            .field("inner", &self.inner.name())
            .finish()
    }
}

impl ConstrainedStatistic {
    pub fn new(inner: Box<dyn Statistic>, constraint: ConstraintFn) -> Self {
        Self { inner, constraint }
    }

    /// Remove the decorator, returning the original statistic.
    pub fn into_inner(self) -> Box<dyn Statistic> {
        self.inner
    }
}

impl Statistic for ConstrainedStatistic {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn recognized_options(&self) -> &'static [OptionSpec] {
        self.inner.recognized_options()
    }

    fn apply_option(&mut self, option: &FitOption) -> Result<()> {
        self.inner.apply_option(option)
    }

    fn prepare(&mut self, data_size: usize) -> Result<()> {
        self.inner.prepare(data_size)
    }

    fn set_auxiliary(&mut self, aux: AuxiliaryData) {
        self.inner.set_auxiliary(aux)
    }

    fn release(&mut self) {
        self.inner.release()
    }

    fn compute(&mut self, input: &StatisticInput<'_>) -> Result<StatisticValue> {
        let raw = self.inner.compute(input)?;
        let adjusted = (self.constraint)(raw.value, input.free_parameters);
        if !adjusted.is_finite() {
            return Err(FitError::Numerical(format!(
                "constraint turned statistic {} into {}",
                raw.value, adjusted
            )));
        }
        Ok(StatisticValue {
            residuals: redistribute(&raw.residuals, adjusted),
            value: adjusted,
        })
    }

    fn report(&self, value: f64, n_points: usize, n_varying: usize) -> String {
        self.inner.report(value, n_points, n_varying)
    }
}
