//! Implementation of the Levenberg-Marquardt engine.
//!
//! Each iteration solves `(J^T J + lambda I) delta = -J^T r` for the step,
//! keeps the step when it lowers the statistic and otherwise raises the
//! damping and tries again. Trial points are clamped into the soft bounds.

use log::{debug, info};
use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::fit::engine::{Engine, EngineReport, Evaluation, Objective};
use crate::fit::options::{FitOption, OptionSpec};
use crate::parameters::PackedParameters;

use super::config::LmConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::jacobian::forward_jacobian;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::valued("iterations", "maximum number of iterations"),
    OptionSpec::valued("tolerance", "relative tolerance on statistic and parameters"),
    OptionSpec::valued("lambda", "initial damping"),
    OptionSpec::valued("epsilon", "relative finite-difference step"),
    OptionSpec::flag("verbose", "log every iteration"),
];

/// The Levenberg-Marquardt engine, registered as `leven`.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self {
            config: LmConfig::default(),
        }
    }

    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    fn criteria(&self) -> ConvergenceCriteria {
        ConvergenceCriteria::new(
            self.config.xtol,
            self.config.ftol,
            self.config.gtol,
            self.config.max_iterations,
        )
    }

    fn trace(&self, iteration: usize, statistic: f64, lambda: f64) {
        if self.config.verbose {
            info!("leven iteration {}: statistic {:.6e}, lambda {:.1e}", iteration, statistic, lambda);
        } else {
            debug!("leven iteration {}: statistic {:.6e}, lambda {:.1e}", iteration, statistic, lambda);
        }
    }

    /// Evaluate a trial point. Numerical trouble rejects the step; anything
    /// else aborts the fit.
    fn try_evaluate(objective: &mut dyn Objective, params: &Array1<f64>) -> Result<Option<Evaluation>> {
        match objective.evaluate(params) {
            Ok(evaluation) if evaluation.statistic.is_finite() => Ok(Some(evaluation)),
            Ok(_) => Ok(None),
            Err(FitError::Numerical(message)) => {
                debug!("leven rejected trial point: {}", message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Engine for LevenbergMarquardt {
    fn name(&self) -> &str {
        "leven"
    }

    fn recognized_options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn apply_option(&mut self, option: &FitOption) -> Result<()> {
        match option.name.as_str() {
            "iterations" => self.config.max_iterations = option.parse_value()?,
            "tolerance" => {
                let tolerance: f64 = option.parse_value()?;
                if !(tolerance > 0.0) {
                    return Err(FitError::Configuration(format!(
                        "leven tolerance must be positive, got {}",
                        tolerance
                    )));
                }
                self.config = self.config.clone().with_tolerance(tolerance);
            }
            "lambda" => self.config.initial_lambda = option.parse_value()?,
            "epsilon" => self.config.epsilon = option.parse_value()?,
            "verbose" => self.config.verbose = option.flag_value()?,
            other => {
                return Err(FitError::Configuration(format!(
                    "leven does not accept option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    fn optimize(
        &mut self,
        objective: &mut dyn Objective,
        packed: &PackedParameters,
        params: &mut Array1<f64>,
    ) -> Result<EngineReport> {
        let n_params = params.len();
        if n_params != packed.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                packed.len(),
                n_params
            )));
        }
        let repaired = self.repair_out_of_range(params, packed);
        if repaired > 0 {
            debug!("leven moved {} starting values inside their bounds", repaired);
        }

        let criteria = self.criteria();
        let mut current = objective.evaluate(params)?;
        let mut lambda = self.config.initial_lambda;
        let mut iterations = 0;
        let report = |statistic: f64, iterations: usize, status: ConvergenceStatus, objective: &dyn Objective| {
            EngineReport {
                statistic,
                iterations,
                evaluations: objective.n_evaluations(),
                converged: status.is_converged(),
                message: status.description().to_string(),
            }
        };

        loop {
            self.trace(iterations, current.statistic, lambda);
            let jac = forward_jacobian(objective, params, &current.residuals, packed, self.config.epsilon)?;
            let jt = jac.t();
            let gradient = jt.dot(&current.residuals);

            let status = criteria.check_gradient(&gradient);
            if status.is_terminated() {
                return Ok(report(current.statistic, iterations, status, &*objective));
            }
            let jtj = jt.dot(&jac);

            // inner loop: raise the damping until a step lowers the statistic
            loop {
                let Some(step) = solve_damped(&jtj, &gradient, lambda) else {
                    lambda *= self.config.lambda_up_factor;
                    if lambda > self.config.max_lambda {
                        return Err(FitError::Numerical(
                            "singular normal equations at maximum damping".to_string(),
                        ));
                    }
                    continue;
                };

                let mut trial = &*params - &step;
                self.repair_out_of_range(&mut trial, packed);
                if trial == *params {
                    return Ok(EngineReport {
                        statistic: current.statistic,
                        iterations,
                        evaluations: objective.n_evaluations(),
                        converged: true,
                        message: "converged: step vanished at the bounds".to_string(),
                    });
                }

                match Self::try_evaluate(objective, &trial)? {
                    Some(next) if next.statistic < current.statistic => {
                        iterations += 1;
                        let status =
                            criteria.check(params, &trial, current.statistic, next.statistic, iterations);
                        *params = trial;
                        current = next;
                        lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                        if status.is_terminated() {
                            self.trace(iterations, current.statistic, lambda);
                            return Ok(report(current.statistic, iterations, status, &*objective));
                        }
                        break;
                    }
                    _ => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            return Ok(EngineReport {
                                statistic: current.statistic,
                                iterations,
                                evaluations: objective.n_evaluations(),
                                converged: false,
                                message: "failed to decrease statistic, and lambda reached maximum"
                                    .to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Solve `(A + lambda I) x = b` by Cholesky decomposition, falling back to
/// Gaussian elimination with partial pivoting. `None` when singular.
fn solve_damped(a: &Array2<f64>, b: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut damped = a.clone();
    for i in 0..n {
        damped[[i, i]] += lambda;
    }
    let solution = cholesky_solve(&damped, b).or_else(|| gauss_solve(damped, b.clone()))?;
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for k in 0..n {
        let mut diag = a[[k, k]];
        for j in 0..k {
            diag -= l[[k, j]] * l[[k, j]];
        }
        if diag <= 0.0 {
            return None;
        }
        let lkk = diag.sqrt();
        l[[k, k]] = lkk;
        for i in k + 1..n {
            let mut v = a[[i, k]];
            for j in 0..k {
                v -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] = v / lkk;
        }
    }

    // L y = b
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }
    // L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in i + 1..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }
    Some(x)
}

fn gauss_solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-300 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut v = b[i];
        for k in i + 1..n {
            v -= a[[i, k]] * x[k];
        }
        x[i] = v / a[[i, i]];
    }
    Some(x)
}
