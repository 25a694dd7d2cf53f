//! Convergence criteria for the Levenberg-Marquardt engine.

use ndarray::Array1;

/// Possible convergence states after an accepted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Keep iterating.
    Running,

    /// Small relative parameter change.
    ParameterConvergence,

    /// Small relative change in the statistic.
    StatisticConvergence,

    /// Small gradient.
    GradientConvergence,

    MaxIterationsReached,
}

impl ConvergenceStatus {
    /// Returns true if iteration should stop.
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the engine has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::StatisticConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "still running",
            ConvergenceStatus::ParameterConvergence => "converged: small parameter change",
            ConvergenceStatus::StatisticConvergence => "converged: small statistic change",
            ConvergenceStatus::GradientConvergence => "converged: small gradient",
            ConvergenceStatus::MaxIterationsReached => "maximum iterations reached",
        }
    }
}

/// Criteria for determining when the engine has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    pub xtol: f64,
    pub ftol: f64,
    pub gtol: f64,
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            xtol: 1e-8,
            ftol: 1e-8,
            gtol: 1e-10,
            max_iterations: 200,
        }
    }
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
        }
    }

    /// Gradient test, done before a step is attempted.
    pub fn check_gradient(&self, gradient: &Array1<f64>) -> ConvergenceStatus {
        let largest = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
        if largest < self.gtol {
            ConvergenceStatus::GradientConvergence
        } else {
            ConvergenceStatus::Running
        }
    }

    /// Tests after an accepted step from `params` to `new_params`.
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        statistic: f64,
        new_statistic: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        let param_change = new_params
            .iter()
            .zip(params.iter())
            .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
            .fold(0.0_f64, f64::max);
        if param_change < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        let statistic_change = (statistic - new_statistic).abs() / statistic.max(1e-30);
        if statistic_change < self.ftol || new_statistic < f64::MIN_POSITIVE {
            return ConvergenceStatus::StatisticConvergence;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }
        ConvergenceStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_convergence_criteria() {
        let criteria = ConvergenceCriteria::default();

        let params = array![1.0, 2.0, 3.0];
        let status = criteria.check(&params, &array![1.0, 2.0, 3.0 + 1e-10], 10.0, 9.9, 5);
        assert_eq!(status, ConvergenceStatus::ParameterConvergence);

        let status = criteria.check(&params, &array![1.1, 2.1, 3.1], 10.0, 9.99999999999, 5);
        assert_eq!(status, ConvergenceStatus::StatisticConvergence);

        let status = criteria.check(&params, &array![1.1, 2.1, 3.1], 10.0, 9.0, 200);
        assert_eq!(status, ConvergenceStatus::MaxIterationsReached);

        let status = criteria.check(&params, &array![1.1, 2.1, 3.1], 10.0, 9.0, 5);
        assert_eq!(status, ConvergenceStatus::Running);
    }

    #[test]
    fn test_gradient_check() {
        let criteria = ConvergenceCriteria::default();
        assert_eq!(
            criteria.check_gradient(&array![1e-12, -1e-11]),
            ConvergenceStatus::GradientConvergence
        );
        assert_eq!(criteria.check_gradient(&array![1e-3]), ConvergenceStatus::Running);
    }

    #[test]
    fn test_status_methods() {
        assert!(!ConvergenceStatus::Running.is_terminated());
        assert!(ConvergenceStatus::MaxIterationsReached.is_terminated());
        assert!(!ConvergenceStatus::MaxIterationsReached.is_converged());
        assert!(ConvergenceStatus::GradientConvergence.is_converged());
    }
}
