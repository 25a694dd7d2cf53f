//! Forward-difference Jacobian of the residual vector.
//!
//! Step sizes come from the packed step hints:
//!
//! - `step > 0`: absolute step
//! - `step < 0`: relative step, `|step| * |p|`
//! - `step == 0`: `epsilon * max(|p|, 1)`
//!
//! A step that would cross the upper soft bound is taken backwards instead.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::fit::engine::Objective;
use crate::parameters::PackedParameters;

/// Signed step for parameter `j`.
pub fn step_size(packed: &PackedParameters, params: &Array1<f64>, j: usize, epsilon: f64) -> f64 {
    let p = params[j];
    let hint = packed.step[j];
    let h = if hint > 0.0 {
        hint
    } else if hint < 0.0 && p != 0.0 {
        hint.abs() * p.abs()
    } else {
        epsilon * p.abs().max(1.0)
    };

    let (lo, hi) = (packed.min[j], packed.max[j]);
    if p + h <= hi {
        h
    } else if p - h >= lo {
        -h
    } else if hi - p >= p - lo {
        0.5 * (hi - p)
    } else {
        -0.5 * (p - lo)
    }
}

/// `J[i, j] = d residual_i / d param_j`, with `residuals` already evaluated at
/// `params`.
pub fn forward_jacobian(
    objective: &mut dyn Objective,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    packed: &PackedParameters,
    epsilon: f64,
) -> Result<Array2<f64>> {
    let n_residuals = residuals.len();
    let mut jac = Array2::zeros((n_residuals, params.len()));
    let mut perturbed = params.clone();

    for j in 0..params.len() {
        let h = step_size(packed, params, j, epsilon);
        if h == 0.0 {
            // zero-width range
            continue;
        }
        perturbed[j] = params[j] + h;
        let shifted = objective.evaluate(&perturbed)?;
        perturbed[j] = params[j];

        if shifted.residuals.len() != n_residuals {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                shifted.residuals.len()
            )));
        }
        for i in 0..n_residuals {
            jac[[i, j]] = (shifted.residuals[i] - residuals[i]) / h;
        }
    }
    Ok(jac)
}
