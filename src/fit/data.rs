//! Data and model callbacks handed to a fit

use ndarray::{Array1, ArrayView1};

use crate::error::{FitError, Result};

/// Observed data: independent variable, observations and per-point weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    x: Array1<f64>,
    y: Array1<f64>,
    weights: Array1<f64>,
}

impl FitData {
    /// Arrays must have equal length.
    pub fn new(x: Array1<f64>, y: Array1<f64>, weights: Array1<f64>) -> Result<Self> {
        if x.len() != y.len() || y.len() != weights.len() {
            return Err(FitError::DimensionMismatch(format!(
                "x has {} points, y has {}, weights has {}",
                x.len(),
                y.len(),
                weights.len()
            )));
        }
        Ok(Self { x, y, weights })
    }

    /// Unit weights.
    pub fn unweighted(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        let weights = Array1::ones(y.len());
        Self::new(x, y, weights)
    }

    /// Weights `1 / sigma`. Non-positive uncertainties are rejected.
    pub fn with_errors(x: Array1<f64>, y: Array1<f64>, sigma: &Array1<f64>) -> Result<Self> {
        if let Some(bad) = sigma.iter().find(|s| !(**s > 0.0)) {
            return Err(FitError::Configuration(format!(
                "uncertainties must be positive, found {}",
                bad
            )));
        }
        Self::new(x, y, sigma.mapv(|s| 1.0 / s))
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Computes model predictions at `x` for a parameter vector.
///
/// In table mode the vector holds every in-use parameter in traversal order;
/// in raw mode it is the packed vector passed to the fit.
pub trait ModelEvaluator {
    fn evaluate(&mut self, x: ArrayView1<f64>, params: ArrayView1<f64>) -> Result<Array1<f64>>;
}

impl<F> ModelEvaluator for F
where
    F: FnMut(ArrayView1<f64>, ArrayView1<f64>) -> Result<Array1<f64>>,
{
    fn evaluate(&mut self, x: ArrayView1<f64>, params: ArrayView1<f64>) -> Result<Array1<f64>> {
        self(x, params)
    }
}
