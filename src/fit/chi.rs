//! Chi-squared statistic
//!
//! Residuals are `(observed - predicted) * w` and the statistic is their sum of
//! squares. The weight `w` depends on the `weight` option:
//!
//! - `data` (default): the supplied weight array, typically `1 / sigma`
//! - `model`: `1 / sqrt(max(predicted, floor))`
//! - `unit`: 1
//!
//! A `background_variance` auxiliary array, when present, is added to the
//! per-point variance `1 / w^2`.

use ndarray::Array1;
use std::str::FromStr;

use crate::error::{FitError, Result};
use crate::fit::options::{FitOption, OptionSpec};
use crate::fit::statistic::{AuxiliaryData, Statistic, StatisticInput, StatisticValue};

/// Choice of per-point weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    #[default]
    Data,
    Model,
    Unit,
}

impl FromStr for Weighting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "data" | "standard" => Ok(Weighting::Data),
            "model" => Ok(Weighting::Model),
            "unit" => Ok(Weighting::Unit),
            other => Err(format!("expected data, model or unit, got '{}'", other)),
        }
    }
}

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::valued("weight", "data | model | unit"),
    OptionSpec::valued("floor", "smallest predicted value used for model weighting"),
];

/// Weighted least-squares statistic.
#[derive(Debug, Clone)]
pub struct ChiSquared {
    weighting: Weighting,
    floor: f64,
    background_variance: Option<Array1<f64>>,
    scratch: Array1<f64>,
}

impl Default for ChiSquared {
    fn default() -> Self {
        Self::new()
    }
}

impl ChiSquared {
    pub fn new() -> Self {
        Self {
            weighting: Weighting::Data,
            floor: 1.0,
            background_variance: None,
            scratch: Array1::zeros(0),
        }
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }
}

impl Statistic for ChiSquared {
    fn name(&self) -> &str {
        "chi"
    }

    fn recognized_options(&self) -> &'static [OptionSpec] {
        OPTIONS
    }

    fn apply_option(&mut self, option: &FitOption) -> Result<()> {
        match option.name.as_str() {
            "weight" => self.weighting = option.parse_value()?,
            "floor" => {
                let floor: f64 = option.parse_value()?;
                if !(floor > 0.0) {
                    return Err(FitError::Configuration(format!(
                        "chi floor must be positive, got {}",
                        floor
                    )));
                }
                self.floor = floor;
            }
            other => {
                return Err(FitError::Configuration(format!(
                    "chi does not accept option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    fn prepare(&mut self, data_size: usize) -> Result<()> {
        self.scratch = Array1::zeros(data_size);
        Ok(())
    }

    fn set_auxiliary(&mut self, aux: AuxiliaryData) {
        self.background_variance = aux.get("background_variance").cloned();
    }

    fn release(&mut self) {
        self.scratch = Array1::zeros(0);
        self.background_variance = None;
    }

    fn compute(&mut self, input: &StatisticInput<'_>) -> Result<StatisticValue> {
        let n = input.len();
        if input.predicted.len() != n || input.weights.len() != n {
            return Err(FitError::DimensionMismatch(format!(
                "chi needs equal lengths, got observed {}, predicted {}, weights {}",
                n,
                input.predicted.len(),
                input.weights.len()
            )));
        }
        if let Some(bvar) = &self.background_variance {
            if bvar.len() != n {
                return Err(FitError::DimensionMismatch(format!(
                    "background variance has {} points, data has {}",
                    bvar.len(),
                    n
                )));
            }
        }
        if self.scratch.len() != n {
            self.scratch = Array1::zeros(n);
        }

        for i in 0..n {
            let w = match self.weighting {
                Weighting::Data => input.weights[i],
                Weighting::Model => 1.0 / input.predicted[i].max(self.floor).sqrt(),
                Weighting::Unit => 1.0,
            };
            let w = match &self.background_variance {
                Some(bvar) if w != 0.0 => 1.0 / (1.0 / (w * w) + bvar[i]).sqrt(),
                _ => w,
            };
            self.scratch[i] = (input.observed[i] - input.predicted[i]) * w;
        }

        let value: f64 = self.scratch.iter().map(|r| r * r).sum();
        if !value.is_finite() {
            return Err(FitError::Numerical(format!("chi-squared is {}", value)));
        }
        Ok(StatisticValue {
            residuals: self.scratch.clone(),
            value,
        })
    }

    fn report(&self, value: f64, n_points: usize, n_varying: usize) -> String {
        let dof = n_points.saturating_sub(n_varying);
        if dof == 0 {
            return format!("Chi-Squared = {:.4} using {} points", value, n_points);
        }
        format!(
            "Chi-Squared = {:.4} using {} points, reduced chi-squared = {:.4} for {} degrees of freedom",
            value,
            n_points,
            value / dof as f64,
            dof
        )
    }
}
