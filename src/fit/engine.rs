//! Optimization engines and their registry

use ndarray::Array1;
use std::collections::HashMap;

use crate::error::{FitError, Result};
use crate::fit::options::{validate, FitOption, OptionSpec, OptionString, ParseMode};
use crate::parameters::PackedParameters;

/// Residuals and statistic at one trial point.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub residuals: Array1<f64>,
    pub statistic: f64,
}

/// What an engine minimizes.
pub trait Objective {
    /// Evaluate the model and statistic at `params`.
    fn evaluate(&mut self, params: &Array1<f64>) -> Result<Evaluation>;

    /// Number of data points (residuals per evaluation).
    fn n_points(&self) -> usize;

    /// Evaluations performed so far.
    fn n_evaluations(&self) -> usize;
}

/// Summary an engine returns alongside the optimized parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub statistic: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub message: String,
}

/// An optimization algorithm.
pub trait Engine {
    /// Registry name
    fn name(&self) -> &str;

    /// Options this engine accepts.
    fn recognized_options(&self) -> &'static [OptionSpec] {
        &[]
    }

    /// Apply one validated option.
    fn apply_option(&mut self, option: &FitOption) -> Result<()> {
        Err(FitError::Configuration(format!(
            "{} does not accept option '{}'",
            self.name(),
            option.name
        )))
    }

    /// Minimize `objective` starting from `params`, which holds the result on
    /// return. `packed` carries bounds and step hints, one entry per parameter.
    fn optimize(
        &mut self,
        objective: &mut dyn Objective,
        packed: &PackedParameters,
        params: &mut Array1<f64>,
    ) -> Result<EngineReport>;

    /// Move infeasible trial values back inside the soft bounds. Returns how
    /// many entries were changed.
    fn repair_out_of_range(&self, params: &mut Array1<f64>, packed: &PackedParameters) -> usize {
        let mut repaired = 0;
        for (i, value) in params.iter_mut().enumerate() {
            let clamped = value.max(packed.min[i]).min(packed.max[i]);
            if clamped != *value {
                *value = clamped;
                repaired += 1;
            }
        }
        repaired
    }
}

/// Creates fresh engine instances.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn Engine>>;

struct EngineEntry {
    default_statistic: String,
    factory: EngineFactory,
}

/// Name-keyed engine registry. Every engine names the statistic it uses when
/// the caller does not choose one.
pub struct EngineRegistry {
    entries: HashMap<String, EngineEntry>,
    default_name: Option<String>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("names", &self.names())
            .field("default_name", &self.default_name)
            .finish()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default_name: None,
        }
    }

    /// A registry holding the built-in `leven` engine as its default.
    #[cfg(feature = "lm")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("leven", "chi", || {
            Box::new(crate::lm::LevenbergMarquardt::new())
        });
        registry
    }

    /// Register a factory. The first registration becomes the default.
    pub fn register<F>(&mut self, name: &str, default_statistic: &str, factory: F)
    where
        F: Fn() -> Box<dyn Engine> + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.entries.insert(
            name.to_string(),
            EngineEntry {
                default_statistic: default_statistic.to_string(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.entries.contains_key(name) {
            return Err(FitError::UnknownEngine(name.to_string()));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Default statistic of a registered engine.
    pub fn default_statistic(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.default_statistic.as_str())
    }

    /// Create and configure an engine. Returns it with its default statistic name.
    pub fn find(&self, option_string: &str) -> Result<(Box<dyn Engine>, String)> {
        self.find_with(option_string, ParseMode::Strict)
    }

    pub fn find_with(
        &self,
        option_string: &str,
        mode: ParseMode,
    ) -> Result<(Box<dyn Engine>, String)> {
        let parsed = OptionString::parse(option_string)?;
        let name = parsed
            .name
            .as_deref()
            .filter(|n| *n != "default")
            .or(self.default_name.as_deref())
            .ok_or_else(|| FitError::UnknownEngine("<default>".to_string()))?;
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FitError::UnknownEngine(name.to_string()))?;

        let mut engine = (entry.factory)();
        let accepted = validate(name, engine.recognized_options(), &parsed.options, mode)?;
        for option in &accepted {
            engine.apply_option(option)?;
        }
        Ok((engine, entry.default_statistic.clone()))
    }
}
