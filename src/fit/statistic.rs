//! Fit statistics and their registry
//!
//! A statistic turns observed data and a model prediction into a vector of
//! residuals plus one scalar figure of merit. Statistics are plugins: each is
//! registered under a name with a factory, and a fresh instance is created and
//! configured from an option string whenever a fit is opened.

use ndarray::{Array1, ArrayView1};
use std::collections::{BTreeMap, HashMap};

use crate::error::{FitError, Result};
use crate::fit::options::{validate, FitOption, OptionSpec, OptionString, ParseMode};

/// Inputs to one statistic evaluation.
#[derive(Debug, Clone, Copy)]
pub struct StatisticInput<'a> {
    pub observed: ArrayView1<'a, f64>,
    pub predicted: ArrayView1<'a, f64>,
    pub weights: ArrayView1<'a, f64>,
    /// Current free-parameter vector, for statistics (and constraints) that
    /// depend on it.
    pub free_parameters: ArrayView1<'a, f64>,
}

impl StatisticInput<'_> {
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

/// Output of one statistic evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticValue {
    pub residuals: Array1<f64>,
    pub value: f64,
}

/// Named auxiliary arrays (background terms and similar) a statistic may use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryData {
    arrays: BTreeMap<String, Array1<f64>>,
}

impl AuxiliaryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, values: Array1<f64>) -> Self {
        self.arrays.insert(name.to_string(), values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.arrays.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// An objective function.
pub trait Statistic {
    /// Registry name
    fn name(&self) -> &str;

    /// Options this statistic accepts.
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

    /// Allocate per-fit buffers for `data_size` points.
    fn prepare(&mut self, _data_size: usize) -> Result<()> {
        Ok(())
    }

    /// Install auxiliary arrays.
    fn set_auxiliary(&mut self, _aux: AuxiliaryData) {}

    /// Free per-fit buffers and auxiliary arrays.
    fn release(&mut self) {}

    /// Residuals and scalar value. `sum(residuals^2)` need not equal `value`
    /// for statistics that are not sums of squares, but engines that work on
    /// residuals assume it does.
    fn compute(&mut self, input: &StatisticInput<'_>) -> Result<StatisticValue>;

    /// Human-readable summary of a value.
    fn report(&self, value: f64, n_points: usize, n_varying: usize) -> String {
        let dof = n_points.saturating_sub(n_varying);
        format!(
            "{} = {:.6} using {} points with {} degrees of freedom",
            self.name(),
            value,
            n_points,
            dof
        )
    }
}

/// Creates fresh statistic instances.
pub type StatisticFactory = Box<dyn Fn() -> Box<dyn Statistic>>;

/// Name-keyed statistic registry.
pub struct StatisticRegistry {
    factories: HashMap<String, StatisticFactory>,
    default_name: Option<String>,
}

impl std::fmt::Debug for StatisticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticRegistry")
            .field("names", &self.names())
            .field("default_name", &self.default_name)
            .finish()
    }
}

impl Default for StatisticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// A registry holding the built-in `chi` statistic as its default.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("chi", || Box::new(crate::fit::chi::ChiSquared::new()));
        registry
    }

    /// Register a factory. The first registration becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Statistic> + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(FitError::UnknownStatistic(name.to_string()));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create and configure a statistic from an option string.
    pub fn find(&self, option_string: &str) -> Result<Box<dyn Statistic>> {
        self.find_with(option_string, ParseMode::Strict)
    }

    pub fn find_with(&self, option_string: &str, mode: ParseMode) -> Result<Box<dyn Statistic>> {
        let parsed = OptionString::parse(option_string)?;
        self.create(&parsed, None, mode)
    }

    /// Create from a parsed option string, falling back to `fallback` and then
    /// to the registry default when no name is given.
    pub(crate) fn create(
        &self,
        parsed: &OptionString,
        fallback: Option<&str>,
        mode: ParseMode,
    ) -> Result<Box<dyn Statistic>> {
        let name = parsed
            .name
            .as_deref()
            .filter(|n| *n != "default")
            .or(fallback)
            .or(self.default_name.as_deref())
            .ok_or_else(|| FitError::UnknownStatistic("<default>".to_string()))?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FitError::UnknownStatistic(name.to_string()))?;

        let mut statistic = factory();
        let accepted = validate(name, statistic.recognized_options(), &parsed.options, mode)?;
        for option in &accepted {
            statistic.apply_option(option)?;
        }
        Ok(statistic)
    }
}
