//! Parameter records and the default tables they are created from
//!
//! A [`ParameterRecord`] is one scalar fit parameter belonging to one instance
//! of a model function. Records are owned by the
//! [`ParameterTable`](crate::parameters::ParameterTable); all mutation goes
//! through the table so that ties, derived values and vary indices stay
//! consistent.

use std::fmt;

use crate::parameters::derived::DerivedExpression;
use crate::parameters::limits::Limits;

/// Default settings a model function declares for one of its parameters.
///
/// NaN limits mean "no limit". A zero `step` lets the engine choose.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefaults {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub hard_min: f64,
    pub hard_max: f64,
    pub step: f64,
    pub rel_step: f64,
    pub frozen: bool,
    pub is_norm: bool,
    pub units: String,
}

impl ParameterDefaults {
    /// An unbounded, free parameter.
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            min: f64::NAN,
            max: f64::NAN,
            hard_min: f64::NAN,
            hard_max: f64::NAN,
            step: 0.0,
            rel_step: 0.01,
            frozen: false,
            is_norm: false,
            units: String::new(),
        }
    }

    /// Set the soft bounds
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the hard limits
    pub fn with_hard_limits(mut self, hard_min: f64, hard_max: f64) -> Self {
        self.hard_min = hard_min;
        self.hard_max = hard_max;
        self
    }

    /// Set the absolute and relative step hints
    pub fn with_step(mut self, step: f64, rel_step: f64) -> Self {
        self.step = step;
        self.rel_step = rel_step;
        self
    }

    /// Start frozen
    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// Mark as the normalization of its function
    pub fn norm(mut self) -> Self {
        self.is_norm = true;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }
}

/// Format a full parameter name, `function(instance).param`.
pub fn full_name(function_name: &str, instance_id: u32, param_name: &str) -> String {
    format!("{}({}).{}", function_name, instance_id, param_name)
}

/// A parsed full parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullName {
    pub function_name: String,
    pub instance_id: u32,
    pub param_name: String,
}

impl FullName {
    /// Parse `function(instance).param`. Returns `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        let open = name.find('(')?;
        let close = open + name[open..].find(')')?;
        let param_name = name[close + 1..].strip_prefix('.')?;
        let function_name = &name[..open];
        if function_name.is_empty() || param_name.is_empty() {
            return None;
        }
        let instance_id = name[open + 1..close].trim().parse().ok()?;
        Some(Self {
            function_name: function_name.to_string(),
            instance_id,
            param_name: param_name.to_string(),
        })
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}).{}", self.function_name, self.instance_id, self.param_name)
    }
}

/// One scalar fit parameter.
#[derive(Debug, Clone)]
pub struct ParameterRecord {
    pub(crate) name: String,
    pub(crate) function_name: String,
    pub(crate) instance_id: u32,
    pub(crate) local_index: usize,
    pub(crate) global_index: usize,
    pub(crate) vary_index: Option<usize>,

    pub(crate) value: f64,
    pub(crate) limits: Limits,
    pub(crate) step: f64,
    pub(crate) rel_step: f64,

    pub(crate) frozen: bool,
    pub(crate) tie_target: Option<String>,
    pub(crate) derived: Option<DerivedExpression>,

    pub(crate) in_use: bool,
    pub(crate) is_norm: bool,
    pub(crate) ref_count: usize,
    pub(crate) initialized: bool,
    pub(crate) units: String,

    defaults: ParameterDefaults,
}

impl ParameterRecord {
    /// Create an unused, uninitialized record. `limits` must already have
    /// been validated against `defaults`.
    pub(crate) fn new(
        function_name: &str,
        instance_id: u32,
        local_index: usize,
        global_index: usize,
        defaults: ParameterDefaults,
        limits: Limits,
    ) -> Self {
        Self {
            name: defaults.name.clone(),
            function_name: function_name.to_string(),
            instance_id,
            local_index,
            global_index,
            vary_index: None,
            value: defaults.value,
            limits,
            step: defaults.step,
            rel_step: defaults.rel_step,
            frozen: defaults.frozen,
            tie_target: None,
            derived: None,
            in_use: false,
            is_norm: defaults.is_norm,
            ref_count: 0,
            initialized: false,
            units: defaults.units.clone(),
            defaults,
        }
    }

    /// Mark the record in use, applying its defaults on the first
    /// unused-to-used transition.
    pub(crate) fn activate(&mut self) {
        if !self.initialized {
            self.value = self.defaults.value;
            self.step = self.defaults.step;
            self.rel_step = self.defaults.rel_step;
            self.frozen = self.defaults.frozen;
            self.initialized = true;
        }
        self.in_use = true;
        self.ref_count += 1;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// `function(instance).param`
    pub fn full_name(&self) -> String {
        full_name(&self.function_name, self.instance_id, &self.name)
    }

    pub fn local_index(&self) -> usize {
        self.local_index
    }

    /// Table-wide index, 1-based.
    pub fn global_index(&self) -> usize {
        self.global_index
    }

    /// Position in the most recent free vector, if this record was free then.
    pub fn vary_index(&self) -> Option<usize> {
        self.vary_index
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn min(&self) -> f64 {
        self.limits.min
    }

    pub fn max(&self) -> f64 {
        self.limits.max
    }

    pub fn hard_min(&self) -> f64 {
        self.limits.hard_min
    }

    pub fn hard_max(&self) -> f64 {
        self.limits.hard_max
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn rel_step(&self) -> f64 {
        self.rel_step
    }

    /// True when frozen explicitly or implied by a tie or derived expression.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_tied(&self) -> bool {
        self.tie_target.is_some()
    }

    /// Full name of the parameter this one mirrors.
    pub fn tie_target(&self) -> Option<&str> {
        self.tie_target.as_deref()
    }

    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }

    pub fn derived(&self) -> Option<&DerivedExpression> {
        self.derived.as_ref()
    }

    /// Varied by the engine on the next `pack_variable`.
    pub fn is_free(&self) -> bool {
        self.in_use && !self.frozen && self.tie_target.is_none() && self.derived.is_none()
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn is_norm(&self) -> bool {
        self.is_norm
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn defaults(&self) -> &ParameterDefaults {
        &self.defaults
    }
}

impl fmt::Display for ParameterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.derived.is_some() {
            "derived".to_string()
        } else if let Some(target) = &self.tie_target {
            format!("= {}", target)
        } else if self.frozen {
            "frozen".to_string()
        } else {
            "free".to_string()
        };
        write!(
            f,
            "{:>4}  {:<24} {:>14.6e} {:<8} [{}, {}] {}",
            self.global_index,
            self.full_name(),
            self.value,
            self.units,
            self.limits.min,
            self.limits.max,
            state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_round_trip() {
        let name = full_name("powerlaw", 2, "PhoIndex");
        assert_eq!(name, "powerlaw(2).PhoIndex");

        let parsed = FullName::parse(&name).unwrap();
        assert_eq!(parsed.function_name, "powerlaw");
        assert_eq!(parsed.instance_id, 2);
        assert_eq!(parsed.param_name, "PhoIndex");
        assert_eq!(parsed.to_string(), name);
    }

    #[test]
    fn test_full_name_rejects_malformed() {
        assert!(FullName::parse("powerlaw.PhoIndex").is_none());
        assert!(FullName::parse("powerlaw(x).PhoIndex").is_none());
        assert!(FullName::parse("powerlaw(1)PhoIndex").is_none());
        assert!(FullName::parse("(1).PhoIndex").is_none());
        assert!(FullName::parse("powerlaw(1).").is_none());
    }

    #[test]
    fn test_activate_applies_defaults_once() {
        let defaults = ParameterDefaults::new("norm", 1.0).frozen();
        let limits = Limits::default();
        let mut record = ParameterRecord::new("powerlaw", 1, 0, 1, defaults, limits);
        assert!(!record.in_use());

        record.activate();
        assert!(record.in_use());
        assert!(record.is_frozen());
        assert_eq!(record.ref_count(), 1);

        record.value = 5.0;
        record.frozen = false;
        record.in_use = false;
        record.activate();
        assert_eq!(record.value(), 5.0);
        assert!(!record.is_frozen());
        assert_eq!(record.ref_count(), 2);
    }
}
