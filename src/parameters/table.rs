//! The parameter table
//!
//! The table owns one [`ParameterBlock`] per registered model-function
//! instance. Blocks live in an arena and are addressed by slot; a map from
//! `(function, instance)` to slot gives registration its at-most-one-block
//! guarantee and a map from global index to `(slot, local)` gives O(1) record
//! lookup. Traversal order (used by packing) is block registration order, then
//! record order within a block. Replacing a block on a version change keeps its
//! position in that order.

use log::{debug, warn};
use ndarray::Array1;
use std::collections::HashMap;

use crate::error::{FitError, Result};
use crate::parameters::derived::{
    unusable_value, DerivedExpression, ParameterLookup, ParameterRef, Severity, SyncContext,
};
use crate::parameters::limits::{Limits, LimitsError};
use crate::parameters::record::{FullName, ParameterDefaults, ParameterRecord};
use crate::parameters::snapshot::{ParameterSnapshot, SnapshotEntry};

/// Supplies default settings for each parameter of a function being registered.
pub trait DefaultsProvider {
    fn defaults(&self, local_index: usize) -> Result<ParameterDefaults>;
}

impl DefaultsProvider for [ParameterDefaults] {
    fn defaults(&self, local_index: usize) -> Result<ParameterDefaults> {
        self.get(local_index).cloned().ok_or_else(|| {
            FitError::Configuration(format!("no defaults for parameter {}", local_index))
        })
    }
}

impl DefaultsProvider for Vec<ParameterDefaults> {
    fn defaults(&self, local_index: usize) -> Result<ParameterDefaults> {
        self.as_slice().defaults(local_index)
    }
}

/// The parameters of one model-function instance.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    function_name: String,
    instance_id: u32,
    version: u32,
    records: Vec<ParameterRecord>,
}

impl ParameterBlock {
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn records(&self) -> &[ParameterRecord] {
        &self.records
    }

    fn all_unused(&self) -> bool {
        self.records.iter().all(|r| !r.in_use)
    }
}

/// Parameter vectors handed to an engine. Every array has one entry per
/// packed parameter, in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedParameters {
    pub values: Array1<f64>,
    pub min: Array1<f64>,
    pub max: Array1<f64>,
    pub hard_min: Array1<f64>,
    pub hard_max: Array1<f64>,
    pub step: Array1<f64>,
    pub rel_step: Array1<f64>,
    pub global_index: Vec<usize>,
}

impl PackedParameters {
    fn from_records<'a>(records: impl Iterator<Item = &'a ParameterRecord>) -> Self {
        let records: Vec<&ParameterRecord> = records.collect();
        let column = |f: fn(&ParameterRecord) -> f64| -> Array1<f64> {
            records.iter().map(|r| f(r)).collect()
        };
        Self {
            values: column(|r| r.value),
            min: column(|r| r.limits.min),
            max: column(|r| r.limits.max),
            hard_min: column(|r| r.limits.hard_min),
            hard_max: column(|r| r.limits.hard_max),
            step: column(|r| r.step),
            rel_step: column(|r| r.rel_step),
            global_index: records.iter().map(|r| r.global_index).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same bounds with different values.
    pub fn with_values(&self, values: Array1<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.len(),
                values.len()
            )));
        }
        Ok(Self {
            values,
            ..self.clone()
        })
    }
}

/// Parameter counts reported by [`ParameterTable::count_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterCount {
    pub in_use: usize,
    pub free: usize,
}

/// All parameters of the current model.
#[derive(Debug, Clone)]
pub struct ParameterTable {
    slots: Vec<Option<ParameterBlock>>,
    free_slots: Vec<usize>,
    order: Vec<usize>,
    by_key: HashMap<(String, u32), usize>,
    by_global: HashMap<usize, (usize, usize)>,
    next_global: usize,
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            order: Vec::new(),
            by_key: HashMap::new(),
            by_global: HashMap::new(),
            next_global: 1,
        }
    }

    /// Register the parameters of one function instance and return the global
    /// index of its first parameter.
    ///
    /// Registering the same `(function, instance)` with the same version marks
    /// the existing block in use again. A different version replaces the block
    /// with fresh global indices. Defaults are validated before anything is
    /// changed.
    ///
    /// # Examples
    ///
    /// ```
    /// use specfit_rs::parameters::{ParameterDefaults, ParameterTable};
    ///
    /// let mut table = ParameterTable::new();
    /// let defaults = vec![
    ///     ParameterDefaults::new("PhoIndex", 1.7).with_bounds(-3.0, 10.0),
    ///     ParameterDefaults::new("norm", 1.0).with_bounds(0.0, 1e24).norm(),
    /// ];
    /// let start = table.register("powerlaw", 1, 1, 2, &defaults).unwrap();
    /// assert_eq!(start, 1);
    /// assert_eq!(table.find_by_full_name("powerlaw(1).norm").unwrap().global_index(), 2);
    /// ```
    pub fn register(
        &mut self,
        function_name: &str,
        instance_id: u32,
        version: u32,
        n_params: usize,
        defaults: &dyn DefaultsProvider,
    ) -> Result<usize> {
        let key = (function_name.to_string(), instance_id);
        let existing = self.by_key.get(&key).copied();

        if let Some(slot) = existing {
            if let Some(block) = self.slots[slot].as_mut() {
                if block.version == version {
                    for record in &mut block.records {
                        record.activate();
                    }
                    return Ok(block
                        .records
                        .first()
                        .map(|r| r.global_index)
                        .unwrap_or(self.next_global));
                }
            }
        }

        if self.order.is_empty() {
            self.next_global = 1;
        }
        let start = self.next_global;

        let mut records = Vec::with_capacity(n_params);
        for local in 0..n_params {
            let d = defaults.defaults(local)?;
            let limits = Limits::from_defaults(d.value, d.min, d.max, d.hard_min, d.hard_max)
                .map_err(|e| {
                    FitError::Configuration(format!(
                        "{}({}).{}: {}",
                        function_name, instance_id, d.name, e
                    ))
                })?;
            records.push(ParameterRecord::new(
                function_name,
                instance_id,
                local,
                start + local,
                d,
                limits,
            ));
        }
        for record in &mut records {
            record.activate();
        }

        let block = ParameterBlock {
            function_name: function_name.to_string(),
            instance_id,
            version,
            records,
        };

        let slot = match existing {
            Some(slot) => {
                debug!(
                    "Replacing parameters of {}({}) for version {}",
                    function_name, instance_id, version
                );
                if let Some(old) = self.slots[slot].take() {
                    for record in &old.records {
                        self.by_global.remove(&record.global_index);
                    }
                }
                slot
            }
            None => {
                let slot = match self.free_slots.pop() {
                    Some(slot) => slot,
                    None => {
                        self.slots.push(None);
                        self.slots.len() - 1
                    }
                };
                self.order.push(slot);
                self.by_key.insert(key, slot);
                slot
            }
        };

        for (local, record) in block.records.iter().enumerate() {
            self.by_global.insert(record.global_index, (slot, local));
        }
        self.slots[slot] = Some(block);
        self.next_global = start + n_params;
        Ok(start)
    }

    /// Mark every record unused, ahead of re-walking the model.
    pub fn mark_all_unused(&mut self) {
        for block in self.slots.iter_mut().flatten() {
            for record in &mut block.records {
                record.in_use = false;
            }
        }
    }

    /// Remove one function instance's block.
    pub fn delete(&mut self, function_name: &str, instance_id: u32) -> Result<()> {
        let key = (function_name.to_string(), instance_id);
        let slot = self.by_key.remove(&key).ok_or_else(|| {
            FitError::ParameterNotFound(format!("{}({})", function_name, instance_id))
        })?;
        self.release_slot(slot);
        Ok(())
    }

    fn release_slot(&mut self, slot: usize) {
        if let Some(block) = self.slots[slot].take() {
            for record in &block.records {
                self.by_global.remove(&record.global_index);
            }
        }
        self.order.retain(|&s| s != slot);
        self.free_slots.push(slot);
        if self.order.is_empty() {
            self.next_global = 1;
        }
    }

    /// Delete every block whose records are all unused. Returns how many
    /// blocks were removed.
    pub fn collect_unused(&mut self) -> usize {
        let unused: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&slot| self.slots[slot].as_ref().is_some_and(|b| b.all_unused()))
            .collect();
        for &slot in &unused {
            self.by_key.retain(|_, s| *s != slot);
            self.release_slot(slot);
        }
        debug!("Collected {} unused blocks", unused.len());
        unused.len()
    }

    /// Blocks in traversal order
    pub fn blocks(&self) -> impl Iterator<Item = &ParameterBlock> + '_ {
        self.order.iter().filter_map(|&slot| self.slots[slot].as_ref())
    }

    pub fn block(&self, function_name: &str, instance_id: u32) -> Option<&ParameterBlock> {
        let slot = *self.by_key.get(&(function_name.to_string(), instance_id))?;
        self.slots[slot].as_ref()
    }

    /// Records in traversal order, used or not
    pub fn iter(&self) -> impl Iterator<Item = &ParameterRecord> + '_ {
        self.blocks().flat_map(|b| b.records.iter())
    }

    fn in_use_records(&self) -> impl Iterator<Item = &ParameterRecord> + '_ {
        self.iter().filter(|r| r.in_use)
    }

    /// Total number of records, used or not
    pub fn len(&self) -> usize {
        self.by_global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_global.is_empty()
    }

    pub fn find_by_index(&self, global_index: usize) -> Option<&ParameterRecord> {
        let &(slot, local) = self.by_global.get(&global_index)?;
        self.slots[slot].as_ref()?.records.get(local)
    }

    fn record_mut(&mut self, global_index: usize) -> Result<&mut ParameterRecord> {
        let &(slot, local) = self
            .by_global
            .get(&global_index)
            .ok_or_else(|| FitError::ParameterNotFound(format!("p{}", global_index)))?;
        self.slots[slot]
            .as_mut()
            .and_then(|b| b.records.get_mut(local))
            .ok_or_else(|| FitError::ParameterNotFound(format!("p{}", global_index)))
    }

    fn record(&self, global_index: usize) -> Result<&ParameterRecord> {
        self.find_by_index(global_index)
            .ok_or_else(|| FitError::ParameterNotFound(format!("p{}", global_index)))
    }

    /// The in-use free record assigned `vary_index` by the last `pack_variable`.
    pub fn find_by_vary_index(&self, vary_index: usize) -> Option<&ParameterRecord> {
        self.in_use_records()
            .find(|r| r.is_free() && r.vary_index == Some(vary_index))
    }

    /// Look up `function(instance).param`.
    pub fn find_by_full_name(&self, name: &str) -> Option<&ParameterRecord> {
        let parsed = FullName::parse(name)?;
        self.block(&parsed.function_name, parsed.instance_id)?
            .records
            .iter()
            .find(|r| r.name == parsed.param_name)
    }

    /// Look up a record by its function instance and position in it.
    pub fn find_local(
        &self,
        function_name: &str,
        instance_id: u32,
        local_index: usize,
    ) -> Option<&ParameterRecord> {
        self.block(function_name, instance_id)?.records.get(local_index)
    }

    pub fn full_name(&self, global_index: usize) -> Option<String> {
        self.find_by_index(global_index).map(|r| r.full_name())
    }

    fn resolve(&self, reference: &ParameterRef) -> Result<&ParameterRecord> {
        match reference {
            ParameterRef::Index(index) => self.record(*index),
            ParameterRef::Name(name) => self
                .find_by_full_name(name)
                .ok_or_else(|| FitError::ParameterNotFound(name.clone())),
        }
    }

    /// Tie parameter `a` to parameter `b`. `b == 0` removes the tie.
    pub fn set_tie(&mut self, a: usize, b: usize) -> Result<()> {
        if b == 0 {
            let record = self.record_mut(a)?;
            if record.tie_target.take().is_some() && record.derived.is_none() {
                record.frozen = false;
            }
            return self.sync_derived(Severity::Lenient);
        }
        if a == b {
            return Err(FitError::Tie(format!("p{} cannot be tied to itself", a)));
        }
        self.record(a)?;
        let target = self.record(b)?;

        let target_name = target.full_name();
        let mut hop = Some(target);
        let mut hops = 0;
        while let Some(record) = hop {
            if record.global_index == a {
                return Err(FitError::Tie(format!(
                    "tying p{} to {} would form a cycle",
                    a, target_name
                )));
            }
            hops += 1;
            if hops > self.len() {
                break;
            }
            hop = record
                .tie_target
                .as_deref()
                .and_then(|name| self.find_by_full_name(name));
        }

        let previous = self.record_mut(a)?.tie_target.replace(target_name);
        if let Err(err) = self.check_tie_limits(a) {
            self.record_mut(a)?.tie_target = previous;
            return Err(err);
        }
        self.record_mut(a)?.frozen = true;
        self.sync_derived(Severity::Lenient)
    }

    /// Every tied record whose chain runs through `through` must be able to
    /// hold its root's value within its own hard limits.
    fn check_tie_limits(&self, through: usize) -> Result<()> {
        for record in self.in_use_records() {
            if record.derived.is_some() || !self.tie_chain_contains(record, through) {
                continue;
            }
            let Ok(root) = self.tie_root(record) else {
                continue;
            };
            if !record.limits.within_hard(root.value) {
                return Err(FitError::Tie(format!(
                    "{} = {} is outside the hard limits [{}, {}] of {}",
                    root.full_name(),
                    root.value,
                    record.limits.hard_min,
                    record.limits.hard_max,
                    record.full_name()
                )));
            }
        }
        Ok(())
    }

    fn tie_chain_contains(&self, record: &ParameterRecord, global_index: usize) -> bool {
        let mut current = Some(record);
        for _ in 0..=self.len() {
            let Some(hop) = current else {
                return false;
            };
            if hop.global_index == global_index {
                return hop.tie_target.is_some();
            }
            current = hop
                .tie_target
                .as_deref()
                .and_then(|name| self.find_by_full_name(name));
        }
        false
    }

    /// Install (`Some`) or clear (`None`) a derived expression.
    ///
    /// Installing freezes the parameter. Clearing an installed expression thaws
    /// it. Every parameter a formula refers to must exist.
    pub fn set_derived_expression(
        &mut self,
        global_index: usize,
        expression: Option<DerivedExpression>,
    ) -> Result<()> {
        match expression {
            Some(expression) => {
                self.record(global_index)?;
                for reference in expression.references() {
                    self.resolve(&reference)?;
                }
                let record = self.record_mut(global_index)?;
                record.derived = Some(expression);
                record.frozen = true;
            }
            None => {
                let record = self.record_mut(global_index)?;
                if record.derived.take().is_some() && record.tie_target.is_none() {
                    record.frozen = false;
                }
            }
        }
        self.sync_derived(Severity::Lenient)
    }

    /// Freeze or thaw. Tied and derived parameters cannot be thawed.
    pub fn set_freeze(&mut self, global_index: usize, frozen: bool) -> Result<()> {
        let record = self.record_mut(global_index)?;
        if !frozen && (record.tie_target.is_some() || record.derived.is_some()) {
            return Err(FitError::Configuration(format!(
                "{} is tied or derived and cannot be thawed",
                record.full_name()
            )));
        }
        record.frozen = frozen;
        self.sync_derived(Severity::Lenient)
    }

    /// Set a value. Values outside the soft bounds are rejected.
    pub fn set_value(&mut self, global_index: usize, value: f64) -> Result<()> {
        let record = self.record_mut(global_index)?;
        record.limits.check_value(value)?;
        record.value = value;
        self.sync_derived(Severity::Lenient)
    }

    /// Set the soft bounds, clamping the value into them. Bounds outside the
    /// hard limits are rejected.
    pub fn set_bounds(&mut self, global_index: usize, min: f64, max: f64) -> Result<()> {
        let record = self.record_mut(global_index)?;
        let limits = record.limits.with_soft(min, max)?;
        record.value = limits.clamp(record.value);
        record.limits = limits;
        self.sync_derived(Severity::Lenient)
    }

    /// Set the step hints handed to engines.
    pub fn set_step(&mut self, global_index: usize, step: f64, rel_step: f64) -> Result<()> {
        let record = self.record_mut(global_index)?;
        record.step = step;
        record.rel_step = rel_step;
        Ok(())
    }

    pub fn set_norm(&mut self, global_index: usize, is_norm: bool) -> Result<()> {
        self.record_mut(global_index)?.is_norm = is_norm;
        Ok(())
    }

    /// Evaluate one derived parameter. `Ok(None)` means a derived evaluation
    /// is already running in `ctx` and the stored value stands.
    fn evaluate_derived(&self, global_index: usize, ctx: &SyncContext) -> Result<Option<f64>> {
        let record = self.record(global_index)?;
        let Some(expression) = record.derived.as_ref() else {
            return Ok(Some(record.value));
        };
        let Some(_guard) = ctx.enter() else {
            return Ok(None);
        };
        let scope = DerivedScope { table: self, ctx };
        expression.evaluate(&scope).map(Some)
    }

    /// Recompute every in-use derived parameter.
    pub fn sync_derived(&mut self, severity: Severity) -> Result<()> {
        let ctx = SyncContext::new();
        let derived: Vec<usize> = self
            .in_use_records()
            .filter(|r| r.derived.is_some())
            .map(|r| r.global_index)
            .collect();

        for index in derived {
            let outcome = self.evaluate_derived(index, &ctx);
            let record = self.record_mut(index)?;
            let problem = match outcome {
                Ok(Some(value)) if value.is_finite() && record.limits.contains(value) => {
                    record.value = value;
                    None
                }
                Ok(Some(value)) => Some(unusable_value(
                    record.full_name(),
                    value,
                    record.limits.min,
                    record.limits.max,
                )),
                Ok(None) => None,
                Err(e) => Some(FitError::DerivedParameter {
                    name: record.full_name(),
                    message: e.to_string(),
                }),
            };

            if let Some(err) = problem {
                match severity {
                    Severity::Lenient => warn!("{}; keeping {}", err, record.value),
                    Severity::Strict => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Follow a tie chain to the record that supplies the value.
    fn tie_root<'a>(&'a self, record: &'a ParameterRecord) -> Result<&'a ParameterRecord> {
        let mut current = record;
        for _ in 0..=self.len() {
            let Some(target) = current.tie_target.as_deref() else {
                return Ok(current);
            };
            if current.derived.is_some() && !std::ptr::eq(current, record) {
                return Ok(current);
            }
            let next = self.find_by_full_name(target).ok_or_else(|| {
                FitError::Tie(format!("{} is tied to missing {}", record.full_name(), target))
            })?;
            if !next.in_use {
                return Err(FitError::Tie(format!(
                    "{} is tied to unused {}",
                    record.full_name(),
                    target
                )));
            }
            current = next;
        }
        Err(FitError::Tie(format!("tie cycle through {}", record.full_name())))
    }

    /// Copy value and soft bounds from tie targets. Derived parameters ignore
    /// ties.
    ///
    /// A tied record keeps its own hard limits; the copied bounds are cut to
    /// them and a root value outside them is an error.
    pub fn sync_tied(&mut self) -> Result<()> {
        let mut updates = Vec::new();
        for record in self.in_use_records() {
            if record.tie_target.is_none() || record.derived.is_some() {
                continue;
            }
            let root = self.tie_root(record)?;
            let own = record.limits;
            if !own.within_hard(root.value) {
                return Err(FitError::Tie(format!(
                    "{} = {} is outside the hard limits [{}, {}] of {}",
                    root.full_name(),
                    root.value,
                    own.hard_min,
                    own.hard_max,
                    record.full_name()
                )));
            }
            let limits = Limits {
                min: root.limits.min.max(own.hard_min),
                max: root.limits.max.min(own.hard_max),
                ..own
            };
            updates.push((record.global_index, root.value, limits));
        }
        for (index, value, limits) in updates {
            let record = self.record_mut(index)?;
            record.value = value;
            record.limits = limits;
        }
        Ok(())
    }

    fn sync_all(&mut self, severity: Severity) -> Result<()> {
        self.sync_derived(severity)?;
        self.sync_tied()
    }

    /// Pack the free parameters and assign their vary indices.
    pub fn pack_variable(&mut self) -> Result<PackedParameters> {
        self.sync_all(Severity::Strict)?;

        let mut next = 0;
        for block in self.slots.iter_mut().flatten() {
            for record in &mut block.records {
                record.vary_index = None;
            }
        }
        let free: Vec<usize> = self
            .in_use_records()
            .filter(|r| r.is_free())
            .map(|r| r.global_index)
            .collect();
        if free.is_empty() {
            return Err(FitError::NoFreeParameters);
        }
        for index in &free {
            self.record_mut(*index)?.vary_index = Some(next);
            next += 1;
        }

        Ok(PackedParameters::from_records(
            self.in_use_records().filter(|r| r.is_free()),
        ))
    }

    /// Pack every in-use parameter.
    pub fn pack_all(&mut self) -> Result<PackedParameters> {
        self.sync_all(Severity::Strict)?;
        Ok(PackedParameters::from_records(self.in_use_records()))
    }

    /// Values of every in-use parameter in traversal order.
    pub fn values_all(&self) -> Array1<f64> {
        self.in_use_records().map(|r| r.value).collect()
    }

    fn write_values(&mut self, targets: Vec<usize>, values: &Array1<f64>) -> Result<()> {
        if targets.len() != values.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                targets.len(),
                values.len()
            )));
        }
        for (&index, &value) in targets.iter().zip(values.iter()) {
            self.record(index)?.limits.check_value(value)?;
        }
        for (index, &value) in targets.into_iter().zip(values.iter()) {
            self.record_mut(index)?.value = value;
        }
        Ok(())
    }

    /// Write a free vector back, then resynchronize derived and tied values.
    pub fn unpack_variable(&mut self, values: &Array1<f64>) -> Result<()> {
        self.unpack_variable_with(values, Severity::Strict)
    }

    pub fn unpack_variable_with(&mut self, values: &Array1<f64>, severity: Severity) -> Result<()> {
        let targets = self
            .in_use_records()
            .filter(|r| r.is_free())
            .map(|r| r.global_index)
            .collect();
        self.write_values(targets, values)?;
        self.sync_all(severity)
    }

    /// Write a full in-use vector back, then resynchronize.
    pub fn unpack_all(&mut self, values: &Array1<f64>) -> Result<()> {
        let targets = self.in_use_records().map(|r| r.global_index).collect();
        self.write_values(targets, values)?;
        self.sync_all(Severity::Strict)
    }

    pub fn count_params(&self) -> ParameterCount {
        self.in_use_records().fold(ParameterCount::default(), |mut c, r| {
            c.in_use += 1;
            if r.is_free() {
                c.free += 1;
            }
            c
        })
    }

    /// Record the value and freeze state of every in-use parameter.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            entries: self
                .in_use_records()
                .map(|r| SnapshotEntry {
                    global_index: r.global_index,
                    full_name: r.full_name(),
                    value: r.value,
                    frozen: r.frozen,
                })
                .collect(),
        }
    }

    /// Put values and freeze states back from a snapshot. Entries whose
    /// parameter no longer exists are skipped.
    pub fn restore(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        for entry in &snapshot.entries {
            let Ok(record) = self.record_mut(entry.global_index) else {
                debug!("Snapshot entry {} no longer exists", entry.full_name);
                continue;
            };
            if !record.limits.within_hard(entry.value) {
                return Err(LimitsError::ValueOutsideBounds {
                    value: entry.value,
                    min: record.limits.hard_min,
                    max: record.limits.hard_max,
                }
                .into());
            }
            record.value = entry.value;
            if record.tie_target.is_none() && record.derived.is_none() {
                record.frozen = entry.frozen;
            }
        }
        self.sync_all(Severity::Lenient)
    }
}

/// Lookup handed to derived expressions during one synchronization pass.
struct DerivedScope<'a> {
    table: &'a ParameterTable,
    ctx: &'a SyncContext,
}

impl ParameterLookup for DerivedScope<'_> {
    fn value(&self, reference: &ParameterRef) -> Result<f64> {
        let record = self.table.resolve(reference)?;
        if record.derived.is_some() {
            if let Some(value) = self.table.evaluate_derived(record.global_index, self.ctx)? {
                return Ok(value);
            }
        }
        Ok(record.value)
    }
}
