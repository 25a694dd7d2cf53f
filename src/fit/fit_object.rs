//! The bound fit: one engine, one statistic, one model callback
//!
//! A [`FitObject`] is opened from a [`FitEnvironment`], used for one or more
//! engine runs, and closed. Only one fit may be open per environment at a
//! time; the [`FitSession`] guard held by the fit object enforces this and
//! releases the environment on every exit path.

use log::{debug, warn};
use ndarray::{Array1, ArrayView1};
use std::cell::Cell;
use std::fmt;

use crate::error::{FitError, Result};
use crate::fit::constraint::{ConstrainedStatistic, ConstraintFn};
use crate::fit::data::{FitData, ModelEvaluator};
use crate::fit::engine::{Engine, EngineRegistry, EngineReport, Evaluation, Objective};
use crate::fit::options::{OptionString, ParseMode};
use crate::fit::statistic::{AuxiliaryData, Statistic, StatisticInput, StatisticRegistry};
use crate::parameters::{PackedParameters, ParameterTable, Severity};

/// Registries plus the fit-in-progress flag.
#[derive(Debug)]
pub struct FitEnvironment {
    pub statistics: StatisticRegistry,
    pub engines: EngineRegistry,
    in_progress: Cell<bool>,
}

impl FitEnvironment {
    pub fn new(statistics: StatisticRegistry, engines: EngineRegistry) -> Self {
        Self {
            statistics,
            engines,
            in_progress: Cell::new(false),
        }
    }

    /// `chi` statistic and `leven` engine.
    #[cfg(feature = "lm")]
    pub fn with_defaults() -> Self {
        Self::new(StatisticRegistry::with_defaults(), EngineRegistry::with_defaults())
    }

    pub fn is_fit_in_progress(&self) -> bool {
        self.in_progress.get()
    }

    /// Shorthand for [`FitObject::open`].
    pub fn open<'env>(
        &'env self,
        engine_spec: &str,
        statistic_spec: &str,
        model: Box<dyn ModelEvaluator + 'env>,
        constraint: Option<ConstraintFn>,
        data_size: usize,
    ) -> Result<FitObject<'env>> {
        FitObject::open(self, engine_spec, statistic_spec, model, constraint, data_size)
    }
}

/// Holds the fit-in-progress flag for as long as it lives.
#[derive(Debug)]
pub struct FitSession<'env> {
    flag: &'env Cell<bool>,
}

impl<'env> FitSession<'env> {
    fn begin(flag: &'env Cell<bool>) -> Result<Self> {
        if flag.replace(true) {
            return Err(FitError::FitInProgress);
        }
        Ok(Self { flag })
    }
}

impl Drop for FitSession<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    Converged,
    /// The engine stopped without meeting its convergence criteria.
    NotConverged(String),
    /// Numerical failure; parameters were restored.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Final free-parameter values (pre-call values on failure)
    pub params: Array1<f64>,
    /// Final statistic, `f64::MAX` on failure
    pub statistic: f64,
    pub status: FitStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub message: String,
}

impl FitResult {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, FitStatus::Failed(_))
    }

    pub fn is_converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    fn failed(params: Array1<f64>, reason: String, evaluations: usize) -> Self {
        Self {
            params,
            statistic: f64::MAX,
            status: FitStatus::Failed(reason.clone()),
            iterations: 0,
            evaluations,
            message: reason,
        }
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Result:")?;
        writeln!(f, "  Status: {:?}", self.status)?;
        writeln!(f, "  Statistic: {:.6e}", self.statistic)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Evaluations: {}", self.evaluations)?;
        writeln!(f, "  Message: {}", self.message)?;
        write!(f, "  Parameters: {:?}", self.params.as_slice().unwrap_or(&[]))
    }
}

/// Either the statistic itself or the statistic behind a constraint.
enum BoundStatistic {
    Plain(Box<dyn Statistic>),
    Constrained(ConstrainedStatistic),
}

impl BoundStatistic {
    fn get(&self) -> &dyn Statistic {
        match self {
            BoundStatistic::Plain(s) => s.as_ref(),
            BoundStatistic::Constrained(c) => c,
        }
    }

    fn get_mut(&mut self) -> &mut dyn Statistic {
        match self {
            BoundStatistic::Plain(s) => s.as_mut(),
            BoundStatistic::Constrained(c) => c,
        }
    }

    fn into_inner(self) -> Box<dyn Statistic> {
        match self {
            BoundStatistic::Plain(s) => s,
            BoundStatistic::Constrained(c) => c.into_inner(),
        }
    }
}

fn compute_statistic<'a>(
    statistic: &mut dyn Statistic,
    data: &'a FitData,
    predicted: &'a Array1<f64>,
    free_parameters: ArrayView1<'a, f64>,
) -> Result<Evaluation> {
    if predicted.len() != data.len() {
        return Err(FitError::ModelEvaluation(format!(
            "model returned {} values for {} data points",
            predicted.len(),
            data.len()
        )));
    }
    let value = statistic.compute(&StatisticInput {
        observed: data.y().view(),
        predicted: predicted.view(),
        weights: data.weights().view(),
        free_parameters,
    })?;
    if !value.value.is_finite() {
        return Err(FitError::Numerical(format!("statistic is {}", value.value)));
    }
    Ok(Evaluation {
        residuals: value.residuals,
        statistic: value.value,
    })
}

/// Model receives the engine's vector directly.
struct DirectObjective<'a> {
    model: &'a mut dyn ModelEvaluator,
    statistic: &'a mut dyn Statistic,
    data: &'a FitData,
    evaluations: usize,
}

impl Objective for DirectObjective<'_> {
    fn evaluate(&mut self, params: &Array1<f64>) -> Result<Evaluation> {
        self.evaluations += 1;
        let predicted = self.model.evaluate(self.data.x().view(), params.view())?;
        compute_statistic(self.statistic, self.data, &predicted, params.view())
    }

    fn n_points(&self) -> usize {
        self.data.len()
    }

    fn n_evaluations(&self) -> usize {
        self.evaluations
    }
}

/// Each trial is written into the table; the model sees every in-use value.
struct TableObjective<'a> {
    table: &'a mut ParameterTable,
    model: &'a mut dyn ModelEvaluator,
    statistic: &'a mut dyn Statistic,
    data: &'a FitData,
    evaluations: usize,
}

impl Objective for TableObjective<'_> {
    fn evaluate(&mut self, params: &Array1<f64>) -> Result<Evaluation> {
        self.evaluations += 1;
        self.table.unpack_variable(params)?;
        let all = self.table.values_all();
        let predicted = self.model.evaluate(self.data.x().view(), all.view())?;
        compute_statistic(self.statistic, self.data, &predicted, params.view())
    }

    fn n_points(&self) -> usize {
        self.data.len()
    }

    fn n_evaluations(&self) -> usize {
        self.evaluations
    }
}

/// An open fit.
pub struct FitObject<'env> {
    session: FitSession<'env>,
    engine: Box<dyn Engine>,
    statistic: BoundStatistic,
    model: Box<dyn ModelEvaluator + 'env>,
    data_size: usize,
}

impl fmt::Debug for FitObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitObject")
            .field("engine", &self.engine.name())
            .field("statistic", &self.statistic.get().name())
            .field("constrained", &matches!(self.statistic, BoundStatistic::Constrained(_)))
            .field("data_size", &self.data_size)
            .finish()
    }
}

impl<'env> FitObject<'env> {
    /// Resolve the engine and statistic and bind them to `model`.
    ///
    /// An empty or `"default"` statistic name selects the engine's default
    /// statistic. Fails with [`FitError::FitInProgress`] while another fit of
    /// the same environment is open.
    pub fn open(
        env: &'env FitEnvironment,
        engine_spec: &str,
        statistic_spec: &str,
        model: Box<dyn ModelEvaluator + 'env>,
        constraint: Option<ConstraintFn>,
        data_size: usize,
    ) -> Result<Self> {
        let session = FitSession::begin(&env.in_progress)?;

        let (engine, default_statistic) = env.engines.find(engine_spec)?;
        let parsed = OptionString::parse(statistic_spec)?;
        let mut statistic =
            env.statistics
                .create(&parsed, Some(default_statistic.as_str()), ParseMode::Strict)?;
        statistic.prepare(data_size)?;

        debug!(
            "Opened fit with engine {} and statistic {}{}",
            engine.name(),
            statistic.name(),
            if constraint.is_some() { " (constrained)" } else { "" }
        );

        let statistic = match constraint {
            Some(constraint) => {
                BoundStatistic::Constrained(ConstrainedStatistic::new(statistic, constraint))
            }
            None => BoundStatistic::Plain(statistic),
        };

        Ok(Self {
            session,
            engine,
            statistic,
            model,
            data_size,
        })
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn statistic_name(&self) -> &str {
        self.statistic.get().name()
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self.statistic, BoundStatistic::Constrained(_))
    }

    pub fn set_auxiliary(&mut self, aux: AuxiliaryData) {
        self.statistic.get_mut().set_auxiliary(aux);
    }

    /// Statistic report line for a value.
    pub fn report(&self, value: f64, n_varying: usize) -> String {
        self.statistic.get().report(value, self.data_size, n_varying)
    }

    fn check_data(&self, data: &FitData) -> Result<()> {
        if data.len() != self.data_size {
            return Err(FitError::DimensionMismatch(format!(
                "fit was opened for {} points, data has {}",
                self.data_size,
                data.len()
            )));
        }
        Ok(())
    }

    /// Evaluate the model and statistic once at `params`.
    pub fn evaluate(&mut self, data: &FitData, params: &Array1<f64>) -> Result<Evaluation> {
        self.check_data(data)?;
        let mut objective = DirectObjective {
            model: self.model.as_mut(),
            statistic: self.statistic.get_mut(),
            data,
            evaluations: 0,
        };
        objective.evaluate(params)
    }

    /// Run the engine on a copy of `packed.values`.
    ///
    /// The returned parameters are checked against the hard limits; anything
    /// non-finite or outside them discards the whole result.
    pub fn run(&mut self, data: &FitData, packed: &PackedParameters) -> Result<FitResult> {
        self.check_data(data)?;
        let initial = packed.values.clone();
        let mut params = initial.clone();

        let mut objective = DirectObjective {
            model: self.model.as_mut(),
            statistic: self.statistic.get_mut(),
            data,
            evaluations: 0,
        };
        let outcome = self.engine.optimize(&mut objective, packed, &mut params);
        let evaluations = objective.evaluations;
        Ok(self.finish(outcome, initial, params, packed, evaluations))
    }

    /// Fit the free parameters of `table`.
    ///
    /// On success the table holds the fitted values; on failure it is put back
    /// at the values it had on entry. A table without free parameters is only
    /// evaluated.
    pub fn run_on_table(&mut self, table: &mut ParameterTable, data: &FitData) -> Result<FitResult> {
        self.check_data(data)?;

        if table.count_params().free == 0 {
            table.sync_derived(Severity::Strict)?;
            table.sync_tied()?;
            let all = table.values_all();
            let empty = Array1::zeros(0);
            let evaluation = self
                .model
                .evaluate(data.x().view(), all.view())
                .and_then(|predicted| {
                    compute_statistic(self.statistic.get_mut(), data, &predicted, empty.view())
                });
            return Ok(match evaluation {
                Ok(evaluation) => FitResult {
                    params: empty,
                    statistic: evaluation.statistic,
                    status: FitStatus::Converged,
                    iterations: 0,
                    evaluations: 1,
                    message: "no free parameters".to_string(),
                },
                Err(e) => {
                    warn!("Evaluation without free parameters failed: {}", e);
                    FitResult::failed(empty, e.to_string(), 1)
                }
            });
        }

        let packed = table.pack_variable()?;
        let initial = packed.values.clone();
        let mut params = initial.clone();

        let mut objective = TableObjective {
            table: &mut *table,
            model: self.model.as_mut(),
            statistic: self.statistic.get_mut(),
            data,
            evaluations: 0,
        };
        let outcome = self.engine.optimize(&mut objective, &packed, &mut params);
        let evaluations = objective.evaluations;
        let result = self.finish(outcome, initial, params, &packed, evaluations);

        // the last trial the engine evaluated is not necessarily the result
        table.unpack_variable(&result.params)?;
        Ok(result)
    }

    fn finish(
        &self,
        outcome: Result<EngineReport>,
        initial: Array1<f64>,
        params: Array1<f64>,
        packed: &PackedParameters,
        evaluations: usize,
    ) -> FitResult {
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!("Engine {} failed: {}", self.engine.name(), e);
                return FitResult::failed(initial, e.to_string(), evaluations);
            }
        };

        let outside = params.iter().enumerate().find(|(i, v)| {
            !v.is_finite() || **v < packed.hard_min[*i] || **v > packed.hard_max[*i]
        });
        if let Some((i, v)) = outside {
            let reason = format!(
                "engine {} returned parameter {} = {} outside [{}, {}]",
                self.engine.name(),
                i,
                v,
                packed.hard_min[i],
                packed.hard_max[i]
            );
            warn!("Discarding fit result: {}", reason);
            return FitResult::failed(initial, reason, evaluations);
        }
        if !report.statistic.is_finite() {
            let reason = format!("engine {} returned statistic {}", self.engine.name(), report.statistic);
            warn!("Discarding fit result: {}", reason);
            return FitResult::failed(initial, reason, evaluations);
        }

        let status = if report.converged {
            FitStatus::Converged
        } else {
            FitStatus::NotConverged(report.message.clone())
        };
        FitResult {
            params,
            statistic: report.statistic,
            status,
            iterations: report.iterations,
            evaluations: report.evaluations.max(evaluations),
            message: report.message,
        }
    }

    /// Pair this fit with a data set for repeated table refits.
    pub fn bind<'a>(&'a mut self, data: &'a FitData) -> BoundFit<'a, 'env> {
        BoundFit { fit: self, data }
    }

    /// Release per-fit buffers, end the session, and hand back the statistic
    /// with any constraint wrapper removed.
    pub fn close(self) -> Box<dyn Statistic> {
        let FitObject {
            session,
            statistic,
            engine,
            ..
        } = self;
        let mut statistic = statistic.into_inner();
        statistic.release();
        debug!("Closed fit with engine {}", engine.name());
        drop(session);
        statistic
    }
}

/// A fit object paired with its data.
pub struct BoundFit<'a, 'env> {
    fit: &'a mut FitObject<'env>,
    data: &'a FitData,
}

impl BoundFit<'_, '_> {
    pub fn run_on_table(&mut self, table: &mut ParameterTable) -> Result<FitResult> {
        self.fit.run_on_table(table, self.data)
    }

    pub fn n_points(&self) -> usize {
        self.data.len()
    }
}
