//! Bracket-and-interpolate search for confidence limits
//!
//! For one target parameter the search looks, on each side of the best-fit
//! value, for the point where the statistic (with every other free parameter
//! re-optimized) crosses `min_statistic + delta`.
//!
//! Each direction runs two phases. Bracketing walks from the best fit toward
//! the range end, halving the remaining distance, until a trial lands above
//! the threshold. Interpolation then narrows the bracket: one quadratic step
//! assuming `S - S_min ~ (p - best)^2`, then secant steps, with bisection
//! whenever the secant keeps landing on one side, overshoots badly, or leaves
//! the bracket.
//!
//! Any trial that beats the supposed minimum ends the whole search with
//! [`SearchState::ImprovedFit`]: the table keeps the improved parameters so the
//! caller can refit from there.

use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FitError, Result};
use crate::fit::{BoundFit, FitResult};
use crate::parameters::{ParameterSnapshot, ParameterTable};

use super::config::{SearchConfig, DEFAULT_DELTA};

/// Re-optimizes the free parameters of a table with the target frozen.
pub trait Refit {
    fn refit(&mut self, table: &mut ParameterTable) -> Result<FitResult>;

    /// Degrees of freedom of the current fit, when known.
    fn degrees_of_freedom(&self, _table: &ParameterTable) -> Option<usize> {
        None
    }
}

impl<F> Refit for F
where
    F: FnMut(&mut ParameterTable) -> Result<FitResult>,
{
    fn refit(&mut self, table: &mut ParameterTable) -> Result<FitResult> {
        self(table)
    }
}

impl Refit for BoundFit<'_, '_> {
    fn refit(&mut self, table: &mut ParameterTable) -> Result<FitResult> {
        self.run_on_table(table)
    }

    fn degrees_of_freedom(&self, table: &ParameterTable) -> Option<usize> {
        Some(self.n_points().saturating_sub(table.count_params().free))
    }
}

/// Polled once per search step; `true` abandons the search.
pub trait BreakCheck {
    fn should_break(&self) -> bool;
}

/// Never interrupts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBreak;

impl BreakCheck for NeverBreak {
    fn should_break(&self) -> bool {
        false
    }
}

impl BreakCheck for AtomicBool {
    fn should_break(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<T: BreakCheck + ?Sized> BreakCheck for Arc<T> {
    fn should_break(&self) -> bool {
        (**self).should_break()
    }
}

/// Where a one-sided search ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Bracketing,
    Interpolating,
    Converged,
    /// A trial beat the best fit; refit before searching again.
    ImprovedFit,
    /// The bracket shrank below floating-point resolution.
    Failed,
    /// Gave up; the reported value is the last trial, not a limit.
    Invalid,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchState::Bracketing | SearchState::Interpolating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Lower,
    Upper,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Lower => -1.0,
            Direction::Upper => 1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Lower => write!(f, "lower"),
            Direction::Upper => write!(f, "upper"),
        }
    }
}

/// What to search for.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitRequest {
    pub global_index: usize,
    /// Statistic increment defining the confidence level
    pub delta: f64,
    /// Statistic at the best fit
    pub min_statistic: f64,
    /// Search range; the parameter's soft bounds when `None`
    pub range: Option<(f64, f64)>,
}

impl LimitRequest {
    pub fn new(global_index: usize, min_statistic: f64) -> Self {
        Self {
            global_index,
            delta: DEFAULT_DELTA,
            min_statistic,
            range: None,
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// One side of a confidence interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitResult {
    pub value: f64,
    pub state: SearchState,
    /// Refits performed
    pub iterations: usize,
    pub interrupted: bool,
    pub message: String,
}

impl LimitResult {
    fn new(value: f64, state: SearchState, iterations: usize, message: &str) -> Self {
        Self {
            value,
            state,
            iterations,
            interrupted: false,
            message: message.to_string(),
        }
    }

    fn interrupted(value: f64, iterations: usize) -> Self {
        Self {
            interrupted: true,
            ..Self::new(value, SearchState::Invalid, iterations, "interrupted")
        }
    }

    pub fn is_converged(&self) -> bool {
        self.state == SearchState::Converged
    }
}

/// A better minimum found during the search.
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovedFit {
    pub statistic: f64,
    pub parameter_value: f64,
    /// Table state at the improved point
    pub snapshot: ParameterSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceResult {
    pub global_index: usize,
    pub name: String,
    pub best: f64,
    pub lower: LimitResult,
    pub upper: LimitResult,
    pub improved: Option<ImprovedFit>,
}

impl ConfidenceResult {
    /// Both limits converged.
    pub fn is_valid(&self) -> bool {
        self.lower.is_converged() && self.upper.is_converged()
    }

    /// `(best - lower, upper - best)`
    pub fn errors(&self) -> (f64, f64) {
        (self.best - self.lower.value, self.upper.value - self.best)
    }
}

impl fmt::Display for ConfidenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (minus, plus) = self.errors();
        write!(
            f,
            "{:>4} {:<24} {:>13.6e} {:>13.6e}    ({:.4e}, {:.4e})",
            self.global_index, self.name, self.lower.value, self.upper.value, -minus, plus
        )?;
        for (side, limit) in [("lower", &self.lower), ("upper", &self.upper)] {
            if !limit.is_converged() {
                write!(f, "\n     {} limit {:?}: {}", side, limit.state, limit.message)?;
            }
        }
        if let Some(improved) = &self.improved {
            write!(
                f,
                "\n     new minimum {:.6e} at {:.6e}; refit before searching again",
                improved.statistic, improved.parameter_value
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    statistic: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Quadratic,
    Linear,
    Bisect,
}

/// `f64::MAX` and non-finite statistics lie above every threshold.
fn very_bad(statistic: f64) -> bool {
    !statistic.is_finite() || statistic == f64::MAX
}

fn strictly_between(value: f64, a: f64, b: f64) -> bool {
    value > a.min(b) && value < a.max(b)
}

struct Context {
    index: usize,
    best: f64,
    min_statistic: f64,
    delta: f64,
    threshold: f64,
    tolerance: f64,
}

impl Context {
    fn above(&self, statistic: f64) -> bool {
        very_bad(statistic) || statistic > self.threshold
    }

    fn improves(&self, sample: &Sample) -> bool {
        !very_bad(sample.statistic) && self.min_statistic - sample.statistic > 0.5 * self.tolerance
    }

    fn converged(&self, sample: &Sample) -> bool {
        !very_bad(sample.statistic) && (sample.statistic - self.threshold).abs() <= self.tolerance
    }
}

struct DirectionOutcome {
    limit: LimitResult,
    improved: Option<Sample>,
}

impl From<LimitResult> for DirectionOutcome {
    fn from(limit: LimitResult) -> Self {
        Self {
            limit,
            improved: None,
        }
    }
}

/// Confidence-limit search over a parameter table.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceSearch<B: BreakCheck = NeverBreak> {
    config: SearchConfig,
    break_check: B,
}

impl ConfidenceSearch<NeverBreak> {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            break_check: NeverBreak,
        }
    }
}

impl<B: BreakCheck> ConfidenceSearch<B> {
    /// Poll `break_check` once per step.
    pub fn with_break_check<C: BreakCheck>(self, break_check: C) -> ConfidenceSearch<C> {
        ConfidenceSearch {
            config: self.config,
            break_check,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search both limits of one parameter.
    ///
    /// On return the table is back at its state on entry, unless a better
    /// minimum was found: then it holds the improved fit and
    /// [`ConfidenceResult::improved`] is set. A refit error restores the table
    /// and is propagated.
    pub fn run(
        &self,
        table: &mut ParameterTable,
        refit: &mut dyn Refit,
        request: &LimitRequest,
    ) -> Result<ConfidenceResult> {
        self.config.validate()?;
        let index = request.global_index;
        let record = table
            .find_by_index(index)
            .filter(|r| r.in_use())
            .ok_or_else(|| FitError::ParameterNotFound(format!("p{}", index)))?;
        let name = record.full_name();
        if record.is_tied() || record.is_derived() {
            return Err(FitError::Configuration(format!(
                "{} is tied or derived; search the parameter it depends on",
                name
            )));
        }
        let best = record.value();
        let was_frozen = record.is_frozen();
        let bounds = (record.min(), record.max());
        let hard = (record.hard_min(), record.hard_max());
        let (lo, hi) = request.range.unwrap_or(bounds);

        if !lo.is_finite() || !hi.is_finite() {
            return Err(FitError::Configuration(format!(
                "search range of {} must be finite, got [{}, {}]",
                name, lo, hi
            )));
        }
        if !(lo <= best && best <= hi) {
            return Err(FitError::Configuration(format!(
                "best-fit value {} of {} lies outside the search range [{}, {}]",
                best, name, lo, hi
            )));
        }
        if lo < hard.0 || hi > hard.1 {
            return Err(FitError::Configuration(format!(
                "search range [{}, {}] of {} exceeds its hard limits [{}, {}]",
                lo, hi, name, hard.0, hard.1
            )));
        }
        if !(request.delta > 0.0 && request.delta.is_finite()) {
            return Err(FitError::Configuration(format!(
                "statistic increment must be positive, got {}",
                request.delta
            )));
        }
        if very_bad(request.min_statistic) {
            return Err(FitError::Configuration(format!(
                "minimum statistic {} is not usable",
                request.min_statistic
            )));
        }
        if let (Some(limit), Some(dof)) = (
            self.config.max_reduced_statistic,
            refit.degrees_of_freedom(table),
        ) {
            if dof > 0 && request.min_statistic / dof as f64 > limit {
                return Err(FitError::Configuration(format!(
                    "reduced statistic {:.3} exceeds {} - cannot estimate confidence limits",
                    request.min_statistic / dof as f64,
                    limit
                )));
            }
        }

        let ctx = Context {
            index,
            best,
            min_statistic: request.min_statistic,
            delta: request.delta,
            threshold: request.min_statistic + request.delta,
            tolerance: self.config.tolerance * request.delta,
        };
        info!(
            "Searching {} limits of {} around {} for statistic {}",
            name, index, best, ctx.threshold
        );

        let initial = table.snapshot();
        let widened = (lo.min(bounds.0), hi.max(bounds.1));
        if widened != bounds {
            table.set_bounds(index, widened.0, widened.1)?;
        }

        let mut limits: Vec<LimitResult> = Vec::with_capacity(2);
        let mut improved = None;
        let mut interrupted = false;

        for (direction, end) in [(Direction::Lower, lo), (Direction::Upper, hi)] {
            if interrupted {
                limits.push(LimitResult::interrupted(best, 0));
                continue;
            }

            let outcome = table
                .set_freeze(index, true)
                .and_then(|_| self.search_direction(table, refit, &ctx, end, direction));
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Confidence search on {} failed: {}", name, e);
                    if let Err(restore) = self.restore(table, index, &initial, bounds) {
                        warn!("Could not restore parameters after failed search: {}", restore);
                    }
                    return Err(e);
                }
            };

            if let Some(sample) = outcome.improved {
                info!(
                    "New minimum {} found with {} = {}",
                    sample.statistic, name, sample.value
                );
                table.set_freeze(index, was_frozen)?;
                table.set_bounds(
                    index,
                    bounds.0.min(sample.value),
                    bounds.1.max(sample.value),
                )?;
                improved = Some(ImprovedFit {
                    statistic: sample.statistic,
                    parameter_value: sample.value,
                    snapshot: table.snapshot(),
                });
                limits = vec![outcome.limit.clone(), outcome.limit];
                break;
            }

            if outcome.limit.interrupted {
                interrupted = true;
            }
            match outcome.limit.state {
                SearchState::Converged => info!(
                    "{} {} limit {} after {} refits",
                    name, direction, outcome.limit.value, outcome.limit.iterations
                ),
                state => warn!(
                    "{} {} limit {:?} at {}: {}",
                    name, direction, state, outcome.limit.value, outcome.limit.message
                ),
            }
            table.restore(&initial)?;
            limits.push(outcome.limit);
        }

        if improved.is_none() {
            self.restore(table, index, &initial, bounds)?;
        }

        let mut limits = limits.into_iter();
        let (Some(lower), Some(upper)) = (limits.next(), limits.next()) else {
            return Err(FitError::Numerical("search produced no limits".to_string()));
        };
        Ok(ConfidenceResult {
            global_index: index,
            name,
            best,
            lower,
            upper,
            improved,
        })
    }

    /// Run several searches in turn, stopping after the first that finds an
    /// improved fit.
    pub fn search_many(
        &self,
        table: &mut ParameterTable,
        refit: &mut dyn Refit,
        requests: &[LimitRequest],
    ) -> Result<Vec<ConfidenceResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.run(table, refit, request)?;
            let stop = result.improved.is_some() || result.lower.interrupted || result.upper.interrupted;
            results.push(result);
            if stop {
                break;
            }
        }
        Ok(results)
    }

    fn restore(
        &self,
        table: &mut ParameterTable,
        index: usize,
        initial: &ParameterSnapshot,
        bounds: (f64, f64),
    ) -> Result<()> {
        table.restore(initial)?;
        table.set_bounds(index, bounds.0, bounds.1)
    }

    fn sample(
        &self,
        table: &mut ParameterTable,
        refit: &mut dyn Refit,
        index: usize,
        value: f64,
    ) -> Result<Sample> {
        table.set_value(index, value)?;
        let fit = refit.refit(table)?;
        let statistic = if fit.is_success() { fit.statistic } else { f64::MAX };
        Ok(Sample { value, statistic })
    }

    fn search_direction(
        &self,
        table: &mut ParameterTable,
        refit: &mut dyn Refit,
        ctx: &Context,
        end: f64,
        direction: Direction,
    ) -> Result<DirectionOutcome> {
        let improved = |sample: Sample, iterations: usize| DirectionOutcome {
            limit: LimitResult::new(
                sample.value,
                SearchState::ImprovedFit,
                iterations,
                "a better minimum was found",
            ),
            improved: Some(sample),
        };

        let mut b = Sample {
            value: ctx.best,
            statistic: ctx.min_statistic,
        };
        if end == ctx.best {
            return Ok(LimitResult::new(end, SearchState::Invalid, 0, "range ends at the best-fit value").into());
        }

        // Bracketing
        let span = end - ctx.best;
        let mut trial = ctx.best + 0.5 * span;
        let mut iterations = 0;
        let mut bracket = None;
        for _ in 0..self.config.max_tries {
            if self.break_check.should_break() {
                return Ok(LimitResult::interrupted(b.value, iterations).into());
            }
            iterations += 1;
            let sample = self.sample(table, refit, ctx.index, trial)?;
            debug!(
                "{} bracketing {}: p = {}, statistic = {}",
                direction, iterations, sample.value, sample.statistic
            );
            if ctx.improves(&sample) {
                return Ok(improved(sample, iterations));
            }
            if ctx.above(sample.statistic) {
                bracket = Some(sample);
                break;
            }
            b = sample;
            if trial == end {
                return Ok(LimitResult::new(
                    end,
                    SearchState::Invalid,
                    iterations,
                    "limit lies beyond the search range",
                )
                .into());
            }
            let remaining = end - trial;
            trial = if remaining.abs() < 0.01 * span.abs() {
                end
            } else {
                trial + 0.5 * remaining
            };
        }
        let Some(mut a) = bracket else {
            return Ok(LimitResult::new(
                b.value,
                SearchState::Invalid,
                iterations,
                "bracketing tries exhausted",
            )
            .into());
        };

        // Interpolating
        let mut mode = Mode::Quadratic;
        let mut last_side: Option<bool> = None;
        let mut streak = 0;
        let mut last_gap = f64::NAN;
        let mut last_value = a.value;
        for _ in 0..self.config.max_iterations {
            if self.break_check.should_break() {
                return Ok(LimitResult::interrupted(last_value, iterations).into());
            }

            let midpoint = 0.5 * (a.value + b.value);
            let proposal = match mode {
                Mode::Quadratic if !very_bad(a.statistic) => {
                    let k = (a.statistic - ctx.min_statistic) / (a.value - ctx.best).powi(2);
                    ctx.best + direction.sign() * (ctx.delta / k).sqrt()
                }
                Mode::Linear if !very_bad(a.statistic) => {
                    b.value
                        + (ctx.threshold - b.statistic) * (a.value - b.value)
                            / (a.statistic - b.statistic)
                }
                _ => midpoint,
            };
            let trial = if proposal.is_finite() && strictly_between(proposal, a.value, b.value) {
                proposal
            } else {
                midpoint
            };

            iterations += 1;
            let sample = self.sample(table, refit, ctx.index, trial)?;
            last_value = trial;
            debug!(
                "{} {:?} step {}: p = {}, statistic = {}",
                direction, mode, iterations, sample.value, sample.statistic
            );
            if ctx.improves(&sample) {
                return Ok(improved(sample, iterations));
            }
            if ctx.converged(&sample) {
                return Ok(LimitResult::new(trial, SearchState::Converged, iterations, "converged").into());
            }

            let above = ctx.above(sample.statistic);
            if last_side == Some(above) {
                streak += 1;
            } else {
                last_side = Some(above);
                streak = 1;
            }
            if above {
                a = sample;
            } else {
                b = sample;
            }

            let overshoot =
                above && (very_bad(sample.statistic) || sample.statistic - ctx.threshold > self.config.overshoot_limit);
            mode = if streak > 2 || overshoot || very_bad(a.statistic) {
                Mode::Bisect
            } else {
                Mode::Linear
            };

            if !very_bad(a.statistic) {
                let gap = a.statistic - b.statistic;
                if gap == last_gap {
                    return Ok(LimitResult::new(
                        trial,
                        SearchState::Invalid,
                        iterations,
                        "statistic isn't changing",
                    )
                    .into());
                }
                last_gap = gap;
            }
            if a.value == b.value || !strictly_between(0.5 * (a.value + b.value), a.value, b.value) {
                return Ok(LimitResult::new(trial, SearchState::Failed, iterations, "bracket collapsed").into());
            }
        }

        Ok(LimitResult::new(
            last_value,
            SearchState::Invalid,
            iterations,
            "maximum iterations reached",
        )
        .into())
    }
}
