//! Derived parameters
//!
//! A derived parameter has its value computed from other parameters at every
//! synchronization point instead of being varied by the engine. The
//! computation is either a parsed formula or a caller-supplied closure that
//! reads other parameters through [`ParameterLookup`].
//!
//! Evaluation is guarded by a [`SyncContext`]: while one derived value is being
//! computed, any nested attempt to evaluate a derived value (including the
//! same parameter reading itself) is a no-op and the stored value is used.
//! Mutually dependent expressions therefore terminate after one pass.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use crate::error::{FitError, Result};
use crate::parameters::expression::{EvaluationContext, Expression, ExpressionError};

/// How a synchronization pass treats a derived value it cannot assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// Log a warning and keep the previous value.
    #[default]
    Lenient,
    /// Return an error.
    Strict,
}

/// A reference to another parameter from inside a derived expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterRef {
    /// Global index, written `pN` in formulas
    Index(usize),
    /// Full name, written `{function(instance).param}` in formulas
    Name(String),
}

impl ParameterRef {
    /// Interpret a formula variable.
    pub fn from_variable(variable: &str) -> Self {
        match variable.strip_prefix('p').map(str::parse::<usize>) {
            Some(Ok(index)) => ParameterRef::Index(index),
            _ => ParameterRef::Name(variable.to_string()),
        }
    }
}

impl fmt::Display for ParameterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterRef::Index(index) => write!(f, "p{}", index),
            ParameterRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Read access to parameter values while a derived value is computed.
pub trait ParameterLookup {
    /// Current value of the referenced parameter.
    fn value(&self, reference: &ParameterRef) -> Result<f64>;

    fn value_by_index(&self, index: usize) -> Result<f64> {
        self.value(&ParameterRef::Index(index))
    }

    fn value_by_name(&self, name: &str) -> Result<f64> {
        self.value(&ParameterRef::Name(name.to_string()))
    }
}

/// Signature of closure-based derived expressions.
pub type DerivedFn = dyn Fn(&dyn ParameterLookup) -> Result<f64> + Send + Sync;

/// The computation behind a derived parameter.
#[derive(Clone)]
pub enum DerivedExpression {
    /// Parsed formula together with its source text
    Formula { source: String, expression: Expression },
    /// Caller-supplied closure
    Callable(Arc<DerivedFn>),
}

impl fmt::Debug for DerivedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedExpression::Formula { source, .. } => {
                f.debug_tuple("Formula").field(source).finish()
            }
            DerivedExpression::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl DerivedExpression {
    /// Parse a formula.
    ///
    /// ```
    /// use specfit_rs::parameters::derived::{DerivedExpression, ParameterRef};
    ///
    /// let expr = DerivedExpression::formula("0.5 * p2 + {bbody(1).kT}").unwrap();
    /// assert_eq!(
    ///     expr.references(),
    ///     vec![ParameterRef::Name("bbody(1).kT".to_string()), ParameterRef::Index(2)]
    /// );
    /// ```
    pub fn formula(source: &str) -> std::result::Result<Self, ExpressionError> {
        let expression = Expression::parse(source)?;
        Ok(DerivedExpression::Formula {
            source: source.trim().to_string(),
            expression,
        })
    }

    /// Wrap a closure.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&dyn ParameterLookup) -> Result<f64> + Send + Sync + 'static,
    {
        DerivedExpression::Callable(Arc::new(f))
    }

    /// Parameters a formula refers to. Closures are opaque and report none.
    pub fn references(&self) -> Vec<ParameterRef> {
        match self {
            DerivedExpression::Formula { expression, .. } => expression
                .variables()
                .iter()
                .map(|v| ParameterRef::from_variable(v))
                .collect(),
            DerivedExpression::Callable(_) => Vec::new(),
        }
    }

    /// Source text of a formula.
    pub fn source(&self) -> Option<&str> {
        match self {
            DerivedExpression::Formula { source, .. } => Some(source),
            DerivedExpression::Callable(_) => None,
        }
    }

    /// Compute the value.
    pub fn evaluate(&self, lookup: &dyn ParameterLookup) -> Result<f64> {
        match self {
            DerivedExpression::Formula { expression, .. } => {
                let context = LookupContext { lookup };
                Ok(expression.evaluate(&context)?)
            }
            DerivedExpression::Callable(f) => f(lookup),
        }
    }
}

struct LookupContext<'a> {
    lookup: &'a dyn ParameterLookup,
}

impl EvaluationContext for LookupContext<'_> {
    fn get_variable(&self, name: &str) -> std::result::Result<f64, ExpressionError> {
        self.lookup
            .value(&ParameterRef::from_variable(name))
            .map_err(|_| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

/// Re-entrancy state for one synchronization pass.
#[derive(Debug, Default)]
pub struct SyncContext {
    evaluating: Cell<bool>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a derived value is being computed.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.get()
    }

    /// Start an evaluation. `None` means one is already running and the
    /// caller must fall back to the stored value.
    pub fn enter(&self) -> Option<EvaluationGuard<'_>> {
        if self.evaluating.replace(true) {
            None
        } else {
            Some(EvaluationGuard {
                flag: &self.evaluating,
            })
        }
    }
}

/// Clears the evaluating flag when dropped, including on error paths.
#[derive(Debug)]
pub struct EvaluationGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Error for a derived value that evaluated but cannot be assigned.
pub(crate) fn unusable_value(name: String, value: f64, min: f64, max: f64) -> FitError {
    let message = if value.is_finite() {
        format!("value {} is outside [{}, {}]", value, min, max)
    } else {
        format!("value {} is not finite", value)
    };
    FitError::DerivedParameter { name, message }
}
