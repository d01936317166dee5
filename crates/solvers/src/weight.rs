use std::fmt;

use flowquant_core::{Evaluation, Evaluator, Expression, ParameterValues};

/// A proportional edge weight.
///
/// Weights whose expression has no free references are evaluated when the
/// edge is added; the others stay pending until scenario parameters are
/// known.
#[derive(Debug, Clone, PartialEq)]
pub enum Weight {
    Value(f64),
    Pending(Expression),
}

impl Weight {
    /// Evaluates `expression` without parameters.
    ///
    /// Returns [`Weight::Pending`] if the expression references parameters.
    ///
    /// # Errors
    ///
    /// Returns the failed [`Evaluation`] if the expression references nothing
    /// but still does not produce a number.
    pub fn from_expression<E: Evaluator>(
        expression: &Expression,
        evaluator: &E,
    ) -> Result<Self, Evaluation> {
        let evaluation = evaluator.evaluate(expression, &ParameterValues::default());
        if !evaluation.unresolved.is_empty() {
            return Ok(Self::Pending(expression.clone()));
        }
        into_number(evaluation).map(Self::Value)
    }

    /// Returns the numeric value, if resolved.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Pending(_) => None,
        }
    }

    /// Returns the numeric value, evaluating a pending expression against
    /// `params`.
    ///
    /// # Errors
    ///
    /// Returns the failed [`Evaluation`] if a pending expression cannot be
    /// evaluated to a number.
    pub fn resolve<E: Evaluator>(
        &self,
        params: &ParameterValues,
        evaluator: &E,
    ) -> Result<f64, Evaluation> {
        match self {
            Self::Value(value) => Ok(*value),
            Self::Pending(expression) => evaluate_number(expression, params, evaluator),
        }
    }
}

impl From<f64> for Weight {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Pending(expression) => write!(f, "{expression}"),
        }
    }
}

/// Evaluates an expression that must produce a number.
pub(crate) fn evaluate_number<E: Evaluator>(
    expression: &Expression,
    params: &ParameterValues,
    evaluator: &E,
) -> Result<f64, Evaluation> {
    into_number(evaluator.evaluate(expression, params))
}

fn into_number(mut evaluation: Evaluation) -> Result<f64, Evaluation> {
    match evaluation.value.take() {
        Some(value) => match value.as_number() {
            Some(number) => Ok(number),
            None => {
                evaluation.problems.push(format!(
                    "expected a number, got {} value {value}",
                    value.type_name()
                ));
                Err(evaluation)
            }
        },
        None => Err(evaluation),
    }
}
