//! Expressions and the contract for evaluating them.
//!
//! The engine never evaluates raw text. Callers hand it [`Expression`]s that
//! are either literal constants or pre-parsed [`Formula`]s, and an
//! [`Evaluator`] that turns them into constants given a [`ParameterValues`]
//! context.
//!
//! # Formula grammar
//!
//! [`Expression::parse`] accepts a small arithmetic grammar:
//!
//! - numbers (`2`, `0.5`, `1e-3`), booleans (`true`, `false`) and quoted text
//!   (`'wheat'`, `"wheat"`)
//! - parameter references: identifiers made of letters, digits, `_` and `.`
//! - `+`, `-`, `*`, `/`, `^` (right associative) and unary `-`
//! - calls to `min`, `max`, `abs`, `sqrt`, `exp` and `ln`
//! - parentheses
//!
//! Text that parses as a number becomes a literal rather than a formula.

mod eval;
mod lexer;
mod parse;

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ParameterValues, Value};

pub use parse::ParseError;

/// An expression to be evaluated against resolved parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression", into = "RawExpression")]
pub enum Expression {
    Literal(Value),
    Formula(Formula),
}

/// Pre-parsed structured form of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Constant(Value),
    Parameter(String),
    Negate(Box<Formula>),
    Binary {
        op: BinaryOp,
        lhs: Box<Formula>,
        rhs: Box<Formula>,
    },
    Call {
        function: Function,
        args: Vec<Formula>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Functions callable from a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Abs,
    Sqrt,
    Exp,
    Ln,
}

/// The result of evaluating an [`Expression`].
///
/// `value` is only present when every referenced parameter was resolved and
/// no problem occurred during evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub value: Option<Value>,
    /// Referenced parameter names that the context could not resolve.
    pub unresolved: BTreeSet<String>,
    /// Problems that prevented evaluation (e.g. division by zero).
    pub problems: Vec<String>,
}

/// Evaluates expressions against a resolved parameter context.
///
/// Implementations must be pure: the same expression and context always
/// produce the same [`Evaluation`].
pub trait Evaluator {
    fn evaluate(&self, expression: &Expression, context: &ParameterValues) -> Evaluation;
}

/// The default [`Evaluator`] for [`Formula`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaEvaluator;

impl Evaluator for FormulaEvaluator {
    fn evaluate(&self, expression: &Expression, context: &ParameterValues) -> Evaluation {
        match expression {
            Expression::Literal(value) => Evaluation::constant(value.clone()),
            Expression::Formula(formula) => eval::evaluate(formula, context),
        }
    }
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn evaluate(&self, expression: &Expression, context: &ParameterValues) -> Evaluation {
        (**self).evaluate(expression, context)
    }
}

impl Evaluation {
    /// An evaluation that produced `value` with nothing unresolved.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Returns the numeric value, if evaluation produced a number.
    #[must_use]
    pub fn number(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::as_number)
    }

    /// Returns `true` if evaluation produced a value.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

impl Expression {
    /// Creates a numeric literal.
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Literal(Value::Number(value))
    }

    /// Parses text into a literal or a formula.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the text is neither a number nor a valid
    /// formula.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowquant_core::{Expression, Value};
    ///
    /// assert_eq!(Expression::parse("0.25").unwrap(), Expression::number(0.25));
    ///
    /// let formula = Expression::parse("yield * (1 - loss)").unwrap();
    /// let names: Vec<_> = formula.references().into_iter().collect();
    /// assert_eq!(names, vec!["loss", "yield"]);
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        // `inf` and `nan` are valid parameter names, not numbers.
        if let Some(number) = text.trim().parse::<f64>().ok().filter(|n| n.is_finite()) {
            return Ok(Self::number(number));
        }
        match parse::parse(text)? {
            Formula::Constant(value) => Ok(Self::Literal(value)),
            formula => Ok(Self::Formula(formula)),
        }
    }

    /// Returns the constant, if this expression is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Formula(_) => None,
        }
    }

    /// Returns the names of all parameters referenced by this expression.
    #[must_use]
    pub fn references(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Self::Formula(formula) = self {
            formula.collect_references(&mut names);
        }
        names
    }
}

impl Formula {
    fn collect_references(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Constant(_) => {}
            Self::Parameter(name) => {
                names.insert(name.clone());
            }
            Self::Negate(inner) => inner.collect_references(names),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_references(names);
                rhs.collect_references(names);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(names);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Negate(_) => 55,
            Self::Constant(_) | Self::Parameter(_) | Self::Call { .. } => u8::MAX,
        }
    }
}

impl BinaryOp {
    pub(crate) fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 40,
            Self::Mul | Self::Div => 50,
            Self::Pow => 60,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }
}

impl Function {
    /// Looks up a function by its (case-insensitive) name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "abs" => Some(Self::Abs),
            "sqrt" => Some(Self::Sqrt),
            "exp" => Some(Self::Exp),
            "ln" => Some(Self::Ln),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
        }
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Formula(formula) => write!(f, "{formula}"),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Parameter(name) => f.write_str(name),
            Self::Negate(inner) => {
                if inner.precedence() < self.precedence() {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                // `^` groups to the right, everything else to the left.
                let (lhs_parens, rhs_parens) = if *op == BinaryOp::Pow {
                    (lhs.precedence() <= prec, rhs.precedence() < prec)
                } else {
                    (lhs.precedence() < prec, rhs.precedence() <= prec)
                };
                write_operand(f, lhs, lhs_parens)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, rhs_parens)
            }
            Self::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Formula, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

/// Serialized form of an [`Expression`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawExpression {
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl TryFrom<RawExpression> for Expression {
    type Error = ParseError;

    fn try_from(raw: RawExpression) -> Result<Self, Self::Error> {
        match raw {
            RawExpression::Number(n) => Ok(Self::number(n)),
            RawExpression::Boolean(b) => Ok(Self::Literal(Value::Boolean(b))),
            RawExpression::Text(text) => Self::parse(&text),
        }
    }
}

impl From<Expression> for RawExpression {
    fn from(expression: Expression) -> Self {
        match expression {
            Expression::Literal(Value::Number(n)) => Self::Number(n),
            Expression::Literal(Value::Boolean(b)) => Self::Boolean(b),
            other => Self::Text(other.to_string()),
        }
    }
}
