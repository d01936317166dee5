use std::collections::BTreeSet;

use crate::{ParameterValues, Value};

use super::{BinaryOp, Evaluation, Formula, Function};

/// Evaluates a formula, collecting every unresolved reference and problem.
pub(super) fn evaluate(formula: &Formula, context: &ParameterValues) -> Evaluation {
    let mut walk = Walk {
        context,
        unresolved: BTreeSet::new(),
        problems: Vec::new(),
    };
    let value = walk.eval(formula);

    let value = if walk.unresolved.is_empty() && walk.problems.is_empty() {
        value
    } else {
        None
    };

    Evaluation {
        value,
        unresolved: walk.unresolved,
        problems: walk.problems,
    }
}

struct Walk<'a> {
    context: &'a ParameterValues,
    unresolved: BTreeSet<String>,
    problems: Vec<String>,
}

impl Walk<'_> {
    fn eval(&mut self, formula: &Formula) -> Option<Value> {
        match formula {
            Formula::Constant(value) => Some(value.clone()),
            Formula::Parameter(name) => {
                let value = self.context.get(name).cloned();
                if value.is_none() {
                    self.unresolved.insert(name.clone());
                }
                value
            }
            Formula::Negate(inner) => {
                let value = self.eval(inner)?;
                self.number(&value, "-").map(|n| Value::Number(-n))
            }
            Formula::Binary { op, lhs, rhs } => {
                // Both sides are walked so every unresolved name gets reported.
                let lhs = self.eval(lhs);
                let rhs = self.eval(rhs);
                let (lhs, rhs) = (lhs?, rhs?);
                self.binary(*op, &lhs, &rhs)
            }
            Formula::Call { function, args } => {
                let values: Vec<Option<Value>> = args.iter().map(|arg| self.eval(arg)).collect();
                let values: Vec<Value> = values.into_iter().collect::<Option<_>>()?;
                self.call(*function, &values)
            }
        }
    }

    fn number(&mut self, value: &Value, operation: &str) -> Option<f64> {
        let number = value.as_number();
        if number.is_none() {
            self.problems.push(format!(
                "cannot apply '{operation}' to {} value {value}",
                value.type_name()
            ));
        }
        number
    }

    fn finite(&mut self, result: f64, operation: &str) -> Option<Value> {
        if result.is_finite() {
            Some(Value::Number(result))
        } else {
            self.problems
                .push(format!("'{operation}' produced a non-finite result"));
            None
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
        let symbol = op.symbol();
        let a = self.number(lhs, symbol);
        let b = self.number(rhs, symbol);
        let (a, b) = (a?, b?);

        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    self.problems.push("division by zero".to_string());
                    return None;
                }
                a / b
            }
            BinaryOp::Pow => a.powf(b),
        };
        self.finite(result, symbol)
    }

    fn call(&mut self, function: Function, args: &[Value]) -> Option<Value> {
        let name = function.name();
        let numbers: Vec<Option<f64>> = args.iter().map(|arg| self.number(arg, name)).collect();
        let numbers: Vec<f64> = numbers.into_iter().collect::<Option<_>>()?;

        let result = match (function, numbers.as_slice()) {
            (Function::Min, [first, rest @ ..]) => rest.iter().copied().fold(*first, f64::min),
            (Function::Max, [first, rest @ ..]) => rest.iter().copied().fold(*first, f64::max),
            (Function::Abs, [x]) => x.abs(),
            (Function::Sqrt, [x]) if *x >= 0.0 => x.sqrt(),
            (Function::Exp, [x]) => x.exp(),
            (Function::Ln, [x]) if *x > 0.0 => x.ln(),
            (Function::Sqrt | Function::Ln, [x]) => {
                self.problems
                    .push(format!("'{name}' is undefined for {x}"));
                return None;
            }
            (_, numbers) => {
                self.problems.push(format!(
                    "'{name}' does not accept {} argument(s)",
                    numbers.len()
                ));
                return None;
            }
        };
        self.finite(result, name)
    }
}
