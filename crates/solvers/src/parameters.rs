//! Scenario parameter resolution.
//!
//! # Algorithm
//!
//! Defaults are merged with the scenario's overrides (overrides win). Every
//! expression is evaluated against an empty context: those with no free
//! references become constants immediately. The remaining ones record the
//! parameter names they reference, and a dependency graph
//! (`dependency → dependent`) is checked for cycles. Finally, pending
//! expressions are evaluated repeatedly against the growing set of
//! constants until a pass resolves nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowquant_core::{Evaluator, Expression, Parameter, ParameterValues, Scenario};
use petgraph::graph::DiGraph;
use thiserror::Error;

use crate::{Config, cycles::find_cycles};

/// Errors that can occur during parameter resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameters cannot have circular dependencies, {} cycle(s) detected: {}", cycles.len(), format_cycles(cycles))]
    CircularParameterDependency { cycles: Vec<Vec<String>> },

    #[error("could not evaluate parameter '{name}' (missing: [{}]; problems: [{}])", missing.join(", "), problems.join("; "))]
    UnresolvableParameter {
        name: String,
        missing: Vec<String>,
        problems: Vec<String>,
    },
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join(" :: ")
}

/// A parameter whose expression still has free references.
struct Pending<'a> {
    expression: &'a Expression,
    references: BTreeSet<String>,
}

/// Resolves the parameters of one scenario into constants.
///
/// Names are compared according to [`Config::case_sensitive`]; the returned
/// context stores names in that normalized form.
///
/// # Errors
///
/// Returns [`ParameterError::CircularParameterDependency`] if pending
/// parameters reference each other in a cycle, and
/// [`ParameterError::UnresolvableParameter`] for the first parameter (in name
/// order) that cannot be evaluated.
///
/// # Examples
///
/// ```
/// use flowquant_core::{Expression, FormulaEvaluator, Parameter, Scenario, Value};
/// use flowquant_solvers::{Config, parameters::resolve_parameters};
///
/// let parameters = [
///     Parameter::new("area", Some(Expression::number(10.0))),
///     Parameter::new("yield", Some("area * 3".parse().unwrap())),
/// ];
/// let scenario = Scenario::new("high").with("area", Expression::number(20.0));
///
/// let values =
///     resolve_parameters(&parameters, &scenario, &FormulaEvaluator, &Config::default()).unwrap();
/// assert_eq!(values.get("yield"), Some(&Value::Number(60.0)));
/// ```
pub fn resolve_parameters<E: Evaluator>(
    parameters: &[Parameter],
    scenario: &Scenario,
    evaluator: &E,
    config: &Config,
) -> Result<ParameterValues, ParameterError> {
    let mut resolved = ParameterValues::new(config.case_sensitive());

    let mut expressions: BTreeMap<String, &Expression> = BTreeMap::new();
    for parameter in parameters {
        if let Some(default) = &parameter.default {
            expressions.insert(resolved.normalize(&parameter.name), default);
        }
    }
    for (name, expression) in &scenario.overrides {
        expressions.insert(resolved.normalize(name), expression);
    }

    let empty = ParameterValues::new(config.case_sensitive());
    let mut pending: BTreeMap<String, Pending<'_>> = BTreeMap::new();

    for (name, expression) in &expressions {
        let evaluation = evaluator.evaluate(expression, &empty);
        match evaluation.value {
            Some(value) => resolved.insert(name, value),
            None if evaluation.unresolved.is_empty() => {
                return Err(ParameterError::UnresolvableParameter {
                    name: name.clone(),
                    missing: Vec::new(),
                    problems: evaluation.problems,
                });
            }
            None => {
                let references = evaluation
                    .unresolved
                    .iter()
                    .map(|reference| resolved.normalize(reference))
                    .collect();
                pending.insert(
                    name.clone(),
                    Pending {
                        expression,
                        references,
                    },
                );
            }
        }
    }

    check_cycles(&pending)?;

    let mut passes = 0;
    loop {
        passes += 1;
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, p)| p.references.iter().all(|r| resolved.contains(r)))
            .map(|(name, _)| name.clone())
            .collect();

        if ready.is_empty() {
            break;
        }

        for name in ready {
            let Some(p) = pending.remove(&name) else {
                continue;
            };
            let evaluation = evaluator.evaluate(p.expression, &resolved);
            match evaluation.value {
                Some(value) => resolved.insert(&name, value),
                None => {
                    return Err(ParameterError::UnresolvableParameter {
                        name,
                        missing: evaluation.unresolved.into_iter().collect(),
                        problems: evaluation.problems,
                    });
                }
            }
        }
    }
    tracing::trace!(passes, scenario = %scenario.name, "parameter fixpoint reached");

    if let Some((name, p)) = pending.into_iter().next() {
        let missing = p
            .references
            .into_iter()
            .filter(|r| !resolved.contains(r))
            .collect();
        return Err(ParameterError::UnresolvableParameter {
            name,
            missing,
            problems: Vec::new(),
        });
    }

    Ok(resolved)
}

fn check_cycles(pending: &BTreeMap<String, Pending<'_>>) -> Result<(), ParameterError> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut nodes = HashMap::new();
    let mut node = |graph: &mut DiGraph<String, ()>, name: &str| {
        *nodes
            .entry(name.to_string())
            .or_insert_with(|| graph.add_node(name.to_string()))
    };

    for (name, p) in pending {
        let dependent = node(&mut graph, name);
        for reference in p.references.iter().filter(|r| pending.contains_key(*r)) {
            let dependency = node(&mut graph, reference);
            graph.add_edge(dependency, dependent, ());
        }
    }

    let cycles = find_cycles(&graph);
    if cycles.is_empty() {
        Ok(())
    } else {
        Err(ParameterError::CircularParameterDependency { cycles })
    }
}

#[cfg(test)]
mod tests {
    use flowquant_core::{FormulaEvaluator, Value};
    use proptest::prelude::*;

    use super::*;

    fn param(name: &str, expression: &str) -> Parameter {
        Parameter::new(name, Some(expression.parse().unwrap()))
    }

    fn resolve(parameters: &[Parameter], scenario: &Scenario) -> Result<ParameterValues, ParameterError> {
        resolve_parameters(parameters, scenario, &FormulaEvaluator, &Config::default())
    }

    #[test]
    fn resolves_chained_parameters() {
        let parameters = [
            param("c", "b * 2"),
            param("b", "a + 1"),
            param("a", "4"),
            Parameter::new("unused", None),
        ];
        let values = resolve(&parameters, &Scenario::new("base")).unwrap();

        assert_eq!(values.get("a"), Some(&Value::Number(4.0)));
        assert_eq!(values.get("b"), Some(&Value::Number(5.0)));
        assert_eq!(values.get("c"), Some(&Value::Number(10.0)));
        assert!(!values.contains("unused"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let parameters = [param("a", "1"), param("b", "a * 10")];
        let scenario = Scenario::new("alt").with("A", "3".parse().unwrap());

        let values = resolve(&parameters, &scenario).unwrap();
        assert_eq!(values.get("b"), Some(&Value::Number(30.0)));
    }

    #[test]
    fn case_sensitive_names_stay_distinct() {
        let parameters = [param("a", "1"), param("b", "A * 10")];
        let config = Config::new(true, 1e-9, 1e-9, 8).unwrap();

        let error = resolve_parameters(&parameters, &Scenario::new("s"), &FormulaEvaluator, &config)
            .unwrap_err();
        assert_eq!(
            error,
            ParameterError::UnresolvableParameter {
                name: "b".to_string(),
                missing: vec!["A".to_string()],
                problems: Vec::new(),
            }
        );
    }

    #[test]
    fn categorical_values_resolve() {
        let parameters = [param("crop", "'wheat'"), param("double", "2 * 2")];
        let values = resolve(&parameters, &Scenario::new("s")).unwrap();
        assert_eq!(values.get("crop"), Some(&Value::Text("wheat".to_string())));
    }

    #[test]
    fn detects_cycles() {
        let parameters = [
            param("a", "c + 1"),
            param("b", "a * 2"),
            param("c", "b - 3"),
            param("d", "a"),
            param("e", "e + 1"),
        ];
        let error = resolve(&parameters, &Scenario::new("s")).unwrap_err();

        assert_eq!(
            error,
            ParameterError::CircularParameterDependency {
                cycles: vec![
                    vec!["a".to_string(), "b".to_string(), "c".to_string()],
                    vec!["e".to_string()],
                ],
            }
        );
    }

    #[test]
    fn undefined_reference_is_unresolvable() {
        let parameters = [param("a", "1"), param("b", "a + missing")];
        let error = resolve(&parameters, &Scenario::new("s")).unwrap_err();

        assert_eq!(
            error,
            ParameterError::UnresolvableParameter {
                name: "b".to_string(),
                missing: vec!["missing".to_string()],
                problems: Vec::new(),
            }
        );
    }

    #[test]
    fn failing_constant_is_unresolvable() {
        let parameters = [param("a", "1 / 0")];
        let error = resolve(&parameters, &Scenario::new("s")).unwrap_err();
        assert!(matches!(
            error,
            ParameterError::UnresolvableParameter { ref name, ref problems, .. }
                if name == "a" && problems.len() == 1
        ));
    }

    proptest! {
        /// Parameter `p{i}` is `p{j} + c` for some earlier `j`, or a constant.
        #[test]
        fn acyclic_sets_resolve_to_substituted_values(
            specs in prop::collection::vec((any::<prop::sample::Index>(), -100i32..100, any::<bool>()), 1..24)
        ) {
            let mut parameters = Vec::new();
            let mut expected = Vec::new();
            for (i, (index, constant, is_constant)) in specs.iter().enumerate() {
                let constant = f64::from(*constant);
                if i == 0 || *is_constant {
                    parameters.push(param(&format!("p{i}"), &constant.to_string()));
                    expected.push(constant);
                } else {
                    let j = index.index(i);
                    parameters.push(param(&format!("p{i}"), &format!("p{j} + {constant}")));
                    expected.push(expected[j] + constant);
                }
            }
            // Declaration order must not matter.
            parameters.reverse();

            let values = resolve(&parameters, &Scenario::new("s")).unwrap();
            prop_assert_eq!(values.len(), expected.len());
            for (i, value) in expected.iter().enumerate() {
                prop_assert_eq!(values.get(&format!("p{i}")), Some(&Value::Number(*value)));
            }
        }

        /// A ring `p0 <- p1 <- ... <- p{n-1} <- p0` is reported exactly.
        #[test]
        fn injected_cycle_is_reported(n in 1usize..8, extra in 0usize..4) {
            let mut parameters: Vec<Parameter> = (0..n)
                .map(|i| param(&format!("p{i}"), &format!("p{} + 1", (i + n - 1) % n)))
                .collect();
            for k in 0..extra {
                parameters.push(param(&format!("q{k}"), "p0 * 2"));
            }

            let error = resolve(&parameters, &Scenario::new("s")).unwrap_err();
            let expected: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
            prop_assert_eq!(
                error,
                ParameterError::CircularParameterDependency { cycles: vec![expected] }
            );
        }
    }
}
