//! Scale-chain propagation.
//!
//! A scale relation states that a destination's quantity is its origin's
//! quantity times a scale. Each destination has at most one origin, so the
//! relations form chains (or trees) hanging off "beginning" nodes: origins
//! that are never a destination.
//!
//! The topology is built once per solve. Values depend on the scenario and
//! period, so [`ScaleGraph::propagate`] never mutates the graph and returns
//! the propagated values in a [`ScaleOutcome`] instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowquant_core::{
    Evaluation, Evaluator, Expression, InterfaceId, IssueKind, Issues, ParameterValues, Quantity,
    ScaleRelation, Unit,
};
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use thiserror::Error;

use crate::weight::{Weight, evaluate_number};

/// Errors that can occur when building or updating a [`ScaleGraph`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScaleError {
    #[error("interface '{destination}' is the destination of more than one scale relation")]
    AmbiguousScaleDestination { destination: InterfaceId },

    #[error("interfaces inside a scale chain cannot be observed directly: {}", join(interfaces))]
    NonBeginningNodeObserved { interfaces: Vec<InterfaceId> },

    #[error("could not evaluate {context} (missing: [{}]; problems: [{}])", unresolved.join(", "), problems.join("; "))]
    UnevaluableExpression {
        context: String,
        unresolved: Vec<String>,
        problems: Vec<String>,
    },
}

impl ScaleError {
    fn unevaluable(context: String, evaluation: Evaluation) -> Self {
        Self::UnevaluableExpression {
            context,
            unresolved: evaluation.unresolved.into_iter().collect(),
            problems: evaluation.problems,
        }
    }
}

fn join(ids: &[InterfaceId]) -> String {
    ids.iter()
        .map(InterfaceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The values produced by one [`ScaleGraph::propagate`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleOutcome {
    /// Every node reached from a defined beginning, beginnings included.
    pub values: BTreeMap<InterfaceId, Quantity>,
    /// Nodes with no defined beginning upstream.
    pub unset: BTreeSet<InterfaceId>,
    pub issues: Issues,
}

/// The scale relations of a case study.
#[derive(Debug, Clone, Default)]
pub struct ScaleGraph {
    graph: DiGraph<InterfaceId, Weight>,
    index: HashMap<InterfaceId, NodeIndex>,
}

impl ScaleGraph {
    /// Builds the graph from scale relations.
    ///
    /// Scales without parameter references are evaluated here; the others
    /// are evaluated on every [`propagate`](Self::propagate).
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::AmbiguousScaleDestination`] if an interface is
    /// the destination of two relations, and
    /// [`ScaleError::UnevaluableExpression`] if a constant scale is invalid.
    pub fn new<'a, E: Evaluator>(
        relations: impl IntoIterator<Item = &'a ScaleRelation>,
        evaluator: &E,
    ) -> Result<Self, ScaleError> {
        let mut scales = Self::default();

        for relation in relations {
            let origin = scales.node(&relation.origin);
            let destination = scales.node(&relation.destination);

            if scales
                .graph
                .neighbors_directed(destination, Direction::Incoming)
                .next()
                .is_some()
            {
                return Err(ScaleError::AmbiguousScaleDestination {
                    destination: relation.destination.clone(),
                });
            }

            let scale = Weight::from_expression(&relation.scale, evaluator).map_err(|failed| {
                ScaleError::unevaluable(
                    format!("scale from '{}' to '{}'", relation.origin, relation.destination),
                    failed,
                )
            })?;
            scales.graph.add_edge(origin, destination, scale);
        }

        Ok(scales)
    }

    fn node(&mut self, id: &InterfaceId) -> NodeIndex {
        *self
            .index
            .entry(id.clone())
            .or_insert_with(|| self.graph.add_node(id.clone()))
    }

    /// Returns `true` if the interface takes part in a scale relation.
    #[must_use]
    pub fn contains(&self, id: &InterfaceId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns `true` if the graph has no relations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    /// Returns the nodes with no incoming scale relation, in order.
    #[must_use]
    pub fn beginnings(&self) -> BTreeSet<InterfaceId> {
        self.graph
            .node_indices()
            .filter(|&n| self.is_beginning(n))
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Returns the scale relations as `(origin, destination, scale)`.
    pub fn relations(&self) -> impl Iterator<Item = (&InterfaceId, &InterfaceId, &Weight)> {
        self.graph.edge_indices().filter_map(|e| {
            let (origin, destination) = self.graph.edge_endpoints(e)?;
            Some((&self.graph[origin], &self.graph[destination], &self.graph[e]))
        })
    }

    fn is_beginning(&self, n: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(n, Direction::Incoming)
            .next()
            .is_none()
    }

    /// Propagates beginning values down every scale chain.
    ///
    /// Each child receives its parent's value times the scale, keeping the
    /// parent's unit. Values for interfaces outside the graph are ignored.
    /// Nodes that no defined beginning reaches are left unset and reported
    /// with an [`IssueKind::UnsetScaleNode`] issue.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::NonBeginningNodeObserved`] if a value is given
    /// for a node inside a chain, and [`ScaleError::UnevaluableExpression`] if
    /// a value or scale does not evaluate to a number.
    pub fn propagate<E: Evaluator>(
        &self,
        params: &ParameterValues,
        beginning_values: &BTreeMap<InterfaceId, (Expression, Option<Unit>)>,
        evaluator: &E,
    ) -> Result<ScaleOutcome, ScaleError> {
        let given: Vec<(NodeIndex, &Expression, &Option<Unit>)> = beginning_values
            .iter()
            .filter_map(|(id, (value, unit))| Some((*self.index.get(id)?, value, unit)))
            .collect();

        let interior: Vec<InterfaceId> = given
            .iter()
            .filter(|(n, _, _)| !self.is_beginning(*n))
            .map(|(n, _, _)| self.graph[*n].clone())
            .collect();
        if !interior.is_empty() {
            return Err(ScaleError::NonBeginningNodeObserved {
                interfaces: interior,
            });
        }

        let mut values: HashMap<NodeIndex, Quantity> = HashMap::new();
        for (n, expression, unit) in given {
            let value = evaluate_number(expression, params, evaluator).map_err(|failed| {
                ScaleError::unevaluable(format!("value of '{}'", self.graph[n]), failed)
            })?;
            values.insert(n, Quantity::new(value, unit.clone()));
        }

        let scales = self
            .graph
            .edge_indices()
            .map(|e| {
                self.graph[e].resolve(params, evaluator).map_err(|failed| {
                    let context = match self.graph.edge_endpoints(e) {
                        Some((a, b)) => {
                            format!("scale from '{}' to '{}'", self.graph[a], self.graph[b])
                        }
                        None => "scale".to_string(),
                    };
                    ScaleError::unevaluable(context, failed)
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let mut stack: Vec<NodeIndex> = values.keys().copied().collect();
        while let Some(parent) = stack.pop() {
            let Some(quantity) = values.get(&parent).cloned() else {
                continue;
            };
            for edge in self.graph.edges_directed(parent, Direction::Outgoing) {
                let child = edge.target();
                if values.contains_key(&child) {
                    continue;
                }
                values.insert(child, quantity.scaled(scales[edge.id().index()]));
                stack.push(child);
            }
        }

        let mut outcome = ScaleOutcome::default();
        for n in self.graph.node_indices() {
            let id = self.graph[n].clone();
            match values.remove(&n) {
                Some(quantity) => {
                    outcome.values.insert(id, quantity);
                }
                None => {
                    outcome.issues.info(
                        IssueKind::UnsetScaleNode,
                        format!("scale node '{id}' has no defined beginning upstream"),
                    );
                    outcome.unset.insert(id);
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use flowquant_core::{FormulaEvaluator, Value};

    use super::*;

    fn relation(origin: &str, destination: &str, scale: &str) -> ScaleRelation {
        ScaleRelation::new(origin, destination, scale.parse().unwrap())
    }

    fn id(name: &str) -> InterfaceId {
        InterfaceId::from(name)
    }

    fn seeds(entries: &[(&str, f64, Option<&str>)]) -> BTreeMap<InterfaceId, (Expression, Option<Unit>)> {
        entries
            .iter()
            .map(|(name, value, unit)| (id(name), (Expression::number(*value), unit.map(Unit::new))))
            .collect()
    }

    fn chain() -> ScaleGraph {
        let relations = [
            relation("farm:area", "farm:water", "3"),
            relation("farm:water", "farm:energy", "rate"),
            relation("farm:area", "farm:labour", "0.5"),
            relation("plant:output", "plant:waste", "0.1"),
        ];
        ScaleGraph::new(&relations, &FormulaEvaluator).unwrap()
    }

    #[test]
    fn finds_beginnings() {
        let scales = chain();
        assert_eq!(
            scales.beginnings(),
            BTreeSet::from([id("farm:area"), id("plant:output")])
        );
        assert!(scales.contains(&id("farm:energy")));
        assert!(!scales.contains(&id("farm:other")));
    }

    #[test]
    fn rejects_ambiguous_destination() {
        let relations = [relation("a:x", "a:z", "1"), relation("a:y", "a:z", "2")];
        let error = ScaleGraph::new(&relations, &FormulaEvaluator).unwrap_err();
        assert_eq!(
            error,
            ScaleError::AmbiguousScaleDestination {
                destination: id("a:z")
            }
        );
    }

    #[test]
    fn propagates_down_chains_with_units() {
        let scales = chain();
        let mut params = ParameterValues::new(false);
        params.insert("rate", Value::Number(2.0));

        let outcome = scales
            .propagate(
                &params,
                &seeds(&[("farm:area", 10.0, Some("ha")), ("elsewhere:x", 1.0, None)]),
                &FormulaEvaluator,
            )
            .unwrap();

        assert_relative_eq!(outcome.values[&id("farm:water")].value, 30.0);
        assert_relative_eq!(outcome.values[&id("farm:energy")].value, 60.0);
        assert_relative_eq!(outcome.values[&id("farm:labour")].value, 5.0);
        assert_eq!(outcome.values[&id("farm:energy")].unit, Some(Unit::new("ha")));
        assert!(!outcome.values.contains_key(&id("elsewhere:x")));

        assert_eq!(
            outcome.unset,
            BTreeSet::from([id("plant:output"), id("plant:waste")])
        );
        assert_eq!(outcome.issues.of_kind(IssueKind::UnsetScaleNode).count(), 2);
    }

    #[test]
    fn rejects_observed_interior_nodes() {
        let error = chain()
            .propagate(
                &ParameterValues::new(false),
                &seeds(&[("farm:area", 1.0, None), ("farm:water", 3.0, None)]),
                &FormulaEvaluator,
            )
            .unwrap_err();
        assert_eq!(
            error,
            ScaleError::NonBeginningNodeObserved {
                interfaces: vec![id("farm:water")]
            }
        );
    }

    #[test]
    fn missing_scale_parameter_fails() {
        let error = chain()
            .propagate(
                &ParameterValues::new(false),
                &seeds(&[("farm:area", 1.0, None)]),
                &FormulaEvaluator,
            )
            .unwrap_err();
        assert!(matches!(
            error,
            ScaleError::UnevaluableExpression { ref unresolved, .. } if unresolved == &["rate"]
        ));
    }
}
