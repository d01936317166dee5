//! The flow weight-completion graph.
//!
//! Flow relations are proportional edges: a share of the source's quantity
//! arrives at the destination. Each edge carries two optional weights:
//!
//! - the *direct* weight `w`, with `destination = w × source`
//! - the *reverse* weight `r`, with `source = r × destination`
//!
//! Both directions share one edge list. [`FlowGraph::complete`] infers the
//! missing weights of each direction from the topology and from the weights
//! already known, and marks "split" nodes whose outgoing weights sum to one.
//! The completed graph is then turned into a [`ComputationGraph`].

mod complete;

use std::collections::HashMap;

use flowquant_core::{
    Evaluation, Evaluator, Expression, FlowRelation, InterfaceId, Issues, ParameterValues,
};
use petgraph::{
    algo::toposort,
    graph::{DiGraph, EdgeIndex, NodeIndex},
};
use thiserror::Error;

use crate::{Config, ComputationGraph, Weight, cycles::find_cycles};

/// Errors that can occur when building or completing a [`FlowGraph`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    #[error("the flow graph contains a cycle: {}", cycle.iter().map(InterfaceId::as_str).collect::<Vec<_>>().join(" -> "))]
    CyclicFlowGraph { cycle: Vec<InterfaceId> },

    #[error("could not evaluate the weight from '{from}' to '{to}' (missing: [{}]; problems: [{}])", unresolved.join(", "), problems.join("; "))]
    UnevaluableWeight {
        from: InterfaceId,
        to: InterfaceId,
        unresolved: Vec<String>,
        problems: Vec<String>,
    },

    #[error("the weight from '{from}' to '{to}' still references parameters")]
    PendingWeight { from: InterfaceId, to: InterfaceId },
}

/// The weights of one flow edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowEdge {
    pub weight: Option<Weight>,
    pub reverse_weight: Option<Weight>,
}

/// Whether a node's weights are known to sum to one, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Split {
    /// The node's outgoing direct weights sum to one.
    pub direct: bool,
    /// The node's incoming edges' reverse weights sum to one.
    pub reverse: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FlowNode {
    pub(crate) id: InterfaceId,
    pub(crate) split: Split,
}

/// A directed graph of interfaces connected by flow relations.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    graph: DiGraph<FlowNode, FlowEdge>,
    index: HashMap<InterfaceId, NodeIndex>,
}

impl FlowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge, or updates the existing edge between the same nodes.
    ///
    /// When updating, only the weights given here replace the old ones.
    pub fn add_edge(
        &mut self,
        source: &InterfaceId,
        destination: &InterfaceId,
        weight: Option<Weight>,
        reverse_weight: Option<Weight>,
    ) {
        let a = self.node(source);
        let b = self.node(destination);

        match self.graph.find_edge(a, b) {
            Some(e) => {
                let edge = &mut self.graph[e];
                if weight.is_some() {
                    edge.weight = weight;
                }
                if reverse_weight.is_some() {
                    edge.reverse_weight = reverse_weight;
                }
            }
            None => {
                self.graph.add_edge(
                    a,
                    b,
                    FlowEdge {
                        weight,
                        reverse_weight,
                    },
                );
            }
        }
    }

    /// Adds a flow relation, evaluating constant weights right away.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnevaluableWeight`] if a weight references no
    /// parameter but still does not evaluate to a number.
    pub fn add_relation<E: Evaluator>(
        &mut self,
        relation: &FlowRelation,
        evaluator: &E,
    ) -> Result<(), FlowError> {
        let convert = |expression: &Option<Expression>| {
            expression
                .as_ref()
                .map(|expression| Weight::from_expression(expression, evaluator))
                .transpose()
                .map_err(|failed| {
                    unevaluable(&relation.source, &relation.destination, failed)
                })
        };

        let weight = convert(&relation.weight)?;
        let reverse_weight = convert(&relation.reverse_weight)?;
        self.add_edge(&relation.source, &relation.destination, weight, reverse_weight);
        Ok(())
    }

    /// Records that `interface` is `factor` times `reference`.
    ///
    /// This is the edge `reference → interface` with direct weight `factor`.
    pub fn add_relative_observation(
        &mut self,
        reference: &InterfaceId,
        interface: &InterfaceId,
        factor: f64,
    ) {
        self.add_edge(reference, interface, Some(Weight::Value(factor)), None);
    }

    fn node(&mut self, id: &InterfaceId) -> NodeIndex {
        *self.index.entry(id.clone()).or_insert_with(|| {
            self.graph.add_node(FlowNode {
                id: id.clone(),
                split: Split::default(),
            })
        })
    }

    /// Returns `true` if the interface takes part in a flow relation.
    #[must_use]
    pub fn contains(&self, id: &InterfaceId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &InterfaceId> {
        self.graph.node_weights().map(|node| &node.id)
    }

    /// Returns the edges as `(source, destination, weights)`.
    pub fn edges(&self) -> impl Iterator<Item = (&InterfaceId, &InterfaceId, &FlowEdge)> {
        self.graph.edge_indices().filter_map(|e| {
            let (a, b) = self.graph.edge_endpoints(e)?;
            Some((&self.graph[a].id, &self.graph[b].id, &self.graph[e]))
        })
    }

    /// Returns the weights of the edge from `source` to `destination`.
    #[must_use]
    pub fn edge(&self, source: &InterfaceId, destination: &InterfaceId) -> Option<&FlowEdge> {
        let e = self.find_edge(source, destination)?;
        Some(&self.graph[e])
    }

    /// Returns the split flags of a node.
    #[must_use]
    pub fn split(&self, id: &InterfaceId) -> Option<Split> {
        self.index.get(id).map(|&n| self.graph[n].split)
    }

    fn find_edge(&self, source: &InterfaceId, destination: &InterfaceId) -> Option<EdgeIndex> {
        let a = *self.index.get(source)?;
        let b = *self.index.get(destination)?;
        self.graph.find_edge(a, b)
    }

    /// Returns a copy with every pending weight evaluated against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnevaluableWeight`] for the first weight that
    /// does not evaluate to a number.
    pub fn resolve_weights<E: Evaluator>(
        &self,
        params: &ParameterValues,
        evaluator: &E,
    ) -> Result<Self, FlowError> {
        let mut resolved = self.clone();

        for e in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(e) else {
                continue;
            };
            let resolve = |weight: &Option<Weight>| {
                weight
                    .as_ref()
                    .map(|weight| weight.resolve(params, evaluator).map(Weight::Value))
                    .transpose()
                    .map_err(|failed| unevaluable(&self.graph[a].id, &self.graph[b].id, failed))
            };

            let edge = &self.graph[e];
            resolved.graph[e] = FlowEdge {
                weight: resolve(&edge.weight)?,
                reverse_weight: resolve(&edge.reverse_weight)?,
            };
        }

        Ok(resolved)
    }

    /// Infers missing weights in place and marks split nodes.
    ///
    /// The direct direction is completed first, then the reverse direction,
    /// each using the other's weights as its "opposite". Every inference is
    /// recorded as an `INFO` issue; edges that cannot be inferred are left
    /// without a weight and reported as `WARNING`s.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::CyclicFlowGraph`] if the graph has a cycle, in
    /// which case nothing is modified, and [`FlowError::PendingWeight`] if a
    /// weight has not been resolved.
    pub fn complete(&mut self, config: &Config) -> Result<Issues, FlowError> {
        let order = self.topological_order()?;

        let pending = self.graph.edge_indices().find_map(|e| {
            let edge = &self.graph[e];
            let pending = matches!(edge.weight, Some(Weight::Pending(_)))
                || matches!(edge.reverse_weight, Some(Weight::Pending(_)));
            let (a, b) = self.graph.edge_endpoints(e)?;
            pending.then(|| (self.graph[a].id.clone(), self.graph[b].id.clone()))
        });
        if let Some((from, to)) = pending {
            return Err(FlowError::PendingWeight { from, to });
        }

        Ok(complete::complete(&mut self.graph, &order, config))
    }

    /// Completes a copy of this graph and converts it into a
    /// [`ComputationGraph`].
    ///
    /// # Errors
    ///
    /// Fails like [`complete`](Self::complete).
    pub fn computation_graph(
        &self,
        config: &Config,
    ) -> Result<(ComputationGraph, Issues), FlowError> {
        let mut completed = self.clone();
        let issues = completed.complete(config)?;
        let order = completed.topological_order()?;
        Ok((
            ComputationGraph::from_flow(&completed.graph, &order, config),
            issues,
        ))
    }

    fn topological_order(&self) -> Result<Vec<NodeIndex>, FlowError> {
        toposort(&self.graph, None).map_err(|_| {
            let ids = self.graph.map(|_, node| node.id.clone(), |_, _| ());
            let cycle = find_cycles(&ids).into_iter().next().unwrap_or_default();
            FlowError::CyclicFlowGraph { cycle }
        })
    }
}

fn unevaluable(from: &InterfaceId, to: &InterfaceId, failed: Evaluation) -> FlowError {
    FlowError::UnevaluableWeight {
        from: from.clone(),
        to: to.clone(),
        unresolved: failed.unresolved.into_iter().collect(),
        problems: failed.problems,
    }
}
