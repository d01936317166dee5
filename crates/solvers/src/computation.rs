//! The computation graph: conflict detection and value propagation.
//!
//! # Derivations
//!
//! A node `n` can be derived from its neighbours in three ways:
//!
//! - **forward**, along an incoming edge `u → n` with weight `w`: `x_n = w · x_u`
//! - **backward**, along an outgoing edge `n → v` with reverse weight `r`:
//!   `x_n = r · x_v`
//! - **additively**, when `n` is split: if its outgoing weights sum to one and
//!   every child is known, `x_n = Σ x_child`; if the reverse weights of its
//!   incoming edges sum to one and every parent is known, `x_n = Σ x_parent`.
//! - **by merging**, when several parents of `n` are siblings under a split
//!   node: `x_n = Σ w_i · x_i` over those parents, once all of them are known.
//!
//! A complete additive group replaces the individual channels from its
//! members, and a merge always replaces the single-edge channels of its
//! parents, so seeds that only meet through a split add up instead of
//! competing.
//!
//! # Conflicts and combinations
//!
//! Every known value ("seed") is tracked through the derivations above. A
//! node that can be derived from two different sets of seeds is a
//! [`Conflict`]: those seeds give independent, possibly disagreeing values
//! for it. Combinations are the maximal subsets of seeds in which no conflict
//! has two sides present; each combination is solved on its own.
//!
//! The number of combinations is exponential in the number of seeds involved
//! in conflicts, so enumeration stops at [`Config::max_combinations`].

mod combinations;
mod conflicts;
mod values;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};

use flowquant_core::InterfaceId;
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Config,
    flow::{FlowEdge, FlowNode, Split},
};

/// Errors that can occur when enumerating combinations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ComputationError {
    #[error("known values form more than {limit} consistent combinations")]
    CombinationLimit { limit: usize },
}

/// A node that two or more independent sets of seeds would each derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The distinct seed sets, in order.
    pub sides: Vec<BTreeSet<InterfaceId>>,
}

impl Conflict {
    /// Returns every seed involved in the conflict.
    #[must_use]
    pub fn implicated(&self) -> BTreeSet<InterfaceId> {
        self.sides.iter().flatten().cloned().collect()
    }
}

#[derive(Debug, Clone)]
struct Node {
    id: InterfaceId,
    split: Split,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    forward: Option<f64>,
    reverse: Option<f64>,
}

/// `x_n = Σ factor · x_source` over the terms.
#[derive(Debug)]
struct Derivation {
    terms: Vec<(NodeIndex, f64)>,
}

/// An immutable graph built from a completed flow graph.
///
/// Every query is a pure function of its arguments, so one graph can serve
/// any number of combinations, concurrently if needed.
#[derive(Debug, Clone)]
pub struct ComputationGraph {
    graph: DiGraph<Node, Edge>,
    index: HashMap<InterfaceId, NodeIndex>,
    order: Vec<NodeIndex>,
    consistency_tolerance: f64,
    max_combinations: usize,
}

impl ComputationGraph {
    /// Converts a completed flow graph; `order` must be topological.
    pub(crate) fn from_flow(
        flow: &DiGraph<FlowNode, FlowEdge>,
        order: &[NodeIndex],
        config: &Config,
    ) -> Self {
        let graph = flow.map(
            |_, node| Node {
                id: node.id.clone(),
                split: node.split,
            },
            |_, edge| Edge {
                forward: edge.weight.as_ref().and_then(|w| w.value()),
                reverse: edge.reverse_weight.as_ref().and_then(|w| w.value()),
            },
        );
        let index = graph
            .node_indices()
            .map(|n| (graph[n].id.clone(), n))
            .collect();

        Self {
            graph,
            index,
            order: order.to_vec(),
            consistency_tolerance: config.consistency_tolerance(),
            max_combinations: config.max_combinations(),
        }
    }

    /// Returns `true` if the interface is a node of this graph.
    #[must_use]
    pub fn contains(&self, id: &InterfaceId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &InterfaceId> {
        self.order.iter().map(|&n| &self.graph[n].id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn seeds<'a>(&self, known: impl IntoIterator<Item = &'a InterfaceId>) -> BTreeSet<NodeIndex> {
        known
            .into_iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect()
    }

    /// Forward sweep in topological order, then a backward sweep.
    fn sweep(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.order.iter().chain(self.order.iter().rev()).copied()
    }

    /// Returns every derivation of `n` whose inputs are all `known`.
    ///
    /// Complete additive groups and merges come first and replace the
    /// single-edge channels through their members.
    fn derivations(&self, n: NodeIndex, known: impl Fn(NodeIndex) -> bool) -> Vec<Derivation> {
        let split = self.graph[n].split;
        let children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(n, Direction::Outgoing)
            .collect();
        let parents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(n, Direction::Incoming)
            .collect();

        let additive = |flag: bool, members: &[NodeIndex]| {
            flag && !members.is_empty() && members.iter().all(|&m| known(m))
        };
        let children_group = additive(split.direct, &children);
        let parents_group = additive(split.reverse, &parents);

        let merges = if parents_group {
            Vec::new()
        } else {
            self.merge_groups(n)
        };
        let merged: Vec<NodeIndex> = merges.iter().flatten().map(|&(u, _)| u).collect();

        let mut derivations = Vec::new();
        if children_group {
            derivations.push(Derivation {
                terms: children.iter().map(|&c| (c, 1.0)).collect(),
            });
        }
        if parents_group {
            derivations.push(Derivation {
                terms: parents.iter().map(|&p| (p, 1.0)).collect(),
            });
        }

        for group in merges {
            if group.iter().all(|&(u, _)| known(u)) {
                derivations.push(Derivation { terms: group });
            }
        }

        if !parents_group {
            for edge in self.graph.edges_directed(n, Direction::Incoming) {
                if merged.contains(&edge.source()) {
                    continue;
                }
                match edge.weight().forward {
                    Some(w) if known(edge.source()) => derivations.push(Derivation {
                        terms: vec![(edge.source(), w)],
                    }),
                    _ => {}
                }
            }
        }
        if !children_group {
            for edge in self.graph.edges_directed(n, Direction::Outgoing) {
                match edge.weight().reverse {
                    Some(r) if known(edge.target()) => derivations.push(Derivation {
                        terms: vec![(edge.target(), r)],
                    }),
                    _ => {}
                }
            }
        }

        derivations
    }

    /// Groups the weighted parents of `n` by a split node they share.
    ///
    /// Siblings under a split node that flow into `n` again carry disjoint
    /// shares of the same quantity, so `n` is the sum of their contributions
    /// and never a single one of them. Only groups of two or more parents are
    /// returned; a parent with several split parents is grouped under the
    /// first one.
    fn merge_groups(&self, n: NodeIndex) -> Vec<Vec<(NodeIndex, f64)>> {
        let mut grouped: Vec<(NodeIndex, Vec<(NodeIndex, f64)>)> = Vec::new();

        for edge in self.graph.edges_directed(n, Direction::Incoming) {
            let Some(w) = edge.weight().forward else {
                continue;
            };
            let u = edge.source();
            let Some(g) = self
                .graph
                .neighbors_directed(u, Direction::Incoming)
                .filter(|&g| self.graph[g].split.direct)
                .min()
            else {
                continue;
            };

            match grouped.iter_mut().find(|(parent, _)| *parent == g) {
                Some((_, members)) => members.push((u, w)),
                None => grouped.push((g, vec![(u, w)])),
            }
        }

        grouped
            .into_iter()
            .map(|(_, members)| members)
            .filter(|members| members.len() > 1)
            .collect()
    }
}
