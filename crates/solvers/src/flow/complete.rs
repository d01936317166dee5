use approx::relative_eq;
use flowquant_core::{IssueKind, Issues};
use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use crate::{Config, Weight};

use super::{FlowEdge, FlowNode};

/// One direction of the flow graph.
///
/// The reverse graph has the same edges, inverted, so a node's outgoing
/// edges in it are its incoming edges in the direct graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Direct,
    Reverse,
}

impl Pass {
    fn outgoing(self) -> Direction {
        match self {
            Self::Direct => Direction::Outgoing,
            Self::Reverse => Direction::Incoming,
        }
    }

    fn weight(self, edge: &FlowEdge) -> Option<f64> {
        match self {
            Self::Direct => edge.weight.as_ref().and_then(Weight::value),
            Self::Reverse => edge.reverse_weight.as_ref().and_then(Weight::value),
        }
    }

    fn opposite(self, edge: &FlowEdge) -> Option<f64> {
        match self {
            Self::Direct => Self::Reverse.weight(edge),
            Self::Reverse => Self::Direct.weight(edge),
        }
    }

    fn set_weight(self, edge: &mut FlowEdge, value: f64) {
        let slot = match self {
            Self::Direct => &mut edge.weight,
            Self::Reverse => &mut edge.reverse_weight,
        };
        *slot = Some(Weight::Value(value));
    }

    fn set_split(self, node: &mut FlowNode) {
        match self {
            Self::Direct => node.split.direct = true,
            Self::Reverse => node.split.reverse = true,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Direct => "weight",
            Self::Reverse => "reverse weight",
        }
    }
}

/// Completes both directions of an acyclic graph with resolved weights.
///
/// `order` is a topological order of the direct graph.
pub(super) fn complete(
    graph: &mut DiGraph<FlowNode, FlowEdge>,
    order: &[NodeIndex],
    config: &Config,
) -> Issues {
    let mut issues = Issues::new();

    for node in graph.node_weights_mut() {
        node.split = super::Split::default();
    }

    for &n in order {
        complete_node(graph, n, Pass::Direct, config, &mut issues);
    }
    for &n in order.iter().rev() {
        complete_node(graph, n, Pass::Reverse, config, &mut issues);
    }

    issues
}

fn complete_node(
    graph: &mut DiGraph<FlowNode, FlowEdge>,
    n: NodeIndex,
    pass: Pass,
    config: &Config,
    issues: &mut Issues,
) {
    let edges: Vec<EdgeIndex> = graph
        .edges_directed(n, pass.outgoing())
        .map(|edge| edge.id())
        .collect();
    if edges.is_empty() {
        return;
    }

    let (missing, weighted): (Vec<EdgeIndex>, Vec<EdgeIndex>) = edges
        .iter()
        .copied()
        .partition(|&e| pass.weight(&graph[e]).is_none());
    let known_sum: f64 = weighted
        .iter()
        .filter_map(|&e| pass.weight(&graph[e]))
        .sum();
    let sums_to_one = relative_eq!(
        known_sum,
        1.0,
        epsilon = f64::EPSILON,
        max_relative = config.split_tolerance()
    );

    match missing.as_slice() {
        [] => {
            if edges.len() > 1 && sums_to_one {
                pass.set_split(&mut graph[n]);
            }
        }
        [e] if edges.len() == 1 => {
            let inferred = match pass.opposite(&graph[*e]) {
                Some(opposite) if opposite != 0.0 => 1.0 / opposite,
                Some(_) => {
                    issues.warning(
                        IssueKind::WeightInferenceWarning,
                        format!(
                            "cannot infer the {} of {}: the opposite weight is zero",
                            pass.label(),
                            describe(graph, *e),
                        ),
                    );
                    return;
                }
                None => 1.0,
            };
            pass.set_weight(&mut graph[*e], inferred);
            issues.info(
                IssueKind::WeightInferred,
                format!("{} of {} inferred as {inferred}", pass.label(), describe(graph, *e)),
            );
        }
        [e] => {
            if known_sum > 1.0 && !sums_to_one {
                issues.warning(
                    IssueKind::WeightInferenceWarning,
                    format!(
                        "cannot infer the {} of {}: the other weights of '{}' already sum to {known_sum}",
                        pass.label(),
                        describe(graph, *e),
                        graph[n].id,
                    ),
                );
                return;
            }
            let inferred = (1.0 - known_sum).max(0.0);
            pass.set_weight(&mut graph[*e], inferred);
            pass.set_split(&mut graph[n]);
            issues.info(
                IssueKind::WeightInferred,
                format!(
                    "{} of {} inferred as {inferred}, completing the split of '{}'",
                    pass.label(),
                    describe(graph, *e),
                    graph[n].id,
                ),
            );
        }
        _ => {
            let listed: Vec<String> = missing.iter().map(|&e| describe(graph, e)).collect();
            issues.warning(
                IssueKind::WeightInferenceWarning,
                format!(
                    "cannot infer the {}s of {} edges of '{}': {}",
                    pass.label(),
                    missing.len(),
                    graph[n].id,
                    listed.join(", "),
                ),
            );
        }
    }
}

fn describe(graph: &DiGraph<FlowNode, FlowEdge>, e: EdgeIndex) -> String {
    match graph.edge_endpoints(e) {
        Some((a, b)) => format!("('{}', '{}')", graph[a].id, graph[b].id),
        None => format!("edge {}", e.index()),
    }
}
