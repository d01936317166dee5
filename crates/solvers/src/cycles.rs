use std::collections::BTreeSet;

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

/// Returns every cycle of `graph` as a list of node weights.
///
/// Each strongly connected component with more than one node, or with a
/// self-loop, is one cycle. Its members are listed by walking the component
/// from its smallest member, always taking the smallest unvisited successor;
/// for a simple cycle this is exactly the cycle's order. Members the walk
/// cannot reach without revisiting are appended in order.
pub(crate) fn find_cycles<N: Clone + Ord, E>(graph: &DiGraph<N, E>) -> Vec<Vec<N>> {
    let mut cycles: Vec<Vec<N>> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| order_component(graph, &component))
        .collect();

    cycles.sort();
    cycles
}

fn order_component<N: Clone + Ord, E>(graph: &DiGraph<N, E>, component: &[NodeIndex]) -> Vec<N> {
    let members: BTreeSet<NodeIndex> = component.iter().copied().collect();
    let by_weight = |a: &NodeIndex, b: &NodeIndex| graph[*a].cmp(&graph[*b]);

    let Some(start) = component.iter().copied().min_by(by_weight) else {
        return Vec::new();
    };

    let mut visited = BTreeSet::from([start]);
    let mut order = vec![start];
    let mut current = start;

    while let Some(next) = graph
        .neighbors_directed(current, Direction::Outgoing)
        .filter(|n| members.contains(n) && !visited.contains(n))
        .min_by(by_weight)
    {
        visited.insert(next);
        order.push(next);
        current = next;
    }

    let mut rest: Vec<NodeIndex> = members.difference(&visited).copied().collect();
    rest.sort_by(by_weight);
    order.extend(rest);

    order.into_iter().map(|index| graph[index].clone()).collect()
}
