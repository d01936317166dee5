use std::collections::{BTreeMap, BTreeSet};

use approx::assert_relative_eq;
use flowquant_core::{InterfaceId, IssueKind};
use proptest::prelude::*;

use crate::{Config, FlowGraph, Weight};

use super::{ComputationError, ComputationGraph};

fn id(name: &str) -> InterfaceId {
    InterfaceId::from(name)
}

fn ids(names: &[&str]) -> BTreeSet<InterfaceId> {
    names.iter().map(|name| id(name)).collect()
}

/// Builds a computation graph from `(source, destination, weight, reverse)`.
fn build(edges: &[(&str, &str, Option<f64>, Option<f64>)], config: &Config) -> ComputationGraph {
    let mut flows = FlowGraph::new();
    for (source, destination, weight, reverse) in edges {
        flows.add_edge(
            &id(source),
            &id(destination),
            weight.map(Weight::Value),
            reverse.map(Weight::Value),
        );
    }
    let (graph, _issues) = flows.computation_graph(config).unwrap();
    graph
}

fn knowns(values: &[(&str, f64)]) -> BTreeMap<InterfaceId, f64> {
    values.iter().map(|(name, value)| (id(name), *value)).collect()
}

#[test]
fn propagates_along_a_chain() {
    let graph = build(
        &[("x", "y", Some(0.5), None), ("y", "z", Some(2.0), None)],
        &Config::default(),
    );

    let known = ids(&["x"]);
    assert!(graph.compute_param_conflicts(&known).is_empty());
    assert_eq!(graph.consistent_combinations(&known).unwrap(), vec![known]);

    let (values, issues) = graph.compute_values(&ids(&["y", "z"]), &knowns(&[("x", 10.0)]));
    assert_relative_eq!(values[&id("y")].unwrap(), 5.0);
    assert_relative_eq!(values[&id("z")].unwrap(), 10.0);
    assert!(issues.is_empty());
}

#[test]
fn propagates_backwards_through_reverse_weights() {
    let graph = build(
        &[("x", "y", Some(0.5), None), ("y", "z", Some(2.0), None)],
        &Config::default(),
    );

    let (values, _) = graph.compute_values(&ids(&["x", "y"]), &knowns(&[("z", 4.0)]));
    assert_relative_eq!(values[&id("y")].unwrap(), 2.0);
    assert_relative_eq!(values[&id("x")].unwrap(), 4.0);
}

#[test]
fn split_children_add_up_in_one_combination() {
    let graph = build(
        &[
            ("farm:total", "farm:crop", Some(0.6), None),
            ("farm:total", "farm:pasture", None, None),
        ],
        &Config::default(),
    );

    let known = ids(&["farm:crop", "farm:pasture"]);
    assert!(graph.compute_param_conflicts(&known).is_empty());
    assert_eq!(
        graph.consistent_combinations(&known).unwrap(),
        vec![known.clone()]
    );

    let (values, issues) = graph.compute_values(
        &ids(&["farm:total"]),
        &knowns(&[("farm:crop", 6.0), ("farm:pasture", 4.0)]),
    );
    assert_relative_eq!(values[&id("farm:total")].unwrap(), 10.0);
    assert!(issues.is_empty());
}

#[test]
fn split_parent_and_children_are_alternatives() {
    let graph = build(
        &[
            ("farm:total", "farm:crop", Some(0.6), None),
            ("farm:total", "farm:pasture", None, None),
        ],
        &Config::default(),
    );

    let known = ids(&["farm:crop", "farm:pasture", "farm:total"]);
    let conflicts = graph.compute_param_conflicts(&known);
    assert_eq!(
        conflicts[&id("farm:total")].sides,
        vec![ids(&["farm:crop", "farm:pasture"]), ids(&["farm:total"])]
    );

    assert_eq!(
        graph.consistent_combinations(&known).unwrap(),
        vec![ids(&["farm:crop", "farm:pasture"]), ids(&["farm:total"])]
    );
}

#[test]
fn alternative_derivations_conflict() {
    let graph = build(
        &[("x", "z", Some(1.0), None), ("y", "z", Some(1.0), None)],
        &Config::default(),
    );

    let known = ids(&["x", "y"]);
    let conflicts = graph.compute_param_conflicts(&known);
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[&id("z")];
    assert_eq!(conflict.sides, vec![ids(&["x"]), ids(&["y"])]);
    assert_eq!(conflict.implicated(), known);

    assert_eq!(
        graph.compute_param_combinations(&known, &conflicts).unwrap(),
        vec![ids(&["x"]), ids(&["y"])]
    );
    assert_eq!(
        graph.consistent_combinations(&known).unwrap(),
        vec![ids(&["x"]), ids(&["y"])]
    );
}

#[test]
fn reverse_split_merges_additively() {
    let graph = build(
        &[("x", "z", Some(1.0), Some(0.3)), ("y", "z", Some(1.0), Some(0.7))],
        &Config::default(),
    );

    let known = ids(&["x", "y"]);
    assert!(graph.compute_param_conflicts(&known).is_empty());

    let (values, issues) = graph.compute_values(&ids(&["z"]), &knowns(&[("x", 3.0), ("y", 7.0)]));
    assert_relative_eq!(values[&id("z")].unwrap(), 10.0);
    assert!(issues.is_empty());
}

/// `x` splits evenly into `a` and `b`, which merge again into `z`.
fn diamond() -> ComputationGraph {
    build(
        &[
            ("x", "a", Some(0.5), None),
            ("x", "b", Some(0.5), None),
            ("a", "z", Some(1.0), None),
            ("b", "z", Some(1.0), None),
        ],
        &Config::default(),
    )
}

#[test]
fn split_siblings_merge_additively() {
    let graph = diamond();

    let (values, issues) = graph.compute_values(&ids(&["a", "b", "z"]), &knowns(&[("x", 10.0)]));
    assert_relative_eq!(values[&id("a")].unwrap(), 5.0);
    assert_relative_eq!(values[&id("b")].unwrap(), 5.0);
    assert_relative_eq!(values[&id("z")].unwrap(), 10.0);
    assert!(issues.of_kind(IssueKind::InconsistentDerivation).next().is_none());

    // One sibling is enough: the split parent is recovered from it first.
    let (values, _) = graph.compute_values(&ids(&["x", "z"]), &knowns(&[("a", 5.0)]));
    assert_relative_eq!(values[&id("x")].unwrap(), 10.0);
    assert_relative_eq!(values[&id("z")].unwrap(), 10.0);
}

#[test]
fn split_siblings_form_one_combination() {
    let graph = diamond();

    let known = ids(&["a", "b"]);
    assert!(graph.compute_param_conflicts(&known).is_empty());
    assert_eq!(graph.consistent_combinations(&known).unwrap(), vec![known]);

    let (values, _) = graph.compute_values(
        &ids(&["x", "z"]),
        &knowns(&[("a", 4.0), ("b", 6.0)]),
    );
    assert_relative_eq!(values[&id("x")].unwrap(), 10.0);
    assert_relative_eq!(values[&id("z")].unwrap(), 10.0);
}

#[test]
fn overdetermined_chain_conflicts_in_the_middle() {
    let graph = build(
        &[("x", "y", Some(0.5), None), ("y", "z", Some(2.0), None)],
        &Config::default(),
    );

    let known = ids(&["x", "z"]);
    let conflicts = graph.compute_param_conflicts(&known);
    assert_eq!(conflicts.keys().collect::<Vec<_>>(), vec![&id("y")]);
    assert_eq!(
        graph.consistent_combinations(&known).unwrap(),
        vec![ids(&["x"]), ids(&["z"])]
    );
}

#[test]
fn unimplicated_seeds_join_every_combination() {
    let graph = build(
        &[
            ("x", "z", Some(1.0), None),
            ("y", "z", Some(1.0), None),
            ("w", "v", Some(2.0), None),
        ],
        &Config::default(),
    );

    assert_eq!(
        graph.consistent_combinations(&ids(&["w", "x", "y"])).unwrap(),
        vec![ids(&["w", "x"]), ids(&["w", "y"])]
    );
}

#[test]
fn combination_limit_is_enforced() {
    let config = Config::new(false, 1e-9, 1e-9, 1).unwrap();
    let graph = build(
        &[("x", "z", Some(1.0), None), ("y", "z", Some(1.0), None)],
        &config,
    );

    assert_eq!(
        graph.consistent_combinations(&ids(&["x", "y"])),
        Err(ComputationError::CombinationLimit { limit: 1 })
    );
}

#[test]
fn reports_unreachable_targets_and_ignored_knowns() {
    let graph = build(
        &[("x", "y", Some(2.0), None), ("a", "b", Some(1.0), None)],
        &Config::default(),
    );

    let (values, issues) = graph.compute_values(
        &ids(&["y", "b", "nowhere"]),
        &knowns(&[("x", 1.0), ("ghost", 5.0)]),
    );

    assert_eq!(values[&id("y")], Some(2.0));
    assert_eq!(values[&id("b")], None);
    assert_eq!(values[&id("nowhere")], None);
    assert_eq!(issues.of_kind(IssueKind::UnresolvedDownstreamNode).count(), 2);
    assert_eq!(issues.of_kind(IssueKind::IgnoredObservation).count(), 1);
}

#[test]
fn disagreeing_derivations_are_warnings() {
    let graph = build(
        &[
            ("farm:total", "farm:crop", Some(0.6), None),
            ("farm:total", "farm:pasture", None, None),
        ],
        &Config::default(),
    );

    let (values, issues) = graph.compute_values(
        &ids(&["farm:total"]),
        &knowns(&[("farm:crop", 6.0), ("farm:pasture", 5.0)]),
    );

    // The sum wins, and both shares disagree with the declared weights.
    assert_relative_eq!(values[&id("farm:total")].unwrap(), 11.0);
    assert_eq!(issues.of_kind(IssueKind::InconsistentDerivation).count(), 2);
}

#[test]
fn graph_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ComputationGraph>();
}

proptest! {
    #[test]
    fn chain_value_is_the_product_of_weights(
        weights in prop::collection::vec(0.1f64..10.0, 1..8),
        seed in 0.1f64..1000.0,
    ) {
        let names: Vec<String> = (0..=weights.len()).map(|i| format!("chain:{i}")).collect();
        let mut flows = FlowGraph::new();
        for (i, w) in weights.iter().enumerate() {
            flows.add_edge(&id(&names[i]), &id(&names[i + 1]), Some(Weight::Value(*w)), None);
        }
        let (graph, _) = flows.computation_graph(&Config::default()).unwrap();

        let last = id(&names[weights.len()]);
        let (values, issues) = graph.compute_values(
            &BTreeSet::from([last.clone()]),
            &BTreeMap::from([(id(&names[0]), seed)]),
        );

        let expected = weights.iter().fold(seed, |acc, w| acc * w);
        prop_assert!(issues.is_empty());
        prop_assert!((values[&last].unwrap() - expected).abs() <= 1e-9 * expected);
    }

    #[test]
    fn solving_is_idempotent_and_conflict_free(
        edges in prop::collection::vec(
            (0usize..8, 0usize..8, prop::option::of(0.1f64..2.0), prop::option::of(0.1f64..2.0)),
            0..16,
        ),
        seeds in prop::collection::btree_set(0usize..8, 0..5),
    ) {
        let name = |i: usize| id(&format!("node:{i}"));
        let mut flows = FlowGraph::new();
        for (a, b, weight, reverse) in edges.iter().filter(|(a, b, _, _)| a < b) {
            flows.add_edge(&name(*a), &name(*b), weight.map(Weight::Value), reverse.map(Weight::Value));
        }
        let (graph, _) = flows.computation_graph(&Config::default()).unwrap();

        let known: BTreeSet<InterfaceId> = seeds
            .iter()
            .map(|&i| name(i))
            .filter(|seed| graph.contains(seed))
            .collect();
        let combinations = graph.consistent_combinations(&known).unwrap();
        prop_assert!(!combinations.is_empty());

        let targets: BTreeSet<InterfaceId> = graph.nodes().cloned().collect();
        for combination in &combinations {
            prop_assert!(combination.is_subset(&known));
            prop_assert!(graph.compute_param_conflicts(combination).is_empty());

            let values: BTreeMap<InterfaceId, f64> = combination
                .iter()
                .enumerate()
                .map(|(i, seed)| (seed.clone(), 1.0 + i as f64))
                .collect();
            let first = graph.compute_values(&targets, &values);
            let second = graph.compute_values(&targets, &values);
            prop_assert_eq!(first, second);
        }
    }
}
