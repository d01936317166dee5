use std::collections::{BTreeMap, BTreeSet};

use approx::relative_eq;
use flowquant_core::{InterfaceId, IssueKind, Issues};

use super::{ComputationGraph, Derivation};

impl ComputationGraph {
    /// Computes `targets` from the known values of one combination.
    ///
    /// Values spread through forward and backward sweeps until nothing
    /// changes. A node becomes known once and never changes afterwards; when
    /// several derivations are available, an additive group wins over a
    /// single edge, and otherwise the first one found is used. Derivations
    /// that disagree with a node's value by more than the consistency
    /// tolerance are reported as [`IssueKind::InconsistentDerivation`].
    ///
    /// Every target is present in the result; those no known value reaches
    /// are `None` and reported as [`IssueKind::UnresolvedDownstreamNode`].
    /// Known values for interfaces outside the graph are reported as
    /// [`IssueKind::IgnoredObservation`].
    #[must_use]
    pub fn compute_values(
        &self,
        targets: &BTreeSet<InterfaceId>,
        knowns: &BTreeMap<InterfaceId, f64>,
    ) -> (BTreeMap<InterfaceId, Option<f64>>, Issues) {
        let mut issues = Issues::new();
        let mut values: Vec<Option<f64>> = vec![None; self.graph.node_count()];

        for (id, &value) in knowns {
            match self.index.get(id) {
                Some(n) => values[n.index()] = Some(value),
                None => issues.warning(
                    IssueKind::IgnoredObservation,
                    format!("'{id}' is not part of the flow graph; its value {value} is ignored"),
                ),
            }
        }

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;

            for n in self.sweep() {
                if values[n.index()].is_some() {
                    continue;
                }
                let derived = self
                    .derivations(n, |m| values[m.index()].is_some())
                    .first()
                    .and_then(|derivation| evaluate(derivation, &values));
                if derived.is_some() {
                    values[n.index()] = derived;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
        tracing::trace!(passes, knowns = knowns.len(), "value fixpoint reached");

        for &n in &self.order {
            let Some(value) = values[n.index()] else {
                continue;
            };
            let disagreeing: Vec<f64> = self
                .derivations(n, |m| values[m.index()].is_some())
                .iter()
                .filter_map(|derivation| evaluate(derivation, &values))
                .filter(|derived| {
                    !relative_eq!(
                        value,
                        *derived,
                        epsilon = f64::EPSILON,
                        max_relative = self.consistency_tolerance
                    )
                })
                .collect();
            if !disagreeing.is_empty() {
                let listed: Vec<String> = disagreeing.iter().map(f64::to_string).collect();
                issues.warning(
                    IssueKind::InconsistentDerivation,
                    format!(
                        "'{}' is {value}, but other derivations give {}",
                        self.graph[n].id,
                        listed.join(", ")
                    ),
                );
            }
        }

        let results = targets
            .iter()
            .map(|id| {
                let value = self.index.get(id).and_then(|n| values[n.index()]);
                if value.is_none() {
                    issues.info(
                        IssueKind::UnresolvedDownstreamNode,
                        format!("'{id}' cannot be reached from any known value"),
                    );
                }
                (id.clone(), value)
            })
            .collect();

        (results, issues)
    }
}

fn evaluate(derivation: &Derivation, values: &[Option<f64>]) -> Option<f64> {
    derivation
        .terms
        .iter()
        .map(|(m, factor)| values[m.index()].map(|x| factor * x))
        .sum()
}
