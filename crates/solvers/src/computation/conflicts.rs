use std::collections::{BTreeMap, BTreeSet};

use flowquant_core::InterfaceId;
use petgraph::graph::NodeIndex;

use super::{ComputationGraph, Conflict};

/// The seeds each node's value would come from, once it is derivable.
type Provenance = Vec<Option<BTreeSet<NodeIndex>>>;

impl ComputationGraph {
    /// Finds the nodes that independent sets of `known` seeds would each
    /// derive.
    ///
    /// Provenance (the set of seeds a value depends on) is propagated through
    /// forward and backward sweeps until nothing changes. A node then
    /// conflicts if its derivations come from two or more distinct seed
    /// sets; a seed's own observation counts as the set holding only itself.
    /// Derivations of a seed that depend on that seed are circular and do not
    /// count. Seeds that are not nodes of the graph are ignored.
    #[must_use]
    pub fn compute_param_conflicts(
        &self,
        known: &BTreeSet<InterfaceId>,
    ) -> BTreeMap<InterfaceId, Conflict> {
        let seeds = self.seeds(known);
        let provenance = self.provenance(&seeds);

        self.graph
            .node_indices()
            .filter_map(|n| {
                let mut sides: BTreeSet<BTreeSet<NodeIndex>> =
                    self.sides(n, &provenance).into_iter().collect();
                if seeds.contains(&n) {
                    sides.insert(BTreeSet::from([n]));
                }
                (sides.len() > 1).then(|| {
                    let sides: BTreeSet<BTreeSet<InterfaceId>> = sides
                        .into_iter()
                        .map(|side| side.into_iter().map(|s| self.graph[s].id.clone()).collect())
                        .collect();
                    (
                        self.graph[n].id.clone(),
                        Conflict {
                            sides: sides.into_iter().collect(),
                        },
                    )
                })
            })
            .collect()
    }

    fn provenance(&self, seeds: &BTreeSet<NodeIndex>) -> Provenance {
        let mut provenance: Provenance = vec![None; self.graph.node_count()];
        for &s in seeds {
            provenance[s.index()] = Some(BTreeSet::from([s]));
        }

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;

            for n in self.sweep() {
                if seeds.contains(&n) {
                    continue;
                }
                let Some(union) = self
                    .sides(n, &provenance)
                    .into_iter()
                    .reduce(|mut all, side| {
                        all.extend(side);
                        all
                    })
                else {
                    continue;
                };

                let current = provenance[n.index()].get_or_insert_with(BTreeSet::new);
                let before = current.len();
                current.extend(union);
                changed |= current.len() != before;
            }

            if !changed {
                break;
            }
        }
        tracing::trace!(passes, seeds = seeds.len(), "provenance fixpoint reached");

        provenance
    }

    /// The seed sets of the derivations of `n`, excluding circular ones.
    fn sides(&self, n: NodeIndex, provenance: &Provenance) -> Vec<BTreeSet<NodeIndex>> {
        self.derivations(n, |m| provenance[m.index()].is_some())
            .into_iter()
            .map(|derivation| {
                derivation
                    .terms
                    .iter()
                    .filter_map(|(m, _)| provenance[m.index()].as_ref())
                    .flatten()
                    .copied()
                    .collect::<BTreeSet<_>>()
            })
            .filter(|side| !side.contains(&n))
            .collect()
    }
}
