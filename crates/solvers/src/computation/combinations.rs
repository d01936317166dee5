use std::collections::{BTreeMap, BTreeSet};

use flowquant_core::InterfaceId;

use super::{ComputationError, ComputationGraph, Conflict};

impl ComputationGraph {
    /// Enumerates the maximal subsets of `known` in which no conflict has
    /// two of its sides fully present.
    ///
    /// Seeds not implicated in any conflict belong to every combination. An
    /// empty conflict map yields `known` itself as the only combination.
    ///
    /// # Errors
    ///
    /// Returns [`ComputationError::CombinationLimit`] if there are more
    /// combinations than the configured maximum.
    pub fn compute_param_combinations(
        &self,
        known: &BTreeSet<InterfaceId>,
        conflicts: &BTreeMap<InterfaceId, Conflict>,
    ) -> Result<Vec<BTreeSet<InterfaceId>>, ComputationError> {
        let conflicts: Vec<&Conflict> = conflicts.values().collect();
        let implicated: Vec<&InterfaceId> = conflicts
            .iter()
            .flat_map(|conflict| conflict.sides.iter().flatten())
            .filter(|id| known.contains(*id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let free: BTreeSet<InterfaceId> = known
            .iter()
            .filter(|id| !implicated.contains(id))
            .cloned()
            .collect();

        let mut search = Search {
            conflicts: &conflicts,
            candidates: &implicated,
            chosen: BTreeSet::new(),
            found: Vec::new(),
            limit: self.max_combinations,
        };
        search.visit(0)?;

        Ok(search
            .found
            .into_iter()
            .map(|chosen| {
                let mut combination = free.clone();
                combination.extend(chosen.into_iter().cloned());
                combination
            })
            .collect())
    }

    /// Splits `known` until every combination is conflict-free.
    ///
    /// Each combination from
    /// [`compute_param_combinations`](Self::compute_param_combinations) is
    /// checked again, since dropping seeds changes which derivations remain;
    /// combinations that still conflict are split further. Only the maximal
    /// conflict-free sets are returned, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ComputationError::CombinationLimit`] if there are more
    /// combinations than the configured maximum.
    pub fn consistent_combinations(
        &self,
        known: &BTreeSet<InterfaceId>,
    ) -> Result<Vec<BTreeSet<InterfaceId>>, ComputationError> {
        let mut pending = vec![known.clone()];
        let mut visited = BTreeSet::new();
        let mut consistent = BTreeSet::new();

        while let Some(candidate) = pending.pop() {
            if !visited.insert(candidate.clone()) {
                continue;
            }

            let conflicts = self.compute_param_conflicts(&candidate);
            if conflicts.is_empty() {
                consistent.insert(candidate);
                if consistent.len() > self.max_combinations {
                    return Err(ComputationError::CombinationLimit {
                        limit: self.max_combinations,
                    });
                }
            } else {
                tracing::debug!(
                    seeds = candidate.len(),
                    conflicts = conflicts.len(),
                    "splitting conflicting seeds"
                );
                pending.extend(self.compute_param_combinations(&candidate, &conflicts)?);
            }
        }

        let maximal: Vec<BTreeSet<InterfaceId>> = consistent
            .iter()
            .filter(|set| {
                !consistent
                    .iter()
                    .any(|other| other != *set && set.is_subset(other))
            })
            .cloned()
            .collect();
        tracing::debug!(combinations = maximal.len(), "consistent combinations found");

        Ok(maximal)
    }
}

/// Backtracking over the implicated seeds, including each before excluding it.
struct Search<'a> {
    conflicts: &'a [&'a Conflict],
    candidates: &'a [&'a InterfaceId],
    chosen: BTreeSet<&'a InterfaceId>,
    found: Vec<BTreeSet<&'a InterfaceId>>,
    limit: usize,
}

impl<'a> Search<'a> {
    fn visit(&mut self, depth: usize) -> Result<(), ComputationError> {
        let Some(&candidate) = self.candidates.get(depth) else {
            if self.is_maximal() {
                self.found.push(self.chosen.clone());
                if self.found.len() > self.limit {
                    return Err(ComputationError::CombinationLimit { limit: self.limit });
                }
            }
            return Ok(());
        };

        self.chosen.insert(candidate);
        if self.is_valid(&self.chosen) {
            self.visit(depth + 1)?;
        }
        self.chosen.remove(candidate);

        self.visit(depth + 1)
    }

    fn is_valid(&self, chosen: &BTreeSet<&'a InterfaceId>) -> bool {
        self.conflicts.iter().all(|conflict| {
            conflict
                .sides
                .iter()
                .filter(|side| side.iter().all(|id| chosen.contains(id)))
                .count()
                < 2
        })
    }

    /// No excluded candidate can be added back without a conflict.
    fn is_maximal(&self) -> bool {
        self.candidates
            .iter()
            .filter(|id| !self.chosen.contains(*id))
            .all(|&id| {
                let mut extended = self.chosen.clone();
                extended.insert(id);
                !self.is_valid(&extended)
            })
    }
}
