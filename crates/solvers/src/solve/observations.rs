use std::collections::BTreeMap;

use flowquant_core::{
    Evaluator, InterfaceId, IssueKind, Issues, Observation, ParameterValues, TimePeriod, Unit,
};

use crate::{SolveError, weight::evaluate_number};

/// The observations that apply to one scenario and period, one value each.
#[derive(Debug, Default)]
pub(super) struct Selected {
    pub(super) absolute: BTreeMap<InterfaceId, (f64, Option<Unit>)>,
    /// `(reference, interface) → factor`.
    pub(super) relative: BTreeMap<(InterfaceId, InterfaceId), f64>,
}

/// Picks one value per interface for `period`.
///
/// Observations labelled with the period itself beat generic ones, and
/// several observations of the same kind (from different observers) are
/// averaged.
pub(super) fn select<E: Evaluator>(
    observations: &[Observation],
    scenario: &str,
    period: TimePeriod,
    params: &ParameterValues,
    evaluator: &E,
    issues: &mut Issues,
) -> Result<Selected, SolveError> {
    type Key<'a> = (&'a InterfaceId, Option<&'a InterfaceId>);
    let mut grouped: BTreeMap<Key<'_>, Vec<&Observation>> = BTreeMap::new();

    for observation in observations
        .iter()
        .filter(|o| o.applies_to(scenario) && o.period.covers(period))
    {
        let key = (&observation.interface, observation.relative_to.as_ref());
        grouped.entry(key).or_default().push(observation);
    }

    let mut selected = Selected::default();
    for ((interface, reference), mut group) in grouped {
        if group.iter().any(|o| o.period == period) {
            group.retain(|o| o.period == period);
        }

        let mut sum = 0.0;
        for observation in &group {
            sum += evaluate_number(&observation.value, params, evaluator).map_err(|failed| {
                SolveError::UnevaluableObservation {
                    interface: interface.clone(),
                    unresolved: failed.unresolved.into_iter().collect(),
                    problems: failed.problems,
                }
            })?;
        }
        #[allow(clippy::cast_precision_loss)]
        let value = sum / group.len() as f64;

        if group.len() > 1 {
            let observers: Vec<&str> = group
                .iter()
                .map(|o| o.observer.as_deref().unwrap_or("unnamed"))
                .collect();
            issues.info(
                IssueKind::AveragedObservations,
                format!(
                    "{} observations of '{interface}' averaged to {value} (observers: {})",
                    group.len(),
                    observers.join(", ")
                ),
            );
        }

        match reference {
            Some(reference) => {
                selected
                    .relative
                    .insert((reference.clone(), interface.clone()), value);
            }
            None => {
                let unit = group.iter().find_map(|o| o.unit.clone());
                selected.absolute.insert(interface.clone(), (value, unit));
            }
        }
    }

    Ok(selected)
}
