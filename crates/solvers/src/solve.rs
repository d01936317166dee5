//! The scenario × period driver.
//!
//! [`solve`] runs a whole [`CaseStudy`]: the structural graphs are built
//! once, then every scenario resolves its parameters and every period of
//! the scenario is solved on its own. A failure in one scenario or period is
//! recorded in the [`Report`] and the others carry on.

mod observations;


use std::collections::{BTreeMap, BTreeSet};

use flowquant_core::{
    Evaluator, Expression, FlowRelation, InterfaceId, IssueKind, Issues, Observation, Parameter,
    ParameterValues, PeriodError, Quantity, ScaleRelation, Scenario, TimePeriod, Unit,
    period::expand_generic,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    ComputationError, Config, FlowError, FlowGraph, ParameterError, ScaleError, ScaleGraph,
    resolve_parameters,
};

/// The name of the implicit scenario of a case study that declares none.
pub const BASE_SCENARIO: &str = "base";

/// Everything a solve needs, as loaded from a case-study file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaseStudy {
    pub parameters: Vec<Parameter>,
    pub scenarios: Vec<Scenario>,
    pub observations: Vec<Observation>,
    pub flows: Vec<FlowRelation>,
    pub scales: Vec<ScaleRelation>,
}

/// Errors that stop a solve, a scenario, or a period.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("the case study has no absolute observations")]
    NoAbsoluteObservations,

    #[error("could not evaluate the observation of '{interface}' (missing: [{}]; problems: [{}])", unresolved.join(", "), problems.join("; "))]
    UnevaluableObservation {
        interface: InterfaceId,
        unresolved: Vec<String>,
        problems: Vec<String>,
    },

    #[error(transparent)]
    Period(#[from] PeriodError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Scale(#[from] ScaleError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Computation(#[from] ComputationError),
}

/// The results of a solve, per scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub scenarios: BTreeMap<String, Result<ScenarioReport, SolveError>>,
}

/// The results of one scenario, per period.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub parameters: ParameterValues,
    pub periods: BTreeMap<TimePeriod, Result<PeriodReport, SolveError>>,
}

/// The results of one scenario and period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    /// Values propagated along scale relations.
    pub scaled: BTreeMap<InterfaceId, Quantity>,
    /// The absolute observations used as seeds.
    pub knowns: BTreeMap<InterfaceId, Quantity>,
    pub combinations: Vec<CombinationReport>,
    /// Issues shared by every combination.
    pub issues: Issues,
}

/// The values computed from one consistent combination of seeds.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationReport {
    pub seeds: BTreeSet<InterfaceId>,
    /// Every flow-graph node outside `seeds`; `None` where no seed reaches.
    pub values: BTreeMap<InterfaceId, Option<f64>>,
    pub issues: Issues,
}

impl Report {
    /// Returns the report of the named scenario.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&Result<ScenarioReport, SolveError>> {
        self.scenarios.get(name)
    }
}

impl PeriodReport {
    /// Returns the value of `id` in every combination that determines it.
    pub fn values_of<'a>(&'a self, id: &'a InterfaceId) -> impl Iterator<Item = f64> + 'a {
        self.combinations.iter().filter_map(move |combination| {
            if combination.seeds.contains(id) {
                self.knowns.get(id).map(|known| known.value)
            } else {
                combination.values.get(id).copied().flatten()
            }
        })
    }
}

/// Solves every scenario and period of `case`.
///
/// Scale relations also take part in the flow graph as proportional edges.
/// Where a flow relation and a scale relation join the same two interfaces,
/// the scale is the weight of that edge; the flow's reverse weight is kept.
///
/// # Errors
///
/// Fails for problems that affect the whole case study: no absolute
/// observation at all, period labels of mixed granularity, or a scale
/// destination with two origins. Problems confined to one scenario or period
/// are recorded in the returned [`Report`].
pub fn solve<E: Evaluator>(
    case: &CaseStudy,
    evaluator: &E,
    config: &Config,
) -> Result<Report, SolveError> {
    if case.observations.iter().all(Observation::is_relative) {
        return Err(SolveError::NoAbsoluteObservations);
    }

    let periods = expand_generic(case.observations.iter().map(|o| &o.period))?;
    let scales = ScaleGraph::new(&case.scales, evaluator)?;

    let mut template = FlowGraph::new();
    for relation in &case.flows {
        template.add_relation(relation, evaluator)?;
    }
    for (origin, destination, scale) in scales.relations() {
        if let Some(flow) = template
            .edge(origin, destination)
            .and_then(|edge| edge.weight.as_ref())
        {
            tracing::warn!(
                %origin,
                %destination,
                %flow,
                %scale,
                "scale relation replaces the flow weight"
            );
        }
        template.add_edge(origin, destination, Some(scale.clone()), None);
    }

    let base = [Scenario::new(BASE_SCENARIO)];
    let scenarios = if case.scenarios.is_empty() {
        &base[..]
    } else {
        &case.scenarios[..]
    };

    let driver = Driver {
        case,
        evaluator,
        config,
        scales: &scales,
        template: &template,
    };

    let scenarios = scenarios
        .iter()
        .map(|scenario| {
            let span = tracing::info_span!("scenario", name = %scenario.name);
            let _entered = span.enter();
            let report = driver.scenario(scenario, &periods);
            if let Err(error) = &report {
                tracing::warn!(%error, "scenario failed");
            }
            (scenario.name.clone(), report)
        })
        .collect();

    Ok(Report { scenarios })
}

/// The shared, read-only state of one solve.
struct Driver<'a, E> {
    case: &'a CaseStudy,
    evaluator: &'a E,
    config: &'a Config,
    scales: &'a ScaleGraph,
    template: &'a FlowGraph,
}

impl<E: Evaluator> Driver<'_, E> {
    fn scenario(
        &self,
        scenario: &Scenario,
        periods: &BTreeSet<TimePeriod>,
    ) -> Result<ScenarioReport, SolveError> {
        let parameters =
            resolve_parameters(&self.case.parameters, scenario, self.evaluator, self.config)?;
        tracing::debug!(parameters = parameters.len(), "parameters resolved");

        let periods = periods
            .iter()
            .map(|&period| {
                let span = tracing::info_span!("period", label = %period);
                let _entered = span.enter();
                let report = self.period(&scenario.name, period, &parameters);
                if let Err(error) = &report {
                    tracing::warn!(%error, "period failed");
                }
                (period, report)
            })
            .collect();

        Ok(ScenarioReport {
            parameters,
            periods,
        })
    }

    fn period(
        &self,
        scenario: &str,
        period: TimePeriod,
        params: &ParameterValues,
    ) -> Result<PeriodReport, SolveError> {
        let mut issues = Issues::new();
        let selected = observations::select(
            &self.case.observations,
            scenario,
            period,
            params,
            self.evaluator,
            &mut issues,
        )?;

        let beginning_values: BTreeMap<InterfaceId, (Expression, Option<Unit>)> = selected
            .absolute
            .iter()
            .filter(|(id, _)| self.scales.contains(id))
            .map(|(id, (value, unit))| (id.clone(), (Expression::number(*value), unit.clone())))
            .collect();
        let scaled = self
            .scales
            .propagate(params, &beginning_values, self.evaluator)?;
        issues.append(scaled.issues);

        let mut flows = self.template.clone();
        for ((reference, interface), factor) in &selected.relative {
            flows.add_relative_observation(reference, interface, *factor);
        }
        let (graph, completion) = flows
            .resolve_weights(params, self.evaluator)?
            .computation_graph(self.config)?;
        issues.append(completion);

        let mut knowns = BTreeMap::new();
        for (id, (value, unit)) in selected.absolute {
            if graph.contains(&id) {
                knowns.insert(id, Quantity::new(value, unit));
            } else {
                issues.warning(
                    IssueKind::IgnoredObservation,
                    format!("'{id}' takes part in no relation; its observation {value} is ignored"),
                );
            }
        }

        let seeds: BTreeSet<InterfaceId> = knowns.keys().cloned().collect();
        let combinations = graph
            .consistent_combinations(&seeds)?
            .into_iter()
            .map(|seeds| {
                let values: BTreeMap<InterfaceId, f64> = seeds
                    .iter()
                    .filter_map(|id| Some((id.clone(), knowns.get(id)?.value)))
                    .collect();
                let targets: BTreeSet<InterfaceId> = graph
                    .nodes()
                    .filter(|id| !seeds.contains(*id))
                    .cloned()
                    .collect();
                let (values, issues) = graph.compute_values(&targets, &values);
                tracing::debug!(
                    seeds = seeds.len(),
                    resolved = values.values().filter(|v| v.is_some()).count(),
                    "combination solved"
                );
                CombinationReport {
                    seeds,
                    values,
                    issues,
                }
            })
            .collect();

        Ok(PeriodReport {
            scaled: scaled.values,
            knowns,
            combinations,
            issues,
        })
    }
}
