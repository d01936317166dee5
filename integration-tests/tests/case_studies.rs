use std::collections::BTreeSet;

use approx::assert_relative_eq;
use flowquant_core::{InterfaceId, IssueKind, TimePeriod, Unit};
use flowquant_solvers::{Config, FlowError, SolveError};
use integration_tests::{Fixture, period, values};

#[test]
fn farm_water_is_split_per_scenario_and_year() {
    let fixture = Fixture::load("farm.toml");
    assert_eq!(fixture.config.max_combinations(), 64);

    let report = fixture.solve();
    assert_eq!(
        report.scenarios.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["baseline", "drought"]
    );

    let baseline = period(&report, "baseline", "2010");
    assert_relative_eq!(values(baseline, "Farm:Water")[0], 105.0);
    assert_relative_eq!(values(baseline, "Farm.Crops:Water")[0], 63.0, max_relative = 1e-12);
    assert_relative_eq!(values(baseline, "Farm.Pasture:Water")[0], 42.0, max_relative = 1e-12);
    assert_relative_eq!(values(baseline, "Farm.Crops:Energy")[0], 15.75, max_relative = 1e-12);
    assert_eq!(
        baseline
            .issues
            .of_kind(IssueKind::AveragedObservations)
            .count(),
        1
    );

    let later = period(&report, "baseline", "2011");
    assert_relative_eq!(values(later, "Farm.Crops:Water")[0], 72.0, max_relative = 1e-12);
    assert_relative_eq!(values(later, "Farm.Crops:Energy")[0], 18.0, max_relative = 1e-12);

    let drought = period(&report, "drought", "2010");
    assert_relative_eq!(values(drought, "Farm.Crops:Water")[0], 84.0, max_relative = 1e-12);
    assert_relative_eq!(values(drought, "Farm.Pasture:Water")[0], 21.0, max_relative = 1e-12);
}

#[test]
fn plant_steam_sources_are_solved_apart() {
    let report = Fixture::load("plant.json").solve();
    let result = period(&report, "base", "Year");

    let steam = &result.scaled[&InterfaceId::from("Plant.Boiler:Steam")];
    assert_relative_eq!(steam.value, 180.0, max_relative = 1e-12);
    assert_eq!(steam.unit, Some(Unit::new("t")));

    let seeds: Vec<BTreeSet<&str>> = result
        .combinations
        .iter()
        .map(|c| c.seeds.iter().map(InterfaceId::as_str).collect())
        .collect();
    assert_eq!(
        seeds,
        vec![
            BTreeSet::from(["Plant.Aux:Steam"]),
            BTreeSet::from(["Plant.Boiler:Fuel"]),
        ]
    );

    let turbine = values(result, "Plant.Turbine:Steam");
    assert_relative_eq!(turbine[0], 150.0);
    assert_relative_eq!(turbine[1], 180.0, max_relative = 1e-12);

    // Neither source can be recovered from the turbine alone.
    let aux_only = &result.combinations[0];
    assert_eq!(aux_only.values[&InterfaceId::from("Plant.Boiler:Steam")], None);
    assert!(
        aux_only
            .issues
            .of_kind(IssueKind::UnresolvedDownstreamNode)
            .count()
            > 0
    );
}

#[test]
fn case_sensitive_names_must_match_exactly() {
    let mut fixture = Fixture::load("farm.toml");
    fixture.config = toml::from_str("case_sensitive = true").unwrap();

    let report = fixture.solve();

    // Only the drought scenario defines the lowercase name the weight uses.
    let baseline = report.scenario("baseline").unwrap().as_ref().unwrap();
    assert!(matches!(
        baseline.periods[&TimePeriod::Year(2010)],
        Err(SolveError::Flow(FlowError::UnevaluableWeight { .. }))
    ));

    let drought = period(&report, "drought", "2010");
    assert_relative_eq!(values(drought, "Farm.Crops:Water")[0], 84.0, max_relative = 1e-12);
}

#[test]
fn invalid_configs_are_rejected_when_loaded() {
    assert!(toml::from_str::<Config>("max_combinations = 0").is_err());
    assert!(serde_json::from_str::<Config>(r#"{ "split_tolerance": -1.0 }"#).is_err());

    let config: Config = serde_json::from_str(r#"{ "consistency_tolerance": 1e-6 }"#).unwrap();
    assert_relative_eq!(config.consistency_tolerance(), 1e-6);
    assert_eq!(config.max_combinations(), Config::default().max_combinations());
}
