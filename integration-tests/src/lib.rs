//! Fixture loading for the end-to-end tests.
//!
//! A fixture is a case study with an optional `config` table, stored as TOML
//! or JSON under `fixtures/`.

use std::{fs, path::PathBuf};

use flowquant_core::{FormulaEvaluator, InterfaceId, TimePeriod};
use flowquant_solvers::{CaseStudy, Config, PeriodReport, Report, solve};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a test-friendly subscriber once per test binary.
///
/// Use `RUST_LOG` to override the default `flowquant_solvers=debug` filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowquant_solvers=debug"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub config: Config,
    #[serde(flatten)]
    pub case: CaseStudy,
}

impl Fixture {
    /// Loads `fixtures/{name}`, picking the format from the extension.
    ///
    /// # Panics
    ///
    /// Panics if the file is missing or malformed.
    #[must_use]
    pub fn load(name: &str) -> Self {
        init_logging();
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join(name);
        let text = fs::read_to_string(&path)
            .unwrap_or_else(|error| panic!("cannot read {}: {error}", path.display()));

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text)
                .unwrap_or_else(|error| panic!("invalid fixture {name}: {error}")),
            Some("json") => serde_json::from_str(&text)
                .unwrap_or_else(|error| panic!("invalid fixture {name}: {error}")),
            _ => panic!("unsupported fixture format: {name}"),
        }
    }

    /// Solves the fixture with the default formula evaluator.
    ///
    /// # Panics
    ///
    /// Panics if the solve fails as a whole.
    #[must_use]
    pub fn solve(&self) -> Report {
        solve(&self.case, &FormulaEvaluator, &self.config)
            .unwrap_or_else(|error| panic!("solve failed: {error}"))
    }
}

/// Returns the report of one scenario and period, panicking on failures.
///
/// # Panics
///
/// Panics if the scenario or period is missing or failed.
#[must_use]
pub fn period<'a>(report: &'a Report, scenario: &str, label: &str) -> &'a PeriodReport {
    let label: TimePeriod = label
        .parse()
        .unwrap_or_else(|error| panic!("bad period label: {error}"));
    let scenario = match report.scenario(scenario) {
        Some(Ok(scenario)) => scenario,
        Some(Err(error)) => panic!("scenario failed: {error}"),
        None => panic!("no scenario named {scenario}"),
    };
    match scenario.periods.get(&label) {
        Some(Ok(period)) => period,
        Some(Err(error)) => panic!("period {label} failed: {error}"),
        None => panic!("no period {label}"),
    }
}

/// Returns the values of `interface` across the combinations of a period.
#[must_use]
pub fn values(report: &PeriodReport, interface: &str) -> Vec<f64> {
    report.values_of(&InterfaceId::from(interface)).collect()
}
