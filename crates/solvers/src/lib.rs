//! The flowquant propagation engine.
//!
//! Given declared parameters, scenarios, observations, and proportional
//! relations between interfaces, the engine computes the quantities of the
//! interfaces nobody observed:
//!
//! - [`parameters`]: resolves scenario parameters to constants
//! - [`scale`]: propagates values down chains of scale relations
//! - [`flow`]: infers missing flow weights from the graph topology
//! - [`computation`]: finds conflicting observations, splits them into
//!   consistent combinations, and computes values for each
//! - [`solve`]: runs all of the above for every scenario and period
//!
//! Every component shares one [`Config`]. Non-fatal findings are returned as
//! [`Issues`](flowquant_core::Issues); fatal ones as each module's error type.

mod config;
mod cycles;
mod weight;

pub mod computation;
pub mod flow;
pub mod parameters;
pub mod scale;
pub mod solve;

pub use computation::{ComputationError, ComputationGraph, Conflict};
pub use config::{Config, ConfigError};
pub use flow::{FlowEdge, FlowError, FlowGraph, Split};
pub use parameters::{ParameterError, resolve_parameters};
pub use scale::{ScaleError, ScaleGraph, ScaleOutcome};
pub use solve::{
    CaseStudy, CombinationReport, PeriodReport, Report, ScenarioReport, SolveError, solve,
};
pub use weight::Weight;
