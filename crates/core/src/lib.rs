//! Core types and collaborator contracts for flowquant.
//!
//! This crate defines the data model that the propagation engine in
//! `flowquant-solvers` works over:
//!
//! - [`InterfaceId`]: an opaque handle for a processor interface
//! - [`Value`], [`Unit`], [`Quantity`]: constants and unit-tagged magnitudes
//! - [`Expression`] and [`Evaluator`]: expressions and the contract for
//!   evaluating them against a [`ParameterValues`] context
//! - [`Parameter`], [`Scenario`]: declared parameters and their overrides
//! - [`TimePeriod`]: period labels and their granularity
//! - [`Observation`], [`FlowRelation`], [`ScaleRelation`]: the inputs
//! - [`Issue`], [`Issues`]: the structured issue sink

mod id;
mod issue;
mod model;
mod params;
mod value;

pub mod expression;
pub mod period;

pub use expression::{Evaluation, Evaluator, Expression, Formula, FormulaEvaluator};
pub use id::InterfaceId;
pub use issue::{Issue, IssueKind, Issues, Severity};
pub use model::{FlowRelation, Observation, ScaleRelation};
pub use params::{Parameter, ParameterValues, Scenario};
pub use period::{Granularity, PeriodError, TimePeriod};
pub use value::{Quantity, Unit, Value};
