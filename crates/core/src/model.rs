use serde::{Deserialize, Serialize};

use crate::{Expression, InterfaceId, TimePeriod, Unit};

/// A quantitative observation of an interface for one time period.
///
/// An observation with `relative_to` set expresses the interface's value as
/// a multiple of another interface rather than as an absolute quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub interface: InterfaceId,
    pub value: Expression,
    #[serde(default)]
    pub unit: Option<Unit>,
    pub period: TimePeriod,
    /// Scenario the observation applies to; `None` means every scenario.
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub observer: Option<String>,
    #[serde(default)]
    pub relative_to: Option<InterfaceId>,
}

impl Observation {
    /// Creates a global, absolute observation.
    #[must_use]
    pub fn new(interface: impl Into<InterfaceId>, value: Expression, period: TimePeriod) -> Self {
        Self {
            interface: interface.into(),
            value,
            unit: None,
            period,
            scenario: None,
            observer: None,
            relative_to: None,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    #[must_use]
    pub fn for_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    #[must_use]
    pub fn by_observer(mut self, observer: impl Into<String>) -> Self {
        self.observer = Some(observer.into());
        self
    }

    #[must_use]
    pub fn relative_to(mut self, reference: impl Into<InterfaceId>) -> Self {
        self.relative_to = Some(reference.into());
        self
    }

    #[must_use]
    pub fn is_relative(&self) -> bool {
        self.relative_to.is_some()
    }

    /// Returns `true` if the observation applies to the named scenario.
    #[must_use]
    pub fn applies_to(&self, scenario: &str) -> bool {
        self.scenario.as_deref().is_none_or(|s| s == scenario)
    }
}

/// A share of `source`'s quantity arriving at `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRelation {
    pub source: InterfaceId,
    pub destination: InterfaceId,
    #[serde(default)]
    pub weight: Option<Expression>,
    #[serde(default)]
    pub reverse_weight: Option<Expression>,
}

impl FlowRelation {
    #[must_use]
    pub fn new(
        source: impl Into<InterfaceId>,
        destination: impl Into<InterfaceId>,
        weight: Option<Expression>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            weight,
            reverse_weight: None,
        }
    }

    #[must_use]
    pub fn with_reverse_weight(mut self, reverse_weight: Expression) -> Self {
        self.reverse_weight = Some(reverse_weight);
        self
    }
}

/// `destination`'s quantity is `origin`'s quantity times `scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRelation {
    pub origin: InterfaceId,
    pub destination: InterfaceId,
    pub scale: Expression,
}

impl ScaleRelation {
    #[must_use]
    pub fn new(
        origin: impl Into<InterfaceId>,
        destination: impl Into<InterfaceId>,
        scale: Expression,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            scale,
        }
    }
}
