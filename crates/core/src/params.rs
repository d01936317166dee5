use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Expression, Value};

/// A declared parameter with an optional default expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub default: Option<Expression>,
    #[serde(default)]
    pub group: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, default: Option<Expression>) -> Self {
        Self {
            name: name.into(),
            default,
            group: None,
        }
    }
}

/// A named set of parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub overrides: BTreeMap<String, Expression>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Adds an override, replacing any previous one for the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.overrides.insert(name.into(), expression);
        self
    }
}

/// Resolved parameter constants for one scenario.
///
/// When the context is case-insensitive, names are stored and looked up in
/// lowercase. Case sensitivity only affects names, never values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValues {
    case_sensitive: bool,
    values: BTreeMap<String, Value>,
}

impl ParameterValues {
    /// Creates an empty context.
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            values: BTreeMap::new(),
        }
    }

    /// Returns `true` if names are compared case-sensitively.
    #[must_use]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Returns the name as it is stored in this context.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowquant_core::ParameterValues;
    ///
    /// assert_eq!(ParameterValues::new(false).normalize("Price"), "price");
    /// assert_eq!(ParameterValues::new(true).normalize("Price"), "Price");
    /// ```
    #[must_use]
    pub fn normalize(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Sets a constant, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: Value) {
        let key = self.normalize(name);
        self.values.insert(key, value);
    }

    /// Returns the constant for `name`, if resolved.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        if self.case_sensitive {
            self.values.get(name)
        } else {
            self.values.get(&name.to_lowercase())
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup() {
        let mut values = ParameterValues::new(false);
        values.insert("Yield", Value::Number(2.0));

        assert_eq!(values.get("yield"), Some(&Value::Number(2.0)));
        assert_eq!(values.get("YIELD"), Some(&Value::Number(2.0)));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn case_sensitive_lookup() {
        let mut values = ParameterValues::new(true);
        values.insert("Yield", Value::Number(2.0));

        assert!(values.contains("Yield"));
        assert!(!values.contains("yield"));
    }
}
