use serde::Deserialize;
use thiserror::Error;

/// Configuration shared by every solver component.
///
/// Deserialized configs go through [`Config::new`], so they are always valid.
/// Missing fields take their default values.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    case_sensitive: bool,
    split_tolerance: f64,
    consistency_tolerance: f64,
    max_combinations: usize,
}

/// Errors that can occur when validating a solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tolerances must be finite and non-negative")]
    Tolerance,

    #[error("max_combinations must be at least 1")]
    CombinationLimit,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            split_tolerance: 1e-9,
            consistency_tolerance: 1e-9,
            max_combinations: 1024,
        }
    }
}

impl Config {
    /// Creates a new config with validated tolerances.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, or if
    /// `max_combinations` is zero.
    pub fn new(
        case_sensitive: bool,
        split_tolerance: f64,
        consistency_tolerance: f64,
        max_combinations: usize,
    ) -> Result<Self, ConfigError> {
        for tol in [split_tolerance, consistency_tolerance] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(ConfigError::Tolerance);
            }
        }
        if max_combinations == 0 {
            return Err(ConfigError::CombinationLimit);
        }

        Ok(Self {
            case_sensitive,
            split_tolerance,
            consistency_tolerance,
            max_combinations,
        })
    }

    /// Returns `true` if parameter names are compared case-sensitively.
    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Returns the relative tolerance for outgoing weights summing to one.
    #[must_use]
    pub fn split_tolerance(&self) -> f64 {
        self.split_tolerance
    }

    /// Returns the relative tolerance under which two derivations of the same
    /// node are considered equal.
    #[must_use]
    pub fn consistency_tolerance(&self) -> f64 {
        self.consistency_tolerance
    }

    /// Returns the maximum number of combinations enumerated per unit of work.
    #[must_use]
    pub fn max_combinations(&self) -> usize {
        self.max_combinations
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawConfig {
    case_sensitive: bool,
    split_tolerance: f64,
    consistency_tolerance: f64,
    max_combinations: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            case_sensitive: config.case_sensitive,
            split_tolerance: config.split_tolerance,
            consistency_tolerance: config.consistency_tolerance,
            max_combinations: config.max_combinations,
        }
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Self::new(
            raw.case_sensitive,
            raw.split_tolerance,
            raw.consistency_tolerance,
            raw.max_combinations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(Config::new(false, -1.0, 0.0, 1), Err(ConfigError::Tolerance));
        assert_eq!(
            Config::new(false, 0.0, f64::NAN, 1),
            Err(ConfigError::Tolerance)
        );
        assert_eq!(
            Config::new(false, 0.0, 0.0, 0),
            Err(ConfigError::CombinationLimit)
        );
    }

    #[test]
    fn default_is_valid() {
        let config = Config::default();
        assert_eq!(
            Config::new(
                config.case_sensitive(),
                config.split_tolerance(),
                config.consistency_tolerance(),
                config.max_combinations(),
            ),
            Ok(config)
        );
    }
}
