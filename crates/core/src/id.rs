use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Opaque handle for an interface attached to a processor.
///
/// The handle is the hierarchical processor name and the interface name joined
/// by a colon (e.g. `"Farm.Field:Water"`). Graphs store these handles only;
/// any other attribute of the interface is looked up by the caller.
///
/// Cloning is cheap because the name is reference counted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct InterfaceId(Arc<str>);

impl InterfaceId {
    /// Creates a handle from a processor name and an interface name.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowquant_core::InterfaceId;
    ///
    /// let id = InterfaceId::new("Farm.Field", "Water");
    /// assert_eq!(id.as_str(), "Farm.Field:Water");
    /// assert_eq!(id.processor(), Some("Farm.Field"));
    /// assert_eq!(id.interface(), "Water");
    /// ```
    #[must_use]
    pub fn new(processor: &str, interface: &str) -> Self {
        Self(Arc::from(format!("{processor}:{interface}")))
    }

    /// Returns the full handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the processor part, if the handle has one.
    #[must_use]
    pub fn processor(&self) -> Option<&str> {
        self.0.rsplit_once(':').map(|(processor, _)| processor)
    }

    /// Returns the interface part of the handle.
    #[must_use]
    pub fn interface(&self) -> &str {
        self.0.rsplit_once(':').map_or(&self.0, |(_, interface)| interface)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for InterfaceId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<InterfaceId> for String {
    fn from(value: InterfaceId) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for InterfaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_without_processor() {
        let id = InterfaceId::from("Water");
        assert_eq!(id.processor(), None);
        assert_eq!(id.interface(), "Water");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = InterfaceId::new("Farm", "Water");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"Farm:Water\"");

        let back: InterfaceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
