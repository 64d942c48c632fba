//! Endpoint descriptions as delivered by discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An immutable description of a remotely discovered endpoint.
///
/// Carries a stable endpoint id plus an opaque property bag. Equality and
/// hashing are by id only: two descriptions with the same id refer to the
/// same remote endpoint, and that identity is what import dedup and pruning
/// key on. Properties are never interpreted by this crate; they exist for
/// transport backends.
#[derive(Debug, Clone)]
pub struct EndpointDescription {
    id: String,
    properties: BTreeMap<String, String>,
}

impl EndpointDescription {
    /// Create a description with the given stable endpoint id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Attach a property, builder style.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The stable endpoint id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up a single property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The full property bag.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl PartialEq for EndpointDescription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EndpointDescription {}

impl Hash for EndpointDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EndpointDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id() {
        let a = EndpointDescription::new("tcp://host-a:9000");
        let b = EndpointDescription::new("tcp://host-a:9000").with_property("zone", "eu-1");
        let c = EndpointDescription::new("tcp://host-b:9000");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn properties_are_readable() {
        let ep = EndpointDescription::new("tcp://host:1")
            .with_property("proto", "tcp")
            .with_property("zone", "eu-1");

        assert_eq!(ep.property("proto"), Some("tcp"));
        assert_eq!(ep.property("missing"), None);
        assert_eq!(ep.properties().len(), 2);
    }
}
