//! Track descriptor model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptor of one published track
///
/// Equality is structural: two descriptors are equal when every field,
/// including the opaque `config` object, compares equal value-by-value.
/// The encoder uses this to decide between add, replace and no patch at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Track name, unique within one catalog
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Delivery priority, 0..=255
    pub priority: u8,

    /// Identifier of the schema the `config` object follows
    pub schema: String,

    /// Opaque, schema-defined configuration
    pub config: Value,

    /// Names of tracks this one depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

impl TrackDescriptor {
    /// Create a descriptor with no description or dependencies
    pub fn new(
        name: impl Into<String>,
        priority: u8,
        schema: impl Into<String>,
        config: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            priority,
            schema: schema.into(),
            config,
            dependencies: None,
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the dependency list
    pub fn dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }
}
