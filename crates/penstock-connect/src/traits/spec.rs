//! Connector specification types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connector specification describing identity and capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Unique connector identifier (e.g., "file-x")
    pub identifier: String,

    /// Semantic version
    pub version: String,

    /// Human-readable description
    pub description: Option<String>,

    /// JSON Schema for the connector's configuration
    pub config_schema: Option<serde_json::Value>,

    /// Whether the connector can resume from a checkpoint
    pub supports_restore: bool,
}

impl ConnectorSpec {
    /// Create a new connector spec
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            description: None,
            config_schema: None,
            supports_restore: false,
        }
    }

    /// Set description
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set config schema from a type implementing JsonSchema
    pub fn config_schema_from<T: JsonSchema>(mut self) -> Self {
        let schema = schemars::schema_for!(T);
        self.config_schema = Some(serde_json::to_value(schema).unwrap_or_default());
        self
    }

    /// Mark the connector as resumable from checkpoints
    pub fn supports_restore(mut self, supported: bool) -> Self {
        self.supports_restore = supported;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct DemoConfig {
        path: String,
    }

    #[test]
    fn test_spec_construction() {
        let spec = ConnectorSpec::new("file-x", "0.1.0")
            .description("local file connector")
            .supports_restore(true)
            .config_schema_from::<DemoConfig>();

        assert_eq!(spec.identifier, "file-x");
        assert!(spec.supports_restore);
        let schema = spec.config_schema.unwrap();
        assert!(schema.to_string().contains("path"));
    }
}
