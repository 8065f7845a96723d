//! Bundled connectors
//!
//! Connectors live here as self-contained modules; the registry helpers
//! below wire every bundled one under its identifier so a host can drive
//! them from raw YAML alone.

pub mod file;

use std::sync::Arc;

use crate::traits::{SinkRegistry, SourceRegistry};

/// Create a source registry with every bundled source registered
pub fn builtin_source_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(
        file::FILE_CONNECTOR_IDENTIFIER,
        Arc::new(file::FileSourceFactory),
    );
    registry
}

/// Create a sink registry with every bundled sink registered
pub fn builtin_sink_registry() -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    registry.register(
        file::FILE_CONNECTOR_IDENTIFIER,
        Arc::new(file::FileSinkFactory),
    );
    registry
}
