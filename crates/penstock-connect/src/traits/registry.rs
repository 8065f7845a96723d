//! Connector registries for runtime dispatch
//!
//! Hosts drive connectors from raw YAML without knowing their concrete
//! types: a [`SourceFactory`]/[`SinkFactory`] is registered under the
//! connector identifier, creates type-erased [`AnyDataSource`] /
//! [`AnyDataWriter`] instances, and the `impl_any_source!` /
//! `impl_any_sink!` macros bridge a typed connector into that layer by
//! parsing and validating its config first.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::sink::WriteResult;
use super::source::{CheckResult, RowStream};
use super::spec::ConnectorSpec;
use super::TaskContext;
use crate::error::{Result, SyncError};
use crate::restore::RestoreCheckpoint;

/// Deserialize and validate a typed connector config from raw YAML.
///
/// Both failure modes surface as configuration errors, so an ill-formed
/// job fails before the connector runs.
pub fn parse_config<C>(raw: &serde_yaml::Value) -> Result<C>
where
    C: DeserializeOwned + Validate,
{
    let config: C =
        serde_yaml::from_value(raw.clone()).map_err(|e| SyncError::config(e.to_string()))?;
    config
        .validate()
        .map_err(|e| SyncError::config(e.to_string()))?;
    Ok(config)
}

/// Factory trait for creating source instances
pub trait SourceFactory: Send + Sync {
    /// Get the connector specification
    fn spec(&self) -> ConnectorSpec;

    /// Create a boxed source instance for runtime dispatch
    fn create(&self) -> Result<Box<dyn AnyDataSource>>;
}

/// Type-erased source for runtime dispatch
#[async_trait]
pub trait AnyDataSource: Send + Sync {
    /// Check connectivity with raw YAML config
    async fn check_raw(&self, config: &serde_yaml::Value) -> Result<CheckResult>;

    /// Open a row stream with raw YAML config
    async fn read_raw(
        &self,
        config: &serde_yaml::Value,
        ctx: &TaskContext,
        resume: Option<RestoreCheckpoint>,
    ) -> Result<RowStream>;
}

/// Factory trait for creating writer instances
pub trait SinkFactory: Send + Sync {
    /// Get the connector specification
    fn spec(&self) -> ConnectorSpec;

    /// Create a boxed writer instance for runtime dispatch
    fn create(&self) -> Result<Box<dyn AnyDataWriter>>;
}

/// Type-erased writer for runtime dispatch
#[async_trait]
pub trait AnyDataWriter: Send + Sync {
    /// Check connectivity with raw YAML config
    async fn check_raw(&self, config: &serde_yaml::Value) -> Result<CheckResult>;

    /// Consume a row stream with raw YAML config
    async fn write_raw(
        &self,
        config: &serde_yaml::Value,
        ctx: &TaskContext,
        rows: RowStream,
    ) -> Result<WriteResult>;
}

impl std::fmt::Debug for dyn AnyDataWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDataWriter").finish_non_exhaustive()
    }
}

/// Registry of available source connectors
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn SourceFactory>>,
}

impl SourceRegistry {
    /// Create an empty source registry
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register a source factory under its identifier
    pub fn register(&mut self, identifier: &str, factory: Arc<dyn SourceFactory>) {
        self.sources.insert(identifier.to_string(), factory);
    }

    /// Get a source factory by identifier
    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn SourceFactory>> {
        self.sources.get(identifier)
    }

    /// Create a source instance, failing with the known identifiers listed
    pub fn create(&self, identifier: &str) -> Result<Box<dyn AnyDataSource>> {
        match self.sources.get(identifier) {
            Some(factory) => factory.create(),
            None => Err(SyncError::config(format!(
                "unknown source `{}` (registered: {})",
                identifier,
                self.identifiers().join(", ")
            ))),
        }
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// List registered sources with their specs
    pub fn list(&self) -> Vec<(&str, ConnectorSpec)> {
        self.sources
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.spec()))
            .collect()
    }

    /// Check if a source is registered
    pub fn contains(&self, identifier: &str) -> bool {
        self.sources.contains_key(identifier)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of available sink connectors
pub struct SinkRegistry {
    sinks: HashMap<String, Arc<dyn SinkFactory>>,
}

impl SinkRegistry {
    /// Create an empty sink registry
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
        }
    }

    /// Register a sink factory under its identifier
    pub fn register(&mut self, identifier: &str, factory: Arc<dyn SinkFactory>) {
        self.sinks.insert(identifier.to_string(), factory);
    }

    /// Get a sink factory by identifier
    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn SinkFactory>> {
        self.sinks.get(identifier)
    }

    /// Create a writer instance, failing with the known identifiers listed
    pub fn create(&self, identifier: &str) -> Result<Box<dyn AnyDataWriter>> {
        match self.sinks.get(identifier) {
            Some(factory) => factory.create(),
            None => Err(SyncError::config(format!(
                "unknown sink `{}` (registered: {})",
                identifier,
                self.identifiers().join(", ")
            ))),
        }
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sinks.keys().cloned().collect();
        names.sort();
        names
    }

    /// List registered sinks with their specs
    pub fn list(&self) -> Vec<(&str, ConnectorSpec)> {
        self.sinks
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.spec()))
            .collect()
    }

    /// Check if a sink is registered
    pub fn contains(&self, identifier: &str) -> bool {
        self.sinks.contains_key(identifier)
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper macro to implement AnyDataSource for a typed DataSource
///
/// This reduces boilerplate when implementing adapters.
#[macro_export]
macro_rules! impl_any_source {
    ($source_type:ty, $config_type:ty) => {
        #[async_trait::async_trait]
        impl $crate::AnyDataSource for $source_type {
            async fn check_raw(
                &self,
                config: &serde_yaml::Value,
            ) -> $crate::error::Result<$crate::CheckResult> {
                let typed_config: $config_type = $crate::traits::registry::parse_config(config)?;
                <Self as $crate::DataSource>::check(self, &typed_config).await
            }

            async fn read_raw(
                &self,
                config: &serde_yaml::Value,
                ctx: &$crate::TaskContext,
                resume: Option<$crate::restore::RestoreCheckpoint>,
            ) -> $crate::error::Result<$crate::RowStream> {
                let typed_config: $config_type = $crate::traits::registry::parse_config(config)?;
                <Self as $crate::DataSource>::read(self, &typed_config, ctx, resume).await
            }
        }
    };
}

/// Helper macro to implement AnyDataWriter for a typed DataWriter
///
/// This reduces boilerplate when implementing adapters.
#[macro_export]
macro_rules! impl_any_sink {
    ($sink_type:ty, $config_type:ty) => {
        #[async_trait::async_trait]
        impl $crate::AnyDataWriter for $sink_type {
            async fn check_raw(
                &self,
                config: &serde_yaml::Value,
            ) -> $crate::error::Result<$crate::CheckResult> {
                let typed_config: $config_type = $crate::traits::registry::parse_config(config)?;
                <Self as $crate::DataWriter>::check(self, &typed_config).await
            }

            async fn write_raw(
                &self,
                config: &serde_yaml::Value,
                ctx: &$crate::TaskContext,
                rows: $crate::RowStream,
            ) -> $crate::error::Result<$crate::WriteResult> {
                let typed_config: $config_type = $crate::traits::registry::parse_config(config)?;
                <Self as $crate::DataWriter>::write(self, &typed_config, ctx, rows).await
            }
        }
    };
}
