//! Data source trait
//!
//! A [`DataSource`] turns configuration into a stream of rows. Row-shaped
//! problems travel inside the stream as `Err` items so the driving writer
//! can route them to the dirty channel; anything that fails the whole read
//! surfaces from [`DataSource::read`] itself.

use async_trait::async_trait;
use futures::stream::BoxStream;
use penstock_rdbc::types::Row;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::fmt;
use validator::Validate;

use super::spec::ConnectorSpec;
use super::TaskContext;
use crate::error::Result;
use crate::restore::RestoreCheckpoint;

/// Trait for source connector configuration
pub trait SourceConfig: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

// Blanket implementation
impl<T> SourceConfig for T where T: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

/// Stream of rows produced by a source.
///
/// `Err` items are per-record failures; the stream stays usable after one.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Result of a connection check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Check if successful
    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "connection check passed")
        } else {
            write!(f, "connection check failed")?;
            if let Some(ref msg) = self.message {
                write!(f, ": {}", msg)?;
            }
            Ok(())
        }
    }
}

/// Trait for source connectors
///
/// # Example
///
/// ```rust,ignore
/// use penstock_connect::prelude::*;
///
/// #[derive(Debug, Deserialize, Validate, JsonSchema)]
/// pub struct MySourceConfig {
///     #[validate(length(min = 1))]
///     pub path: String,
/// }
///
/// pub struct MySource;
///
/// #[async_trait]
/// impl DataSource for MySource {
///     type Config = MySourceConfig;
///
///     fn spec() -> ConnectorSpec {
///         ConnectorSpec::new("my-source", "0.1.0")
///     }
///
///     async fn read(
///         &self,
///         config: &Self::Config,
///         ctx: &TaskContext,
///         resume: Option<RestoreCheckpoint>,
///     ) -> Result<RowStream> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Configuration type for this source
    type Config: SourceConfig;

    /// Return the connector specification
    fn spec() -> ConnectorSpec
    where
        Self: Sized;

    /// Check connectivity and configuration without moving data
    async fn check(&self, config: &Self::Config) -> Result<CheckResult> {
        let _ = config;
        Ok(CheckResult::success())
    }

    /// Open a row stream for this task's share of the data.
    ///
    /// When `resume` is given the source must skip everything the previous
    /// run already delivered, so a restarted job continues instead of
    /// duplicating.
    async fn read(
        &self,
        config: &Self::Config,
        ctx: &TaskContext,
        resume: Option<RestoreCheckpoint>,
    ) -> Result<RowStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result() {
        let ok = CheckResult::success();
        assert!(ok.is_success());
        assert_eq!(ok.to_string(), "connection check passed");

        let bad = CheckResult::failure("target directory missing");
        assert!(!bad.is_success());
        assert_eq!(
            bad.to_string(),
            "connection check failed: target directory missing"
        );
    }
}
