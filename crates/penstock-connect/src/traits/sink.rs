//! Data writer trait
//!
//! A [`DataWriter`] consumes a row stream and lands it at a target. The
//! returned [`WriteResult`] is the job's accounting: clean rows, dirty
//! rows, bytes, completed files and the last committed checkpoint.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::source::{CheckResult, RowStream};
use super::spec::ConnectorSpec;
use super::TaskContext;
use crate::error::Result;
use crate::restore::RestoreCheckpoint;

/// Trait for sink connector configuration
pub trait SinkConfig: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

// Blanket implementation
impl<T> SinkConfig for T where T: DeserializeOwned + Validate + JsonSchema + Send + Sync {}

/// Accounting for one completed write task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Rows written to the main output
    pub rows_written: u64,
    /// Rows routed to the dirty channel
    pub rows_dirty: u64,
    /// Uncompressed payload bytes written
    pub bytes_written: u64,
    /// Output files completed (promoted out of staging)
    pub files_completed: u32,
    /// Last checkpoint committed, if restore was enabled
    pub last_checkpoint: Option<RestoreCheckpoint>,
}

impl WriteResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one clean row of `bytes` payload
    pub fn add_row(&mut self, bytes: u64) {
        self.rows_written += 1;
        self.bytes_written += bytes;
    }

    /// Account one dirty row
    pub fn add_dirty(&mut self) {
        self.rows_dirty += 1;
    }

    /// Total rows consumed from the stream
    pub fn rows_total(&self) -> u64 {
        self.rows_written + self.rows_dirty
    }

    /// Whether any rows were routed to the dirty channel
    pub fn has_dirty(&self) -> bool {
        self.rows_dirty > 0
    }
}

/// Trait for sink connectors
#[async_trait]
pub trait DataWriter: Send + Sync {
    /// Configuration type for this writer
    type Config: SinkConfig;

    /// Return the connector specification
    fn spec() -> ConnectorSpec
    where
        Self: Sized;

    /// Check connectivity and configuration without moving data
    async fn check(&self, config: &Self::Config) -> Result<CheckResult> {
        let _ = config;
        Ok(CheckResult::success())
    }

    /// Consume the row stream and land it at the target.
    ///
    /// The writer owns the full row lifecycle: encoding, dirty routing,
    /// threshold enforcement, file rotation and checkpoint commits.
    async fn write(
        &self,
        config: &Self::Config,
        ctx: &TaskContext,
        rows: RowStream,
    ) -> Result<WriteResult>;
}
