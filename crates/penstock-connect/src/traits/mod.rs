//! Core connector traits and runtime dispatch
//!
//! [`DataSource`] and [`DataWriter`] are the typed connector surface;
//! [`registry`] adds the type-erased layer that drives connectors from raw
//! YAML. [`TaskContext`] identifies one parallel task of a job and is
//! threaded through every read and write call.

pub mod registry;
pub mod sink;
pub mod source;
pub mod spec;

pub use registry::{
    parse_config, AnyDataSource, AnyDataWriter, SinkFactory, SinkRegistry, SourceFactory,
    SourceRegistry,
};
pub use sink::{DataWriter, SinkConfig, WriteResult};
pub use source::{CheckResult, DataSource, RowStream, SourceConfig};
pub use spec::ConnectorSpec;

use crate::restore::CheckpointKey;

/// Identity of one parallel task within a sync job.
///
/// Output file names and checkpoint keys both derive from it, so two tasks
/// of the same job never collide on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    /// Job identifier, shared by all tasks of a run
    pub job_id: String,
    /// This task's index, zero-based
    pub task_index: u32,
    /// Total number of parallel tasks
    pub parallelism: u32,
}

impl TaskContext {
    /// Create a context for task `task_index` of `parallelism`
    pub fn new(job_id: impl Into<String>, task_index: u32, parallelism: u32) -> Self {
        Self {
            job_id: job_id.into(),
            task_index,
            parallelism,
        }
    }

    /// Context for a single-task job
    pub fn single(job_id: impl Into<String>) -> Self {
        Self::new(job_id, 0, 1)
    }

    /// Key this task's checkpoints are stored under
    pub fn checkpoint_key(&self) -> CheckpointKey {
        CheckpointKey::new(self.job_id.clone(), self.task_index)
    }

    /// Prefix of every file this task owns at the target
    pub fn file_prefix(&self) -> String {
        format!("{}-{}", self.job_id, self.task_index)
    }
}
