//! Checkpoint persistence and resume
//!
//! A checkpoint marks a durability boundary: everything up to it is
//! promoted at the target, so a restarted task resumes exactly there
//! instead of re-writing or skipping data. [`RestoreEngine`] owns the
//! protocol: load once at startup (fail fast on anything unreadable),
//! commit monotonically after each rotation, clear only when the host
//! declares the whole job done.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::retry::{retry, RetryConfig};

/// Key a task's checkpoints are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// Job identifier
    pub job_id: String,
    /// Task index within the job
    pub task_index: u32,
}

impl CheckpointKey {
    /// Create a checkpoint key
    pub fn new(job_id: impl Into<String>, task_index: u32) -> Self {
        Self {
            job_id: job_id.into(),
            task_index,
        }
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.job_id, self.task_index)
    }
}

/// One committed durability boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreCheckpoint {
    /// Connector-defined position of the last promoted unit (opaque here)
    #[serde(default)]
    pub last_committed_offset: serde_json::Value,
    /// Rows durably written up to this point
    pub rows_written: u64,
    /// Index of the last completed output file
    pub file_index: u32,
    /// When the checkpoint was taken
    pub timestamp: DateTime<Utc>,
}

impl RestoreCheckpoint {
    /// Create a checkpoint taken now
    pub fn new(last_committed_offset: serde_json::Value, rows_written: u64, file_index: u32) -> Self {
        Self {
            last_committed_offset,
            rows_written,
            file_index,
            timestamp: Utc::now(),
        }
    }

    /// Whether this checkpoint makes strict progress over `prev`.
    ///
    /// Progress never regresses in either dimension and must grow in at
    /// least one; committing anything else would let a resumed run
    /// duplicate or lose data.
    pub fn advances(&self, prev: &Self) -> bool {
        if self.rows_written < prev.rows_written || self.file_index < prev.file_index {
            return false;
        }
        self.rows_written > prev.rows_written || self.file_index > prev.file_index
    }
}

/// Checkpoint persistence backend.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `key`, `None` when none exists
    async fn load(&self, key: &CheckpointKey) -> Result<Option<RestoreCheckpoint>>;

    /// Durably persist `checkpoint` under `key`
    async fn save(&self, key: &CheckpointKey, checkpoint: &RestoreCheckpoint) -> Result<()>;

    /// Remove any checkpoint stored under `key`
    async fn clear(&self, key: &CheckpointKey) -> Result<()>;
}

/// Checkpoint store backed by JSON files under a root directory.
///
/// Layout is `{root}/{job_id}/{task_index}.json`. Saves write a temporary
/// file and rename it over the final path, so a crash mid-save leaves the
/// previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.root
            .join(&key.job_id)
            .join(format!("{}.json", key.task_index))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<RestoreCheckpoint>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::restore(format!(
                    "reading checkpoint {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::restore(format!("corrupt checkpoint {}: {}", path.display(), e))
        })?;
        Ok(Some(checkpoint))
    }

    async fn save(&self, key: &CheckpointKey, checkpoint: &RestoreCheckpoint) -> Result<()> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| SyncError::storage_retryable("creating checkpoint directory", e))?;

        let payload = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|e| SyncError::storage_retryable("writing checkpoint", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SyncError::storage_retryable("publishing checkpoint", e))?;
        Ok(())
    }

    async fn clear(&self, key: &CheckpointKey) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::storage_retryable("clearing checkpoint", e)),
        }
    }
}

/// Per-task checkpoint protocol.
///
/// The resume point is fixed at [`RestoreEngine::initialize`]; commits must
/// strictly advance it. A disabled engine accepts the same calls and does
/// nothing, so callers never branch on whether restore is configured.
pub struct RestoreEngine {
    store: Option<Arc<dyn CheckpointStore>>,
    key: CheckpointKey,
    retry: RetryConfig,
    resume: Option<RestoreCheckpoint>,
    last: Option<RestoreCheckpoint>,
}

impl RestoreEngine {
    /// Create an engine committing through `store`
    pub fn new(store: Arc<dyn CheckpointStore>, key: CheckpointKey) -> Self {
        Self {
            store: Some(store),
            key,
            retry: RetryConfig::default(),
            resume: None,
            last: None,
        }
    }

    /// Create a no-op engine for jobs without restore
    pub fn disabled(key: CheckpointKey) -> Self {
        Self {
            store: None,
            key,
            retry: RetryConfig::no_retry(),
            resume: None,
            last: None,
        }
    }

    /// Override the retry policy for checkpoint I/O
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Whether checkpoints are persisted
    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Load the resume point, once, before any data moves.
    ///
    /// A missing checkpoint is a cold start; an unreadable one fails the
    /// startup rather than silently re-writing from zero.
    pub async fn initialize(&mut self) -> Result<Option<RestoreCheckpoint>> {
        let Some(store) = &self.store else {
            debug!(key = %self.key, "restore disabled");
            return Ok(None);
        };
        match store.load(&self.key).await? {
            Some(checkpoint) => {
                info!(
                    key = %self.key,
                    rows_written = checkpoint.rows_written,
                    file_index = checkpoint.file_index,
                    "resuming from checkpoint"
                );
                self.resume = Some(checkpoint.clone());
                self.last = Some(checkpoint.clone());
                Ok(Some(checkpoint))
            }
            None => {
                info!(key = %self.key, "no checkpoint found, cold start");
                Ok(None)
            }
        }
    }

    /// The checkpoint this run resumed from, if any
    pub fn resume_checkpoint(&self) -> Option<&RestoreCheckpoint> {
        self.resume.as_ref()
    }

    /// Rows the previous run already delivered
    pub fn rows_already_written(&self) -> u64 {
        self.resume.as_ref().map(|c| c.rows_written).unwrap_or(0)
    }

    /// First file index this run may use.
    ///
    /// One past the resume point's file, so completed files are never
    /// reopened or overwritten.
    pub fn start_file_index(&self) -> u32 {
        self.resume.as_ref().map(|c| c.file_index + 1).unwrap_or(0)
    }

    /// Last checkpoint committed by this run (or carried from resume)
    pub fn last_committed(&self) -> Option<&RestoreCheckpoint> {
        self.last.as_ref()
    }

    /// Commit a checkpoint, retrying retryable storage failures.
    ///
    /// No-op when disabled. A checkpoint that does not advance the last
    /// committed one is rejected.
    pub async fn commit(&mut self, checkpoint: RestoreCheckpoint) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(prev) = &self.last {
            if !checkpoint.advances(prev) {
                return Err(SyncError::restore(format!(
                    "checkpoint does not advance (rows {} -> {}, file {} -> {})",
                    prev.rows_written,
                    checkpoint.rows_written,
                    prev.file_index,
                    checkpoint.file_index
                )));
            }
        }

        let store = store.clone();
        let key = self.key.clone();
        let to_save = checkpoint.clone();
        retry(&self.retry, move || {
            let store = store.clone();
            let key = key.clone();
            let to_save = to_save.clone();
            async move { store.save(&key, &to_save).await }
        })
        .await?;

        debug!(
            key = %self.key,
            rows_written = checkpoint.rows_written,
            file_index = checkpoint.file_index,
            "checkpoint committed"
        );
        self.last = Some(checkpoint);
        Ok(())
    }

    /// Discard checkpoints after the whole job has succeeded.
    ///
    /// Host-driven: a single task cannot know the job outcome, so
    /// finishing a write does not clear anything by itself.
    pub async fn complete(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let store = store.clone();
        let key = self.key.clone();
        retry(&self.retry, move || {
            let store = store.clone();
            let key = key.clone();
            async move { store.clear(&key).await }
        })
        .await?;
        info!(key = %self.key, "checkpoint cleared");
        Ok(())
    }
}
