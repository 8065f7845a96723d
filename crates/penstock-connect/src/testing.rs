//! Testing utilities for connectors
//!
//! In-memory doubles for every seam a connector touches: a source serving
//! a fixed row set, a sink collecting what was written, a dirty sink
//! capturing routed records and a checkpoint store that fails on demand.
//! Nothing here touches the filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use penstock_connect::testing::*;
//!
//! #[tokio::test]
//! async fn test_pipeline() {
//!     let source = MemorySource::new(rows).with_row_error(1, "bad cell");
//!     let sink = CollectingSink::new();
//!     let written = sink.handle();
//!
//!     let stream = source.read(&MemorySourceConfig::default(), &ctx, None).await?;
//!     let result = sink.write(&CollectingSinkConfig::default(), &ctx, stream).await?;
//!     assert_eq!(written.lock().len() as u64, result.rows_written);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use penstock_rdbc::types::Row;
use schemars::JsonSchema;
use serde::Deserialize;
use validator::Validate;

use crate::dirty::{DirtyRecord, DirtySink, DirtyStats};
use crate::error::{Result, SyncError};
use crate::restore::{CheckpointKey, CheckpointStore, RestoreCheckpoint};
use crate::traits::{
    CheckResult, ConnectorSpec, DataSource, DataWriter, RowStream, TaskContext, WriteResult,
};

/// Configuration for [`MemorySource`]
#[derive(Debug, Clone, Default, Deserialize, Validate, JsonSchema)]
pub struct MemorySourceConfig {
    /// Optional label for logs
    pub name: Option<String>,
}

/// Source serving a fixed row set from memory.
///
/// Reading is idempotent: every call to `read` replays the same rows, and
/// a resume checkpoint skips the rows already delivered, so restart
/// behavior can be tested without files.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<Row>,
    row_errors: HashMap<u64, String>,
    check_failure: Option<String>,
}

impl MemorySource {
    /// Create a source serving `rows`
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            row_errors: HashMap::new(),
            check_failure: None,
        }
    }

    /// Emit a row error instead of the row at `index`
    pub fn with_row_error(mut self, index: u64, message: impl Into<String>) -> Self {
        self.row_errors.insert(index, message.into());
        self
    }

    /// Make `check` report a failure
    pub fn with_failing_check(mut self, message: impl Into<String>) -> Self {
        self.check_failure = Some(message.into());
        self
    }
}

#[async_trait]
impl DataSource for MemorySource {
    type Config = MemorySourceConfig;

    fn spec() -> ConnectorSpec {
        ConnectorSpec::new("memory", env!("CARGO_PKG_VERSION"))
            .description("In-memory source for tests")
            .supports_restore(true)
    }

    async fn check(&self, _config: &Self::Config) -> Result<CheckResult> {
        match &self.check_failure {
            Some(message) => Ok(CheckResult::failure(message.clone())),
            None => Ok(CheckResult::success()),
        }
    }

    async fn read(
        &self,
        _config: &Self::Config,
        _ctx: &TaskContext,
        resume: Option<RestoreCheckpoint>,
    ) -> Result<RowStream> {
        let skip = resume.map(|c| c.rows_written).unwrap_or(0);
        let mut items: Vec<Result<Row>> = Vec::new();
        let mut clean_seen = 0u64;
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(message) = self.row_errors.get(&(i as u64)) {
                // injected failures in the skipped prefix were handled by
                // the previous run and are not replayed
                if clean_seen >= skip {
                    items.push(Err(SyncError::row(message.clone())));
                }
                continue;
            }
            clean_seen += 1;
            if clean_seen > skip {
                items.push(Ok(row.clone()));
            }
        }
        Ok(stream::iter(items).boxed())
    }
}

/// Configuration for [`CollectingSink`]
#[derive(Debug, Clone, Default, Deserialize, Validate, JsonSchema)]
pub struct CollectingSinkConfig {
    /// Optional label for logs
    pub name: Option<String>,
}

/// Sink collecting written rows in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    rows: Arc<Mutex<Vec<Row>>>,
}

impl CollectingSink {
    /// Create an empty collecting sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected rows
    pub fn handle(&self) -> Arc<Mutex<Vec<Row>>> {
        self.rows.clone()
    }
}

#[async_trait]
impl DataWriter for CollectingSink {
    type Config = CollectingSinkConfig;

    fn spec() -> ConnectorSpec {
        ConnectorSpec::new("collect", env!("CARGO_PKG_VERSION"))
            .description("In-memory sink for tests")
    }

    async fn write(
        &self,
        _config: &Self::Config,
        _ctx: &TaskContext,
        mut rows: RowStream,
    ) -> Result<WriteResult> {
        let mut result = WriteResult::new();
        while let Some(item) = rows.next().await {
            match item {
                Ok(row) => {
                    result.add_row(row.to_string().len() as u64);
                    self.rows.lock().push(row);
                }
                Err(e) if e.is_row() => result.add_dirty(),
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }
}

/// Dirty sink capturing routed records in memory.
#[derive(Debug, Default)]
pub struct VecDirtySink {
    records: Arc<Mutex<Vec<DirtyRecord>>>,
}

impl VecDirtySink {
    /// Create an empty capturing sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the captured records
    pub fn handle(&self) -> Arc<Mutex<Vec<DirtyRecord>>> {
        self.records.clone()
    }
}

#[async_trait]
impl DirtySink for VecDirtySink {
    async fn write(&mut self, record: DirtyRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn finalize(&mut self) -> Result<DirtyStats> {
        let records = self.records.lock();
        Ok(DirtyStats {
            records: records.len() as u64,
            bytes: records.iter().map(|r| r.row.len() as u64).sum(),
        })
    }
}

/// Checkpoint store that fails a configured number of times.
///
/// Save failures are retryable storage errors, load failures are restore
/// errors, matching what a real backend would surface.
#[derive(Debug, Default)]
pub struct FlakyCheckpointStore {
    checkpoints: Mutex<HashMap<CheckpointKey, RestoreCheckpoint>>,
    save_failures_left: AtomicU32,
    load_failures_left: AtomicU32,
    save_attempts: AtomicU32,
}

impl FlakyCheckpointStore {
    /// Create a store that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` saves with a retryable storage error
    pub fn fail_next_saves(&self, n: u32) {
        self.save_failures_left.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` loads with a restore error
    pub fn fail_next_loads(&self, n: u32) {
        self.load_failures_left.store(n, Ordering::SeqCst);
    }

    /// Save attempts seen, including failed ones
    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }

    /// Checkpoint currently stored for `key`
    pub fn stored(&self, key: &CheckpointKey) -> Option<RestoreCheckpoint> {
        self.checkpoints.lock().get(key).cloned()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CheckpointStore for FlakyCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<RestoreCheckpoint>> {
        if take_one(&self.load_failures_left) {
            return Err(SyncError::restore("injected load failure"));
        }
        Ok(self.checkpoints.lock().get(key).cloned())
    }

    async fn save(&self, key: &CheckpointKey, checkpoint: &RestoreCheckpoint) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.save_failures_left) {
            return Err(SyncError::storage_retryable(
                "injected save failure",
                std::io::Error::new(std::io::ErrorKind::Other, "flaky store"),
            ));
        }
        self.checkpoints
            .lock()
            .insert(key.clone(), checkpoint.clone());
        Ok(())
    }

    async fn clear(&self, key: &CheckpointKey) -> Result<()> {
        self.checkpoints.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penstock_rdbc::types::Value;

    use crate::restore::RestoreEngine;
    use crate::retry::RetryConfig;

    fn rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec![Value::from(i), Value::from(format!("r{}", i))]))
            .collect()
    }

    #[tokio::test]
    async fn test_memory_source_replays_and_resumes() {
        let source = MemorySource::new(rows(5)).with_row_error(2, "bad cell");
        let ctx = TaskContext::single("job-t");
        let config = MemorySourceConfig::default();

        let all: Vec<_> = source
            .read(&config, &ctx, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(all.len(), 5);
        assert!(all[2].is_err());

        // resume past two delivered rows: the injected error sat inside the
        // prefix and is not replayed
        let resume = RestoreCheckpoint::new(serde_json::Value::Null, 2, 0);
        let tail: Vec<_> = source
            .read(&config, &ctx, Some(resume))
            .await
            .unwrap()
            .collect()
            .await;
        let ids: Vec<i64> = tail
            .iter()
            .map(|r| r.as_ref().unwrap().get(0).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_collecting_sink_accounts_rows() {
        let source = MemorySource::new(rows(3)).with_row_error(1, "nope");
        let sink = CollectingSink::new();
        let written = sink.handle();
        let ctx = TaskContext::single("job-t");

        let stream = source
            .read(&MemorySourceConfig::default(), &ctx, None)
            .await
            .unwrap();
        let result = sink
            .write(&CollectingSinkConfig::default(), &ctx, stream)
            .await
            .unwrap();

        assert_eq!(result.rows_written, 3);
        assert_eq!(result.rows_dirty, 1);
        assert_eq!(written.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_flaky_store_fails_then_recovers() {
        let store = Arc::new(FlakyCheckpointStore::new());
        store.fail_next_saves(2);
        let key = CheckpointKey::new("job-t", 0);

        let mut engine = RestoreEngine::new(store.clone(), key.clone())
            .with_retry(RetryConfig::fixed_delay(3, std::time::Duration::from_millis(1)));
        engine.initialize().await.unwrap();
        engine
            .commit(RestoreCheckpoint::new(serde_json::Value::Null, 10, 0))
            .await
            .unwrap();

        assert_eq!(store.save_attempts(), 3);
        assert_eq!(store.stored(&key).unwrap().rows_written, 10);
    }

    #[tokio::test]
    async fn test_flaky_store_load_failure_is_fatal() {
        let store = Arc::new(FlakyCheckpointStore::new());
        store.fail_next_loads(1);

        let mut engine = RestoreEngine::new(store, CheckpointKey::new("job-t", 0));
        let err = engine.initialize().await.unwrap_err();
        assert!(matches!(err, SyncError::Restore(_)));
    }

    #[tokio::test]
    async fn test_vec_dirty_sink_captures() {
        let mut sink = VecDirtySink::new();
        let handle = sink.handle();
        sink.write(DirtyRecord::new("1,x", "bad int")).await.unwrap();
        let stats = sink.finalize().await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(handle.lock()[0].reason, "bad int");
    }
}
