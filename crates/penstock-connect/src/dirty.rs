//! Dirty-data channel and error-ratio guard
//!
//! A row that fails conversion or encoding is not lost and does not kill
//! the job: it becomes exactly one [`DirtyRecord`] on the side channel,
//! with the raw row text and the reason. The [`ErrorRatioGuard`] watches
//! the dirty/total counters and trips once, permanently, when a configured
//! threshold is exceeded; from then on the job aborts as a data-quality
//! failure rather than grinding through garbage.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Records seen before the ratio rule is evaluated, unless configured
pub const DEFAULT_MIN_RATIO_SAMPLE: u64 = 100;

/// One rejected record on the dirty channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtyRecord {
    /// Unique record id
    pub id: Uuid,
    /// The raw row as text, unmodified
    pub row: String,
    /// Why the row was rejected
    pub reason: String,
    /// When the rejection happened
    pub timestamp: DateTime<Utc>,
    /// How many times the record had been attempted when it was rejected
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl DirtyRecord {
    /// Create a record rejected on its first attempt, now
    pub fn new(row: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            row: row.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
            attempts: 1,
        }
    }

    /// Set the attempt count for records a caller retried before rejecting
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Accounting for a finalized dirty channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyStats {
    /// Records written to the channel
    pub records: u64,
    /// Bytes written to the channel
    pub bytes: u64,
}

/// Where dirty records go.
#[async_trait]
pub trait DirtySink: Send {
    /// Accept one record
    async fn write(&mut self, record: DirtyRecord) -> Result<()>;

    /// Push buffered records to durable storage
    async fn flush(&mut self) -> Result<()>;

    /// Flush and return the channel accounting
    async fn finalize(&mut self) -> Result<DirtyStats>;
}

/// Dirty sink appending newline-delimited JSON to a file.
///
/// Records are buffered and flushed every `flush_threshold` records, so a
/// burst of dirty rows does not turn into a syscall per record.
pub struct NdjsonDirtySink {
    path: PathBuf,
    flush_threshold: usize,
    buffer: Vec<String>,
    file: Option<tokio::fs::File>,
    stats: DirtyStats,
}

impl NdjsonDirtySink {
    /// Create a sink appending to `path`
    pub fn new(path: impl Into<PathBuf>, flush_threshold: usize) -> Self {
        Self {
            path: path.into(),
            flush_threshold: flush_threshold.max(1),
            buffer: Vec::new(),
            file: None,
            stats: DirtyStats::default(),
        }
    }

    async fn open_file(&mut self) -> Result<&mut tokio::fs::File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SyncError::storage(format!("creating dirty directory {}: {}", parent.display(), e))
                })?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| {
                    SyncError::storage(format!("opening dirty file {}: {}", self.path.display(), e))
                })?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().unwrap())
    }
}

#[async_trait]
impl DirtySink for NdjsonDirtySink {
    async fn write(&mut self, record: DirtyRecord) -> Result<()> {
        let line = serde_json::to_string(&record)?;
        self.stats.records += 1;
        self.stats.bytes += line.len() as u64 + 1;
        self.buffer.push(line);
        if self.buffer.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut payload = String::with_capacity(self.buffer.iter().map(|l| l.len() + 1).sum());
        for line in self.buffer.drain(..) {
            payload.push_str(&line);
            payload.push('\n');
        }
        let path = self.path.clone();
        let file = self.open_file().await?;
        file.write_all(payload.as_bytes()).await.map_err(|e| {
            SyncError::storage(format!("appending dirty file {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<DirtyStats> {
        self.flush().await?;
        if let Some(file) = self.file.as_mut() {
            file.flush()
                .await
                .map_err(|e| SyncError::storage(format!("flushing dirty file: {}", e)))?;
        }
        Ok(self.stats)
    }
}

/// Dirty sink that only logs, used when no dirty path is configured.
///
/// Records still count toward the guard; they are just not persisted.
#[derive(Debug, Default)]
pub struct LogDirtySink {
    stats: DirtyStats,
}

impl LogDirtySink {
    /// Create a log-only sink
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirtySink for LogDirtySink {
    async fn write(&mut self, record: DirtyRecord) -> Result<()> {
        warn!(reason = %record.reason, row = %record.row, "dirty record");
        self.stats.records += 1;
        self.stats.bytes += record.row.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn finalize(&mut self) -> Result<DirtyStats> {
        Ok(self.stats)
    }
}

/// Error thresholds for a job.
///
/// `None` means unlimited: dirty records are routed and counted but never
/// abort. A zero ratio or zero absolute limit means zero tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLimits {
    /// Maximum dirty/total ratio, inclusive bound
    pub ratio: Option<f64>,
    /// Maximum dirty count, inclusive bound
    pub absolute: Option<u64>,
    /// Records seen before the ratio rule is evaluated
    pub min_ratio_sample: u64,
}

impl ErrorLimits {
    /// No thresholds; dirty records never abort the job
    pub fn unlimited() -> Self {
        Self {
            ratio: None,
            absolute: None,
            min_ratio_sample: DEFAULT_MIN_RATIO_SAMPLE,
        }
    }

    /// Create limits from the configured thresholds
    pub fn new(ratio: Option<f64>, absolute: Option<u64>) -> Self {
        Self {
            ratio,
            absolute,
            min_ratio_sample: DEFAULT_MIN_RATIO_SAMPLE,
        }
    }

    /// Set the minimum sample size for the ratio rule
    pub fn with_min_ratio_sample(mut self, sample: u64) -> Self {
        self.min_ratio_sample = sample;
        self
    }

    /// Whether no threshold is configured
    pub fn is_unlimited(&self) -> bool {
        self.ratio.is_none() && self.absolute.is_none()
    }
}

impl Default for ErrorLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// One-way circuit breaker over the dirty/total counters.
///
/// Counters only grow; once a rule trips, every later
/// [`check`](ErrorRatioGuard::check) fails with the same rule even if the
/// running ratio has since fallen below the threshold.
pub struct ErrorRatioGuard {
    limits: ErrorLimits,
    errors: AtomicU64,
    total: AtomicU64,
    tripped_rule: OnceLock<String>,
}

impl ErrorRatioGuard {
    /// Create a guard with the given limits
    pub fn new(limits: ErrorLimits) -> Self {
        Self {
            limits,
            errors: AtomicU64::new(0),
            total: AtomicU64::new(0),
            tripped_rule: OnceLock::new(),
        }
    }

    /// Count one clean record
    pub fn record_success(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dirty record
    pub fn record_failure(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Dirty records seen so far
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Total records seen so far
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Whether a rule has tripped
    pub fn is_tripped(&self) -> bool {
        self.tripped_rule.get().is_some()
    }

    /// The rule that tripped, if any
    pub fn tripped_rule(&self) -> Option<&str> {
        self.tripped_rule.get().map(String::as_str)
    }

    /// Evaluate the limits against the current counters.
    ///
    /// The absolute rule applies from the first record. The ratio rule
    /// waits for `min_ratio_sample` records so a dirty record in a tiny
    /// prefix cannot abort a long job, except that a zero ratio (zero
    /// tolerance) ignores the sample gate.
    pub fn check(&self) -> Result<()> {
        let errors = self.errors();
        let total = self.total();

        if let Some(rule) = self.tripped_rule.get() {
            return Err(SyncError::threshold(rule.clone(), errors, total));
        }
        if errors == 0 {
            return Ok(());
        }

        if let Some(max) = self.limits.absolute {
            if errors > max {
                return self.trip(format!("error_absolute_threshold {}", max), errors, total);
            }
        }
        if let Some(max_ratio) = self.limits.ratio {
            if max_ratio == 0.0 {
                return self.trip("error_ratio_threshold 0".to_string(), errors, total);
            }
            if total >= self.limits.min_ratio_sample {
                let observed = errors as f64 / total as f64;
                if observed > max_ratio {
                    return self.trip(
                        format!("error_ratio_threshold {}", max_ratio),
                        errors,
                        total,
                    );
                }
            }
        }
        Ok(())
    }

    fn trip(&self, rule: String, errors: u64, total: u64) -> Result<()> {
        // first trip wins when two tasks race
        let rule = self.tripped_rule.get_or_init(|| rule).clone();
        warn!(rule = %rule, errors, total, "error threshold tripped, aborting job");
        Err(SyncError::threshold(rule, errors, total))
    }
}

/// Routes row failures to the dirty sink and enforces the limits.
pub struct DirtyDataRouter {
    sink: Box<dyn DirtySink>,
    guard: Arc<ErrorRatioGuard>,
}

impl DirtyDataRouter {
    /// Create a router writing to `sink` under `limits`
    pub fn new(sink: Box<dyn DirtySink>, limits: ErrorLimits) -> Self {
        Self {
            sink,
            guard: Arc::new(ErrorRatioGuard::new(limits)),
        }
    }

    /// Shared handle to the guard for out-of-band checks
    pub fn guard(&self) -> Arc<ErrorRatioGuard> {
        self.guard.clone()
    }

    /// Count one clean record
    pub fn record_success(&self) {
        self.guard.record_success();
    }

    /// Route one failed row: exactly one dirty record, then re-check the
    /// limits (the record that crosses a threshold is itself preserved).
    pub async fn route(&mut self, raw_row: impl Into<String>, error: &SyncError) -> Result<()> {
        let record = DirtyRecord::new(raw_row, error.to_string());
        debug!(reason = %record.reason, "routing dirty record");
        self.sink.write(record).await?;
        self.guard.record_failure();
        self.guard.check()
    }

    /// Evaluate the limits without routing anything
    pub fn check(&self) -> Result<()> {
        self.guard.check()
    }

    /// Flush and close the channel
    pub async fn finalize(mut self) -> Result<DirtyStats> {
        self.sink.finalize().await
    }
}
