//! Rolling file writer
//!
//! Rows are encoded into a staging file under `.data/` and the file is
//! renamed into the target directory once it reaches the configured size,
//! so readers of the target never see a partial file. Every promotion
//! commits a checkpoint; a resumed task starts one file index past the
//! last committed one and the stale staging file from the crashed attempt
//! is discarded at open.

use std::path::{Path, PathBuf};

use penstock_rdbc::schema::StoreFormat;
use penstock_rdbc::types::Row;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::WriteMode;
use crate::dirty::{DirtyDataRouter, DirtyStats};
use crate::error::{Result, SyncError};
use crate::format::builder::OutputFormat;
use crate::format::codec::DelimitedCodec;
use crate::format::compression::OutputCompression;
use crate::restore::{RestoreCheckpoint, RestoreEngine};
use crate::retry::{retry, RetryConfig};
use crate::traits::{TaskContext, WriteResult};

/// Subdirectory files are staged in before promotion
pub const STAGING_SUBDIR: &str = ".data";

/// Encoded bytes buffered before a write to the staging file
const FLUSH_CHUNK_BYTES: usize = 64 * 1024;

/// Writer that rolls output into size-bounded, atomically promoted files.
pub struct RollingWriter {
    target_dir: PathBuf,
    staging_dir: PathBuf,
    codec: DelimitedCodec,
    compress: OutputCompression,
    store_format: StoreFormat,
    max_file_size: u64,
    max_file_rows: Option<u64>,
    retry: RetryConfig,
    engine: RestoreEngine,
    router: DirtyDataRouter,
    prefix: String,
    file_index: u32,
    file: Option<tokio::fs::File>,
    staging_path: Option<PathBuf>,
    pending: String,
    bytes_in_file: u64,
    rows_in_file: u64,
    /// Rows delivered across all runs of this task, including resume
    total_rows: u64,
    result: WriteResult,
}

impl RollingWriter {
    /// Open a writer for one task against an assembled format.
    ///
    /// Loads the resume point, discards stale staging files left by a
    /// crashed attempt, and under overwrite mode removes this task's
    /// previous output. Files owned by other tasks are never touched.
    pub async fn open(format: OutputFormat, ctx: &TaskContext) -> Result<Self> {
        let OutputFormat {
            target_dir,
            codec,
            write_mode,
            store_format,
            compress,
            max_file_size,
            max_file_rows,
            restore,
            router,
        } = format;

        let mut engine =
            restore.unwrap_or_else(|| RestoreEngine::disabled(ctx.checkpoint_key()));
        engine.initialize().await?;

        let staging_dir = target_dir.join(STAGING_SUBDIR);
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| SyncError::storage_retryable("creating staging directory", e))?;

        let prefix = ctx.file_prefix();
        let own = format!("{}-", prefix);
        discard_stale_staging(&staging_dir, &own).await?;
        if write_mode == WriteMode::Overwrite {
            clear_previous_output(&target_dir, &own).await?;
        }

        Ok(Self {
            target_dir,
            staging_dir,
            codec,
            compress,
            store_format,
            max_file_size,
            max_file_rows,
            retry: RetryConfig::default(),
            file_index: engine.start_file_index(),
            total_rows: engine.rows_already_written(),
            engine,
            router,
            prefix,
            file: None,
            staging_path: None,
            pending: String::new(),
            bytes_in_file: 0,
            rows_in_file: 0,
            result: WriteResult::new(),
        })
    }

    /// The checkpoint this task resumed from, if any
    pub fn resume_checkpoint(&self) -> Option<&RestoreCheckpoint> {
        self.engine.resume_checkpoint()
    }

    /// Write one row.
    ///
    /// A row failure becomes exactly one dirty record and the write goes
    /// on; the error returned here is fatal (storage, checkpoint, or the
    /// dirty guard tripping).
    pub async fn write_row(&mut self, row: &Row) -> Result<()> {
        let line = match self.codec.encode(row) {
            Ok(line) => line,
            Err(e) if e.is_row() => {
                self.result.add_dirty();
                return self.router.route(row.to_string(), &e).await;
            }
            Err(e) => return Err(e),
        };

        self.open_file().await?;
        let encoded = line.len() as u64 + 1;
        self.pending.push_str(&line);
        self.pending.push('\n');
        self.bytes_in_file += encoded;
        self.rows_in_file += 1;
        self.total_rows += 1;
        self.result.add_row(encoded);
        self.router.record_success();

        if self.pending.len() >= FLUSH_CHUNK_BYTES {
            self.flush_pending().await?;
        }
        if self.should_rotate() {
            self.rotate().await?;
        }
        Ok(())
    }

    /// Route a failure that arrived instead of a row.
    ///
    /// Sources surface per-record failures as `Err` items on the stream;
    /// each one becomes a dirty record and counts toward the thresholds
    /// the same way an encode failure does. An error returned here is the
    /// guard tripping.
    pub async fn route_failure(&mut self, raw_row: String, error: &SyncError) -> Result<()> {
        self.result.add_dirty();
        self.router.route(raw_row, error).await
    }

    /// Close the tail file, flush the dirty channel and return the
    /// accounting. Checkpoints are left in place; clearing them is the
    /// host's call once the whole job has succeeded.
    pub async fn finalize(mut self) -> Result<WriteResult> {
        self.router.check()?;
        self.rotate().await?;
        let stats = self.router.finalize().await?;
        info!(
            rows = self.result.rows_written,
            dirty = stats.records,
            files = self.result.files_completed,
            "write finished"
        );
        Ok(self.result)
    }

    /// Flush the dirty channel after a fatal error without promoting the
    /// current staging file. Routed records survive the abort; the staging
    /// file is discarded by the next run.
    pub async fn abort(mut self) -> Result<DirtyStats> {
        let stats = self.router.finalize().await?;
        warn!(
            dirty = stats.records,
            files = self.result.files_completed,
            "write aborted, dirty channel flushed"
        );
        Ok(stats)
    }

    fn should_rotate(&self) -> bool {
        self.bytes_in_file >= self.max_file_size
            || self
                .max_file_rows
                .is_some_and(|max| self.rows_in_file >= max)
    }

    fn file_name(&self, index: u32) -> String {
        format!(
            "{}-{:05}{}{}",
            self.prefix,
            index,
            self.store_format.extension(),
            self.compress.extension_suffix()
        )
    }

    async fn open_file(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let path = self.staging_dir.join(self.file_name(self.file_index));
        let file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| {
                SyncError::storage(format!("creating staging file {}: {}", path.display(), e))
            })?;
        debug!(file = %path.display(), "opened staging file");
        self.file = Some(file);
        self.staging_path = Some(path);
        Ok(())
    }

    async fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.pending);
        let encoded = self.compress.compress_chunk(chunk.as_bytes())?;
        let path = self.staging_path.clone();
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SyncError::state("no open staging file"))?;
        file.write_all(&encoded).await.map_err(|e| {
            SyncError::storage(format!(
                "writing staging file {}: {}",
                path.as_deref().unwrap_or(Path::new("?")).display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Promote the current staging file and commit a checkpoint.
    async fn rotate(&mut self) -> Result<()> {
        if self.rows_in_file == 0 {
            return Ok(());
        }
        self.flush_pending().await?;

        let (mut file, staging_path) = match (self.file.take(), self.staging_path.take()) {
            (Some(file), Some(path)) => (file, path),
            _ => return Ok(()),
        };
        file.flush()
            .await
            .map_err(|e| SyncError::storage(format!("flushing {}: {}", staging_path.display(), e)))?;
        file.sync_all()
            .await
            .map_err(|e| SyncError::storage(format!("syncing {}: {}", staging_path.display(), e)))?;
        drop(file);

        let final_name = self.file_name(self.file_index);
        let final_path = self.target_dir.join(&final_name);
        let from = staging_path.clone();
        let to = final_path.clone();
        retry(&self.retry, move || {
            let from = from.clone();
            let to = to.clone();
            async move {
                tokio::fs::rename(&from, &to)
                    .await
                    .map_err(|e| SyncError::storage_retryable("promoting output file", e))
            }
        })
        .await?;

        let checkpoint = RestoreCheckpoint::new(
            serde_json::json!({ "file": final_name }),
            self.total_rows,
            self.file_index,
        );
        self.engine.commit(checkpoint.clone()).await?;

        info!(
            file = %final_path.display(),
            rows = self.rows_in_file,
            bytes = self.bytes_in_file,
            "completed output file"
        );
        self.result.files_completed += 1;
        self.result.last_checkpoint = Some(checkpoint);
        self.file_index += 1;
        self.rows_in_file = 0;
        self.bytes_in_file = 0;
        Ok(())
    }
}

async fn discard_stale_staging(staging_dir: &Path, own: &str) -> Result<()> {
    let mut entries = tokio::fs::read_dir(staging_dir).await.map_err(|e| {
        SyncError::storage(format!("scanning staging {}: {}", staging_dir.display(), e))
    })?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::storage(format!("scanning staging: {}", e)))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(own) {
            continue;
        }
        warn!(file = %name, "discarding stale staging file");
        tokio::fs::remove_file(entry.path()).await.map_err(|e| {
            SyncError::storage(format!("removing stale staging file {}: {}", name, e))
        })?;
    }
    Ok(())
}

async fn clear_previous_output(target_dir: &Path, own: &str) -> Result<()> {
    let mut removed = 0u32;
    let mut entries = tokio::fs::read_dir(target_dir).await.map_err(|e| {
        SyncError::storage(format!("scanning target {}: {}", target_dir.display(), e))
    })?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::storage(format!("scanning target: {}", e)))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(own) {
            continue;
        }
        tokio::fs::remove_file(entry.path())
            .await
            .map_err(|e| SyncError::storage(format!("removing previous output {}: {}", name, e)))?;
        removed += 1;
    }
    if removed > 0 {
        info!(removed, "cleared previous output");
    }
    Ok(())
}
