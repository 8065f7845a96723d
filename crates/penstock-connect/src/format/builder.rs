//! Format builders
//!
//! A connector assembles its reader or writer through a builder: set what
//! the job config provides, then call `finish()` once. `finish()` checks
//! every required field and reports all the missing ones in a single
//! configuration error, so a bad job fails fast with the full list instead
//! of one field per restart. After `finish()` the builder is sealed; any
//! further setter call is an illegal-state error.

use std::path::PathBuf;

use penstock_rdbc::schema::{resolve_columns, IndexPolicy, MetaColumn, StoreFormat, DEFAULT_DELIMITER};

use crate::config::{SyncConfig, WriteMode, DEFAULT_MAX_FILE_SIZE};
use crate::dirty::{DirtyDataRouter, DirtySink, ErrorLimits, LogDirtySink};
use crate::error::{Result, SyncError};
use crate::format::codec::DelimitedCodec;
use crate::format::compression::OutputCompression;
use crate::restore::RestoreEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Assembling,
    Finished,
}

/// Builder for the write side of a job.
///
/// Seeded from a [`SyncConfig`] via [`from_config`](Self::from_config) or
/// assembled field by field. Produces an [`OutputFormat`] that a rolling
/// writer opens against the target directory.
pub struct OutputFormatBuilder {
    state: BuilderState,
    target_dir: Option<PathBuf>,
    columns: Vec<MetaColumn>,
    delimiter: char,
    write_mode: WriteMode,
    store_format: StoreFormat,
    compress: OutputCompression,
    max_file_size: u64,
    max_file_rows: Option<u64>,
    restore: Option<RestoreEngine>,
    dirty_sink: Option<Box<dyn DirtySink>>,
    error_limits: ErrorLimits,
}

impl OutputFormatBuilder {
    /// Create a builder with defaults for everything optional
    pub fn new() -> Self {
        Self {
            state: BuilderState::Assembling,
            target_dir: None,
            columns: Vec::new(),
            delimiter: DEFAULT_DELIMITER,
            write_mode: WriteMode::default(),
            store_format: StoreFormat::default(),
            compress: OutputCompression::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_file_rows: None,
            restore: None,
            dirty_sink: None,
            error_limits: ErrorLimits::unlimited(),
        }
    }

    /// Seed a builder from the common job configuration.
    ///
    /// Target directory, restore engine and dirty sink stay unset; those
    /// come from the connector.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let mut builder = Self::new();
        builder.columns = config.columns.clone();
        builder.delimiter = config.delimiter_char()?;
        builder.write_mode = config.write_mode;
        builder.store_format = config.file_type;
        builder.compress = config.compress;
        builder.max_file_size = config.max_file_size;
        builder.max_file_rows = config.max_file_rows;
        builder.error_limits = config.error_limits();
        Ok(builder)
    }

    /// Directory rolled files are written into
    pub fn target_dir(&mut self, dir: impl Into<PathBuf>) -> Result<&mut Self> {
        self.assert_assembling("target_dir")?;
        self.target_dir = Some(dir.into());
        Ok(self)
    }

    /// Column schema; indices default to declaration order at `finish()`
    pub fn columns(&mut self, columns: Vec<MetaColumn>) -> Result<&mut Self> {
        self.assert_assembling("columns")?;
        self.columns = columns;
        Ok(self)
    }

    /// Field delimiter for encoded lines
    pub fn delimiter(&mut self, delimiter: char) -> Result<&mut Self> {
        self.assert_assembling("delimiter")?;
        self.delimiter = delimiter;
        Ok(self)
    }

    /// Append next to or overwrite this task's previous output
    pub fn write_mode(&mut self, mode: WriteMode) -> Result<&mut Self> {
        self.assert_assembling("write_mode")?;
        self.write_mode = mode;
        Ok(self)
    }

    /// Storage format; decides the file extension
    pub fn store_format(&mut self, format: StoreFormat) -> Result<&mut Self> {
        self.assert_assembling("store_format")?;
        self.store_format = format;
        Ok(self)
    }

    /// Compression applied to completed chunks
    pub fn compression(&mut self, compress: OutputCompression) -> Result<&mut Self> {
        self.assert_assembling("compression")?;
        self.compress = compress;
        Ok(self)
    }

    /// Rotate after this many bytes in one file
    pub fn max_file_size(&mut self, bytes: u64) -> Result<&mut Self> {
        self.assert_assembling("max_file_size")?;
        self.max_file_size = bytes;
        Ok(self)
    }

    /// Rotate after this many rows in one file
    pub fn max_file_rows(&mut self, rows: u64) -> Result<&mut Self> {
        self.assert_assembling("max_file_rows")?;
        self.max_file_rows = Some(rows);
        Ok(self)
    }

    /// Checkpoint engine for this task; unset means restore is disabled
    pub fn restore(&mut self, engine: RestoreEngine) -> Result<&mut Self> {
        self.assert_assembling("restore")?;
        self.restore = Some(engine);
        Ok(self)
    }

    /// Destination for rejected rows; unset means log-only
    pub fn dirty_sink(&mut self, sink: Box<dyn DirtySink>) -> Result<&mut Self> {
        self.assert_assembling("dirty_sink")?;
        self.dirty_sink = Some(sink);
        Ok(self)
    }

    /// Thresholds the dirty-data guard enforces
    pub fn error_limits(&mut self, limits: ErrorLimits) -> Result<&mut Self> {
        self.assert_assembling("error_limits")?;
        self.error_limits = limits;
        Ok(self)
    }

    /// Whether `finish()` has sealed this builder
    pub fn is_finished(&self) -> bool {
        self.state == BuilderState::Finished
    }

    /// Validate the assembly and produce the output format.
    ///
    /// All missing required fields are reported together. A failed finish
    /// leaves the builder assembling, so the caller can correct it and try
    /// again; a successful one seals it.
    pub fn finish(&mut self) -> Result<OutputFormat> {
        if self.state == BuilderState::Finished {
            return Err(SyncError::state("finish() called twice"));
        }

        let mut missing = Vec::new();
        if self.target_dir.is_none() {
            missing.push("target_dir");
        }
        if self.columns.is_empty() {
            missing.push("columns");
        }
        if !missing.is_empty() {
            return Err(SyncError::missing_field(&missing.join(", ")));
        }

        if self.max_file_size == 0 {
            return Err(SyncError::config("max_file_size must be at least 1"));
        }
        if self.write_mode == WriteMode::Overwrite
            && self.restore.as_ref().is_some_and(RestoreEngine::enabled)
        {
            return Err(SyncError::config(
                "restore cannot resume into an overwritten target",
            ));
        }

        let columns = resolve_columns(self.columns.clone(), IndexPolicy::DeclarationOrder)?;
        let codec = DelimitedCodec::new(columns, self.delimiter)?;

        let target_dir = self
            .target_dir
            .take()
            .ok_or_else(|| SyncError::missing_field("target_dir"))?;
        let sink = self
            .dirty_sink
            .take()
            .unwrap_or_else(|| Box::new(LogDirtySink::new()));
        let router = DirtyDataRouter::new(sink, self.error_limits.clone());

        self.state = BuilderState::Finished;
        Ok(OutputFormat {
            target_dir,
            codec,
            write_mode: self.write_mode,
            store_format: self.store_format,
            compress: self.compress,
            max_file_size: self.max_file_size,
            max_file_rows: self.max_file_rows.take(),
            restore: self.restore.take(),
            router,
        })
    }

    fn assert_assembling(&self, field: &str) -> Result<()> {
        if self.state == BuilderState::Finished {
            return Err(SyncError::state(format!(
                "cannot set `{}` after finish()",
                field
            )));
        }
        Ok(())
    }
}

impl Default for OutputFormatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutputFormatBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFormatBuilder")
            .field("state", &self.state)
            .field("target_dir", &self.target_dir)
            .finish_non_exhaustive()
    }
}

/// Everything the rolling writer needs, assembled and validated.
pub struct OutputFormat {
    pub(crate) target_dir: PathBuf,
    pub(crate) codec: DelimitedCodec,
    pub(crate) write_mode: WriteMode,
    pub(crate) store_format: StoreFormat,
    pub(crate) compress: OutputCompression,
    pub(crate) max_file_size: u64,
    pub(crate) max_file_rows: Option<u64>,
    pub(crate) restore: Option<RestoreEngine>,
    pub(crate) router: DirtyDataRouter,
}

impl std::fmt::Debug for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFormat")
            .field("target_dir", &self.target_dir)
            .finish_non_exhaustive()
    }
}

impl OutputFormat {
    /// Directory rolled files are written into
    pub fn target_dir(&self) -> &std::path::Path {
        &self.target_dir
    }

    /// The line codec this format encodes with
    pub fn codec(&self) -> &DelimitedCodec {
        &self.codec
    }
}

/// Builder for the read side of a job.
pub struct InputFormatBuilder {
    state: BuilderState,
    source_dir: Option<PathBuf>,
    columns: Vec<MetaColumn>,
    delimiter: char,
    dirty_sink: Option<Box<dyn DirtySink>>,
    error_limits: ErrorLimits,
}

impl InputFormatBuilder {
    /// Create a builder with defaults for everything optional
    pub fn new() -> Self {
        Self {
            state: BuilderState::Assembling,
            source_dir: None,
            columns: Vec::new(),
            delimiter: DEFAULT_DELIMITER,
            dirty_sink: None,
            error_limits: ErrorLimits::unlimited(),
        }
    }

    /// Seed a builder from the common job configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let mut builder = Self::new();
        builder.columns = config.columns.clone();
        builder.delimiter = config.delimiter_char()?;
        builder.error_limits = config.error_limits();
        Ok(builder)
    }

    /// Directory the reader scans for delimited files
    pub fn source_dir(&mut self, dir: impl Into<PathBuf>) -> Result<&mut Self> {
        self.assert_assembling("source_dir")?;
        self.source_dir = Some(dir.into());
        Ok(self)
    }

    /// Column schema the files are decoded against
    pub fn columns(&mut self, columns: Vec<MetaColumn>) -> Result<&mut Self> {
        self.assert_assembling("columns")?;
        self.columns = columns;
        Ok(self)
    }

    /// Field delimiter the files were encoded with
    pub fn delimiter(&mut self, delimiter: char) -> Result<&mut Self> {
        self.assert_assembling("delimiter")?;
        self.delimiter = delimiter;
        Ok(self)
    }

    /// Destination for undecodable lines; unset means log-only
    pub fn dirty_sink(&mut self, sink: Box<dyn DirtySink>) -> Result<&mut Self> {
        self.assert_assembling("dirty_sink")?;
        self.dirty_sink = Some(sink);
        Ok(self)
    }

    /// Thresholds the dirty-data guard enforces
    pub fn error_limits(&mut self, limits: ErrorLimits) -> Result<&mut Self> {
        self.assert_assembling("error_limits")?;
        self.error_limits = limits;
        Ok(self)
    }

    /// Whether `finish()` has sealed this builder
    pub fn is_finished(&self) -> bool {
        self.state == BuilderState::Finished
    }

    /// Validate the assembly and produce the input format.
    pub fn finish(&mut self) -> Result<InputFormat> {
        if self.state == BuilderState::Finished {
            return Err(SyncError::state("finish() called twice"));
        }

        let mut missing = Vec::new();
        if self.source_dir.is_none() {
            missing.push("source_dir");
        }
        if self.columns.is_empty() {
            missing.push("columns");
        }
        if !missing.is_empty() {
            return Err(SyncError::missing_field(&missing.join(", ")));
        }

        let columns = resolve_columns(self.columns.clone(), IndexPolicy::DeclarationOrder)?;
        let codec = DelimitedCodec::new(columns, self.delimiter)?;

        let source_dir = self
            .source_dir
            .take()
            .ok_or_else(|| SyncError::missing_field("source_dir"))?;
        let sink = self
            .dirty_sink
            .take()
            .unwrap_or_else(|| Box::new(LogDirtySink::new()));
        let router = DirtyDataRouter::new(sink, self.error_limits.clone());

        self.state = BuilderState::Finished;
        Ok(InputFormat {
            source_dir,
            codec,
            router,
        })
    }

    fn assert_assembling(&self, field: &str) -> Result<()> {
        if self.state == BuilderState::Finished {
            return Err(SyncError::state(format!(
                "cannot set `{}` after finish()",
                field
            )));
        }
        Ok(())
    }
}

impl Default for InputFormatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InputFormatBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFormatBuilder")
            .field("state", &self.state)
            .field("source_dir", &self.source_dir)
            .finish_non_exhaustive()
    }
}

/// Everything the delimited reader needs, assembled and validated.
pub struct InputFormat {
    pub(crate) source_dir: PathBuf,
    pub(crate) codec: DelimitedCodec,
    pub(crate) router: DirtyDataRouter,
}

impl std::fmt::Debug for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFormat")
            .field("source_dir", &self.source_dir)
            .finish_non_exhaustive()
    }
}

impl InputFormat {
    /// Directory the reader scans
    pub fn source_dir(&self) -> &std::path::Path {
        &self.source_dir
    }

    /// The line codec this format decodes with
    pub fn codec(&self) -> &DelimitedCodec {
        &self.codec
    }
}
