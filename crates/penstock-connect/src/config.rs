//! Job configuration shared by all connectors
//!
//! [`SyncConfig`] is the common slice of a sync job: column schema, dialect
//! name, output shaping, restore and dirty-data settings, and error
//! thresholds. Connector configs embed it as a nested `sync` field and add
//! their own fields around it. Parsing is strict (unknown keys are
//! rejected) and [`SyncConfig::validate_all`] runs every cross-field rule
//! before any data moves.

use std::path::PathBuf;

use penstock_rdbc::schema::{MetaColumn, StoreFormat, DEFAULT_DELIMITER};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::dirty::ErrorLimits;
use crate::error::{Result, SyncError};
use crate::format::OutputCompression;

/// Maximum bytes per rolled output file when configuration does not say (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Character set name accepted for text output
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// How the writer treats data already present at the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Keep existing data, add new files next to it
    #[default]
    Append,
    /// Remove this task's previous output before writing
    Overwrite,
}

/// Checkpoint/restore settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RestoreSettings {
    /// Enable checkpointing and resume-on-restart
    #[serde(default)]
    pub enabled: bool,
    /// Directory checkpoints are stored in (required when enabled)
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
}

/// Dirty-data channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DirtySettings {
    /// File the dirty channel appends to; absent means log-only
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Buffered dirty records before a flush (default: 100)
    #[serde(default = "default_dirty_flush_threshold")]
    #[validate(range(min = 1))]
    pub flush_threshold: usize,
}

impl Default for DirtySettings {
    fn default() -> Self {
        Self {
            path: None,
            flush_threshold: default_dirty_flush_threshold(),
        }
    }
}

/// Common configuration slice of a sync job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Column schema; indices default to declaration order
    #[validate(length(min = 1))]
    pub columns: Vec<MetaColumn>,

    /// Dialect name resolved through the rdbc lookup (default: "ansi")
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Connect timeout in seconds, handed to dialect property derivation
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Append to or overwrite existing target data
    #[serde(default)]
    pub write_mode: WriteMode,

    /// Physical storage format recorded in table metadata
    #[serde(default)]
    pub file_type: StoreFormat,

    /// Field delimiter for text output; must be exactly one character
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: String,

    /// Character set for text output; only UTF-8 is supported
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Compression applied to rolled output files
    #[serde(default)]
    pub compress: OutputCompression,

    /// Maximum bytes per output file before rotation (default: 1 GiB)
    #[serde(default = "default_max_file_size")]
    #[validate(range(min = 1))]
    pub max_file_size: u64,

    /// Maximum rows per output file before rotation; absent means unbounded
    #[serde(default)]
    pub max_file_rows: Option<u64>,

    /// Partition key names for dialects that support them
    #[serde(default)]
    pub partition_keys: Vec<String>,

    /// Checkpoint/restore settings
    #[serde(default)]
    #[validate(nested)]
    pub restore: RestoreSettings,

    /// Dirty-data channel settings
    #[serde(default)]
    #[validate(nested)]
    pub dirty: DirtySettings,

    /// Abort when dirty/total exceeds this ratio; 0.0 means zero tolerance,
    /// absent means unlimited
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub error_ratio_threshold: Option<f64>,

    /// Abort when the dirty count exceeds this number; 0 means zero
    /// tolerance, absent means unlimited
    #[serde(default)]
    pub error_absolute_threshold: Option<u64>,

    /// Minimum records seen before the ratio rule is evaluated (default: 100)
    #[serde(default = "default_error_min_sample")]
    pub error_min_sample: u64,
}

fn default_dialect() -> String {
    "ansi".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    penstock_rdbc::DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_field_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_dirty_flush_threshold() -> usize {
    100
}

fn default_error_min_sample() -> u64 {
    100
}

impl SyncConfig {
    /// Parse from YAML and run every validation rule.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Field-level constraints plus the cross-field rules.
    ///
    /// Everything ill-formed fails here, before any connection is opened or
    /// row read.
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| SyncError::config(e.to_string()))?;

        self.delimiter_char()?;

        if !matches!(
            self.charset.to_ascii_lowercase().as_str(),
            "utf-8" | "utf8"
        ) {
            return Err(SyncError::config(format!(
                "unsupported charset `{}` (only UTF-8)",
                self.charset
            )));
        }

        if self.write_mode == WriteMode::Overwrite && self.restore.enabled {
            return Err(SyncError::config(
                "restore cannot resume into an overwritten target",
            ));
        }
        if self.restore.enabled && self.restore.checkpoint_dir.is_none() {
            return Err(SyncError::missing_field("restore.checkpoint_dir"));
        }

        Ok(())
    }

    /// The configured field delimiter as a single character.
    pub fn delimiter_char(&self) -> Result<char> {
        let mut chars = self.field_delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(SyncError::config(format!(
                "field_delimiter must be exactly one character, got {:?}",
                self.field_delimiter
            ))),
        }
    }

    /// Error thresholds as guard limits.
    ///
    /// Absent thresholds mean unlimited: dirty records are still routed and
    /// counted, but never abort the job.
    pub fn error_limits(&self) -> ErrorLimits {
        ErrorLimits::new(self.error_ratio_threshold, self.error_absolute_threshold)
            .with_min_ratio_sample(self.error_min_sample)
    }
}
