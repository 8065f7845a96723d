//! Error types for penstock-connect
//!
//! One enum covers the whole pipeline, but the variants mean very different
//! blast radii: configuration, state and restore errors are fatal before or
//! at startup; a row error is caught at the record boundary and routed to
//! the dirty channel; a storage error may be retried at the I/O boundary;
//! a tripped threshold aborts the job as a data-quality failure.

use thiserror::Error;

/// Result type alias for connector and pipeline operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in sync pipeline operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration invalid or incomplete
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation called in the wrong lifecycle state
    #[error("illegal state: {0}")]
    State(String),

    /// One record failed conversion or encoding
    #[error("row error: {0}")]
    Row(String),

    /// Storage I/O failed
    #[error("storage error: {message}")]
    Storage {
        /// What the engine was doing when the I/O failed
        message: String,
        /// Whether retrying the same operation can succeed
        retryable: bool,
        /// Underlying cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Dirty-data threshold tripped; the job aborts as a data-quality failure
    #[error("error threshold exceeded by rule `{rule}`: {errors} dirty of {total} total")]
    ThresholdExceeded {
        /// Name of the limit that tripped
        rule: String,
        /// Dirty records seen so far
        errors: u64,
        /// Total records seen so far
        total: u64,
    },

    /// Checkpoint could not be loaded or committed
    #[error("restore error: {0}")]
    Restore(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Database abstraction error
    #[error(transparent)]
    Rdbc(#[from] penstock_rdbc::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration error for a required builder or config field
    pub fn missing_field(field: &str) -> Self {
        Self::Configuration(format!("missing required field: {}", field))
    }

    /// Create an illegal-state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a row error
    pub fn row(msg: impl Into<String>) -> Self {
        Self::Row(msg.into())
    }

    /// Create a non-retryable storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
            retryable: false,
            source: None,
        }
    }

    /// Create a retryable storage error wrapping its cause
    pub fn storage_retryable(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: msg.into(),
            retryable: true,
            source: Some(Box::new(source)),
        }
    }

    /// Create a restore error
    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }

    /// Create a threshold-exceeded error
    pub fn threshold(rule: impl Into<String>, errors: u64, total: u64) -> Self {
        Self::ThresholdExceeded {
            rule: rule.into(),
            errors,
            total,
        }
    }

    /// Check if this error is retryable at the I/O boundary
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { retryable: true, .. })
    }

    /// Check if this error is a single-record failure
    pub fn is_row(&self) -> bool {
        matches!(self, Self::Row(_))
    }

    /// Check if this error is a data-quality abort (tripped threshold)
    pub fn is_data_quality_abort(&self) -> bool {
        matches!(self, Self::ThresholdExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SyncError::missing_field("target_dir").to_string(),
            "configuration error: missing required field: target_dir"
        );
        assert_eq!(
            SyncError::state("format builder already finished").to_string(),
            "illegal state: format builder already finished"
        );
        assert_eq!(
            SyncError::threshold("error_ratio_threshold 0.1", 11, 100).to_string(),
            "error threshold exceeded by rule `error_ratio_threshold 0.1`: 11 dirty of 100 total"
        );
    }

    #[test]
    fn test_retryable_check() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(SyncError::storage_retryable("renaming data file", io).is_retryable());
        assert!(!SyncError::storage("short write").is_retryable());
        assert!(!SyncError::config("bad config").is_retryable());
        assert!(!SyncError::restore("corrupt checkpoint").is_retryable());
    }

    #[test]
    fn test_data_quality_abort_is_distinct() {
        let abort = SyncError::threshold("error_absolute_threshold 5", 6, 40);
        assert!(abort.is_data_quality_abort());
        assert!(!abort.is_retryable());
        assert!(!SyncError::storage("short write").is_data_quality_abort());
    }

    #[test]
    fn test_row_classification() {
        assert!(SyncError::row("field count 3, expected 4").is_row());
        assert!(!SyncError::config("x").is_row());
    }

    #[test]
    fn test_rdbc_errors_convert() {
        let err: SyncError = penstock_rdbc::Error::config("unknown dialect `x`").into();
        assert!(err.to_string().contains("unknown dialect"));
    }

    #[test]
    fn test_storage_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        let err = SyncError::storage_retryable("committing checkpoint", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
