//! Output compression for rolled text files
//!
//! Compression is applied per buffered chunk: each chunk becomes one gzip
//! member, and concatenated members are a single valid gzip stream. That
//! keeps the writer streaming (nothing is held back for a trailing footer)
//! at the cost of a slightly lower ratio than one big member.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression as GzipLevel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Compression applied to rolled output files
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    /// No compression
    #[default]
    None,
    /// Gzip (.gz), one member per flushed chunk
    Gzip,
}

impl OutputCompression {
    /// File extension suffix for this compression
    pub fn extension_suffix(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
        }
    }

    /// Check if compression is enabled
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Compress one chunk of payload
    pub fn compress_chunk(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::default());
                encoder
                    .write_all(data)
                    .map_err(|e| SyncError::storage(format!("gzip encoding failed: {}", e)))?;
                encoder
                    .finish()
                    .map_err(|e| SyncError::storage(format!("gzip encoding failed: {}", e)))
            }
        }
    }
}

impl std::fmt::Display for OutputCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
        }
    }
}
