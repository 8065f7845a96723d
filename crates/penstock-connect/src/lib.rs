//! # penstock-connect
//!
//! Connector SDK and execution primitives for the penstock data
//! synchronization engine: the typed [`DataSource`]/[`DataWriter`]
//! contract, a type-erased registry driven by raw YAML, the delimited
//! file pipeline (format builder, codec, rolling writer and reader),
//! checkpoint-based restore, and the dirty-data channel with its
//! error-ratio guard.
//!
//! ## Pipeline
//!
//! A sync job wires a source stream into a writer:
//!
//! ```text
//! DataSource::read ──► RowStream ──► RollingWriter ──► target files
//!                         │               │
//!                         │               └──► RestoreEngine (checkpoint per promoted file)
//!                         └─ Err items ──► DirtyDataRouter ──► DirtySink
//!                                              └──► ErrorRatioGuard (deliberate abort on trip)
//! ```
//!
//! A row-level failure never aborts the batch on its own: each one
//! becomes exactly one dirty record, and the guard turns excessive
//! failure into a deliberate, diagnosable job abort instead of a crash.
//!
//! ## Example
//!
//! ```rust,ignore
//! use penstock_connect::connectors::builtin_sink_registry;
//! use penstock_connect::prelude::*;
//!
//! let writer = builtin_sink_registry().create("file-x")?;
//! let config: serde_yaml::Value = serde_yaml::from_str(job_yaml)?;
//! let result = writer
//!     .write_raw(&config, &TaskContext::single("nightly-orders"), rows)
//!     .await?;
//! println!("{} rows written, {} dirty", result.rows_written, result.rows_dirty);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connectors;
pub mod dirty;
pub mod error;
pub mod format;
pub mod restore;
pub mod retry;
pub mod testing;
pub mod traits;

pub use config::{DirtySettings, RestoreSettings, SyncConfig, WriteMode};
pub use connectors::{builtin_sink_registry, builtin_source_registry};
pub use dirty::{
    DirtyDataRouter, DirtyRecord, DirtySink, DirtyStats, ErrorLimits, ErrorRatioGuard,
    LogDirtySink, NdjsonDirtySink,
};
pub use error::{Result, SyncError};
pub use format::{
    DelimitedCodec, DelimitedReader, InputFormat, InputFormatBuilder, OutputCompression,
    OutputFormat, OutputFormatBuilder, RollingWriter,
};
pub use restore::{
    CheckpointKey, CheckpointStore, FileCheckpointStore, RestoreCheckpoint, RestoreEngine,
};
pub use retry::{retry, RetryConfig};
pub use traits::{
    parse_config, AnyDataSource, AnyDataWriter, CheckResult, ConnectorSpec, DataSource,
    DataWriter, RowStream, SinkConfig, SinkFactory, SinkRegistry, SourceConfig, SourceFactory,
    SourceRegistry, TaskContext, WriteResult,
};

// Re-export the rdbc types that appear in connector signatures
pub use penstock_rdbc::{GenericType, MetaColumn, Row, Value};

// Re-export commonly used dependencies for connector implementations
pub use async_trait::async_trait;
pub use futures::stream::BoxStream;
pub use serde::{Deserialize, Serialize};

/// Commonly used imports.
pub mod prelude {
    pub use crate::config::{SyncConfig, WriteMode};
    pub use crate::dirty::{DirtyDataRouter, DirtySink, ErrorLimits};
    pub use crate::error::{Result, SyncError};
    pub use crate::format::{
        DelimitedReader, InputFormatBuilder, OutputFormatBuilder, RollingWriter,
    };
    pub use crate::restore::{CheckpointStore, RestoreCheckpoint, RestoreEngine};
    pub use crate::traits::{
        parse_config, CheckResult, ConnectorSpec, DataSource, DataWriter, RowStream, SinkConfig,
        SinkFactory, SinkRegistry, SourceConfig, SourceFactory, SourceRegistry, TaskContext,
        WriteResult,
    };
    pub use crate::{async_trait, BoxStream};

    pub use penstock_rdbc::{
        dialect_for, Dialect, GenericType, MetaColumn, Row, StoreFormat, Value,
    };

    pub use schemars::JsonSchema;
    pub use validator::Validate;
}
