//! Local file connector
//!
//! Reads and writes delimited files in a local directory. The sink rolls
//! size-bounded files through staging, commits checkpoints, routes dirty
//! rows and can emit a `_ddl.sql` sidecar describing the target table in
//! the configured dialect. The source streams the same layout back,
//! resuming past rows a committed checkpoint already delivered.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use penstock_rdbc::dialect::{dialect_for, Dialect};
use penstock_rdbc::schema::{resolve_columns, IndexPolicy, TableInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::config::{DirtySettings, SyncConfig};
use crate::dirty::{DirtySink, LogDirtySink, NdjsonDirtySink};
use crate::error::{Result, SyncError};
use crate::format::{DelimitedReader, InputFormatBuilder, OutputFormatBuilder, RollingWriter};
use crate::restore::{FileCheckpointStore, RestoreCheckpoint, RestoreEngine};
use crate::traits::registry::{AnyDataSource, AnyDataWriter, SinkFactory, SourceFactory};
use crate::traits::{
    CheckResult, ConnectorSpec, DataSource, DataWriter, RowStream, TaskContext, WriteResult,
};

/// Identifier the file connector registers under
pub const FILE_CONNECTOR_IDENTIFIER: &str = "file-x";

/// Name of the DDL sidecar the sink writes next to its data files
pub const DDL_SIDECAR: &str = "_ddl.sql";

/// Table the written files are meant to land in, for DDL synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableTarget {
    /// Database (schema) name
    #[validate(length(min = 1))]
    pub database: String,
    /// Table name
    #[validate(length(min = 1))]
    pub name: String,
}

/// File connector configuration, shared by source and sink.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileSyncConfig {
    /// Directory read from or written into
    #[validate(length(min = 1))]
    pub path: String,

    /// Common sync settings: columns, dialect, output shaping, restore,
    /// dirty channel and error thresholds
    #[validate(nested)]
    pub sync: SyncConfig,

    /// Target table; present makes the sink write a DDL sidecar
    #[serde(default)]
    #[validate(nested)]
    pub table: Option<TableTarget>,
}

/// Source half of the file connector.
#[derive(Debug, Default)]
pub struct FileSource;

impl FileSource {
    /// Create a file source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for FileSource {
    type Config = FileSyncConfig;

    fn spec() -> ConnectorSpec {
        ConnectorSpec::new(FILE_CONNECTOR_IDENTIFIER, env!("CARGO_PKG_VERSION"))
            .description("Delimited file source reading a local directory")
            .config_schema_from::<FileSyncConfig>()
            .supports_restore(true)
    }

    async fn check(&self, config: &Self::Config) -> Result<CheckResult> {
        match tokio::fs::metadata(&config.path).await {
            Ok(meta) if meta.is_dir() => Ok(CheckResult::success()),
            Ok(_) => Ok(CheckResult::failure(format!(
                "{} is not a directory",
                config.path
            ))),
            Err(e) => Ok(CheckResult::failure(format!(
                "cannot read {}: {}",
                config.path, e
            ))),
        }
    }

    async fn read(
        &self,
        config: &Self::Config,
        ctx: &TaskContext,
        resume: Option<RestoreCheckpoint>,
    ) -> Result<RowStream> {
        config.sync.validate_all()?;

        let mut builder = InputFormatBuilder::from_config(&config.sync)?;
        builder.source_dir(&config.path)?;
        builder.dirty_sink(make_dirty_sink(&config.sync.dirty, ctx))?;
        let format = builder.finish()?;

        let skip = resume.as_ref().map(|c| c.rows_written).unwrap_or(0);
        if skip > 0 {
            info!(skip, "resuming read past delivered rows");
        }
        DelimitedReader::new(format)
            .skip_rows(skip)
            .into_stream()
            .await
    }
}

/// Sink half of the file connector.
#[derive(Debug, Default)]
pub struct FileSink;

impl FileSink {
    /// Create a file sink
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataWriter for FileSink {
    type Config = FileSyncConfig;

    fn spec() -> ConnectorSpec {
        ConnectorSpec::new(FILE_CONNECTOR_IDENTIFIER, env!("CARGO_PKG_VERSION"))
            .description("Rolling delimited file sink writing a local directory")
            .config_schema_from::<FileSyncConfig>()
            .supports_restore(true)
    }

    async fn check(&self, config: &Self::Config) -> Result<CheckResult> {
        match tokio::fs::metadata(&config.path).await {
            Ok(meta) if meta.is_dir() => Ok(CheckResult::success()),
            Ok(_) => Ok(CheckResult::failure(format!(
                "{} exists and is not a directory",
                config.path
            ))),
            // a missing target is fine, the writer creates it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CheckResult::success()),
            Err(e) => Ok(CheckResult::failure(format!(
                "cannot inspect {}: {}",
                config.path, e
            ))),
        }
    }

    async fn write(
        &self,
        config: &Self::Config,
        ctx: &TaskContext,
        mut rows: RowStream,
    ) -> Result<WriteResult> {
        config.sync.validate_all()?;
        let dialect = dialect_for(&config.sync.dialect)?;

        let target_dir = PathBuf::from(&config.path);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| SyncError::storage_retryable("creating target directory", e))?;

        if let Some(table) = &config.table {
            write_ddl_sidecar(&target_dir, table, config, dialect.as_ref()).await?;
        }

        let mut builder = OutputFormatBuilder::from_config(&config.sync)?;
        builder.target_dir(&target_dir)?;
        builder.dirty_sink(make_dirty_sink(&config.sync.dirty, ctx))?;
        if config.sync.restore.enabled {
            let dir = config
                .sync
                .restore
                .checkpoint_dir
                .as_ref()
                .ok_or_else(|| SyncError::missing_field("restore.checkpoint_dir"))?;
            let store = Arc::new(FileCheckpointStore::new(dir));
            builder.restore(RestoreEngine::new(store, ctx.checkpoint_key()))?;
        }
        let format = builder.finish()?;
        let mut writer = RollingWriter::open(format, ctx).await?;

        while let Some(item) = rows.next().await {
            let outcome = match item {
                Ok(row) => writer.write_row(&row).await,
                // a per-record failure from the source still becomes one
                // dirty record and counts toward the thresholds
                Err(e) if e.is_row() => writer.route_failure(String::new(), &e).await,
                Err(e) => Err(e),
            };
            if let Err(fatal) = outcome {
                if let Err(flush) = writer.abort().await {
                    warn!(error = %flush, "dirty channel flush failed during abort");
                }
                return Err(fatal);
            }
        }
        writer.finalize().await
    }
}

/// Build the dirty sink for one task.
///
/// A configured path gets a per-task suffix so parallel tasks never
/// interleave writes in one file; no path means log-only.
fn make_dirty_sink(settings: &DirtySettings, ctx: &TaskContext) -> Box<dyn DirtySink> {
    match &settings.path {
        Some(path) => Box::new(NdjsonDirtySink::new(
            task_dirty_path(path, ctx.task_index),
            settings.flush_threshold,
        )),
        None => Box::new(LogDirtySink::new()),
    }
}

fn task_dirty_path(path: &Path, task_index: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dirty");
    let name = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, task_index, ext),
        None => format!("{}-{}", stem, task_index),
    };
    path.with_file_name(name)
}

async fn write_ddl_sidecar(
    target_dir: &Path,
    table: &TableTarget,
    config: &FileSyncConfig,
    dialect: &dyn Dialect,
) -> Result<()> {
    let columns = resolve_columns(config.sync.columns.clone(), IndexPolicy::DeclarationOrder)?;
    // partitioned-by columns live outside the data column list
    let data_columns = columns
        .iter()
        .filter(|c| !config.sync.partition_keys.contains(&c.name));

    let mut builder = TableInfo::builder(&table.database, &table.name)
        .columns(data_columns)
        .delimiter(config.sync.delimiter_char()?)
        .store_format(config.sync.file_type);
    for key in &config.sync.partition_keys {
        builder = builder.partition_key(key);
    }
    let info = builder.build(dialect)?;

    let path = target_dir.join(DDL_SIDECAR);
    tokio::fs::write(&path, format!("{};\n", info.create_table_sql()))
        .await
        .map_err(|e| SyncError::storage(format!("writing {}: {}", path.display(), e)))?;
    info!(file = %path.display(), table = %info.qualified_name(), "wrote table definition");
    Ok(())
}

crate::impl_any_source!(FileSource, FileSyncConfig);
crate::impl_any_sink!(FileSink, FileSyncConfig);

/// Factory for file sources
pub struct FileSourceFactory;

impl SourceFactory for FileSourceFactory {
    fn spec(&self) -> ConnectorSpec {
        FileSource::spec()
    }

    fn create(&self) -> Result<Box<dyn AnyDataSource>> {
        Ok(Box::new(FileSource::new()))
    }
}

/// Factory for file sinks
pub struct FileSinkFactory;

impl SinkFactory for FileSinkFactory {
    fn spec(&self) -> ConnectorSpec {
        FileSink::spec()
    }

    fn create(&self) -> Result<Box<dyn AnyDataWriter>> {
        Ok(Box::new(FileSink::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use penstock_rdbc::types::{Row, Value};

    fn config_yaml(path: &str) -> String {
        format!(
            r#"
path: {}
sync:
  columns:
    - name: id
      type: bigint
    - name: name
      type: string
  field_delimiter: ","
"#,
            path
        )
    }

    fn rows(range: std::ops::Range<i64>) -> RowStream {
        stream::iter(
            range.map(|i| Ok(Row::new(vec![Value::from(i), Value::from(format!("n{}", i))]))),
        )
        .boxed()
    }

    #[test]
    fn test_spec() {
        let spec = FileSink::spec();
        assert_eq!(spec.identifier, "file-x");
        assert!(spec.supports_restore);
        assert!(spec.config_schema.unwrap().to_string().contains("sync"));
    }

    #[test]
    fn test_config_parses_and_validates() {
        let config: FileSyncConfig =
            serde_yaml::from_str(&config_yaml("/data/orders")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.path, "/data/orders");
        assert_eq!(config.sync.columns.len(), 2);
        assert!(config.table.is_none());

        // nested rules surface through the outer validate
        let bad = r#"
path: /data/orders
sync:
  columns:
    - name: id
      type: bigint
  dirty:
    flush_threshold: 0
"#;
        let config: FileSyncConfig = serde_yaml::from_str(bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_task_dirty_path_gets_suffix() {
        assert_eq!(
            task_dirty_path(Path::new("/var/dirty/records.ndjson"), 2),
            PathBuf::from("/var/dirty/records-2.ndjson")
        );
        assert_eq!(
            task_dirty_path(Path::new("records"), 0),
            PathBuf::from("records-0")
        );
    }

    #[tokio::test]
    async fn test_sink_check_accepts_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-yet");
        let config: FileSyncConfig =
            serde_yaml::from_str(&config_yaml(missing.to_str().unwrap())).unwrap();
        assert!(FileSink::new().check(&config).await.unwrap().is_success());

        let file = dir.path().join("occupied");
        std::fs::write(&file, "x").unwrap();
        let config: FileSyncConfig =
            serde_yaml::from_str(&config_yaml(file.to_str().unwrap())).unwrap();
        let result = FileSink::new().check(&config).await.unwrap();
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_source_check_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config: FileSyncConfig =
            serde_yaml::from_str(&config_yaml(dir.path().to_str().unwrap())).unwrap();
        assert!(FileSource::new().check(&config).await.unwrap().is_success());

        let config: FileSyncConfig = serde_yaml::from_str(&config_yaml("/no/such/dir")).unwrap();
        assert!(!FileSource::new().check(&config).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_sink_writes_and_source_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let config: FileSyncConfig =
            serde_yaml::from_str(&config_yaml(dir.path().to_str().unwrap())).unwrap();
        let ctx = TaskContext::single("job-7");

        let result = FileSink::new()
            .write(&config, &ctx, rows(0..10))
            .await
            .unwrap();
        assert_eq!(result.rows_written, 10);
        assert_eq!(result.files_completed, 1);

        let stream = FileSource::new().read(&config, &ctx, None).await.unwrap();
        let rows: Vec<Row> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[9].get(0), Some(&Value::Int64(9)));
    }

    #[tokio::test]
    async fn test_ddl_sidecar_written_for_table_target() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
path: {}
table:
  database: dw
  name: orders
sync:
  columns:
    - name: id
      type: bigint
    - name: pt
      type: string
      value: "20240128"
  dialect: hive
  partition_keys: [pt]
"#,
            dir.path().display()
        );
        let config: FileSyncConfig = serde_yaml::from_str(&yaml).unwrap();
        let ctx = TaskContext::single("job-7");

        FileSink::new()
            .write(&config, &ctx, rows(0..0))
            .await
            .unwrap();

        let ddl = std::fs::read_to_string(dir.path().join(DDL_SIDECAR)).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `dw`.`orders`"));
        assert!(ddl.contains("PARTITIONED BY (`pt` STRING)"));
        assert!(ddl.ends_with(";\n"));
    }

    #[tokio::test]
    async fn test_stream_row_errors_become_dirty_records() {
        let dir = tempfile::tempdir().unwrap();
        let dirty = dir.path().join("dirty.ndjson");
        let yaml = format!(
            r#"
path: {}
sync:
  columns:
    - name: id
      type: bigint
    - name: name
      type: string
  field_delimiter: ","
  dirty:
    path: {}
"#,
            dir.path().join("out").display(),
            dirty.display()
        );
        let config: FileSyncConfig = serde_yaml::from_str(&yaml).unwrap();
        let ctx = TaskContext::single("job-7");

        let stream: RowStream = stream::iter(vec![
            Ok(Row::new(vec![Value::from(1_i64), Value::from("a")])),
            Err(SyncError::row("cannot interpret `x` as bigint")),
            Ok(Row::new(vec![Value::from(2_i64), Value::from("b")])),
        ])
        .boxed();

        let result = FileSink::new().write(&config, &ctx, stream).await.unwrap();
        assert_eq!(result.rows_written, 2);
        assert_eq!(result.rows_dirty, 1);

        let content = std::fs::read_to_string(task_dirty_path(&dirty, 0)).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("cannot interpret"));
    }
}
