//! Restore protocol tests: committed checkpoints survive a crash, a
//! restarted task resumes exactly past them, and the host clears them
//! once the whole job is done.

use std::path::Path;
use std::sync::Arc;

use futures::{stream, StreamExt};
use penstock_connect::connectors::{builtin_sink_registry, builtin_source_registry};
use penstock_connect::error::SyncError;
use penstock_connect::format::{OutputFormatBuilder, RollingWriter};
use penstock_connect::restore::{CheckpointStore, FileCheckpointStore, RestoreEngine};
use penstock_connect::testing::{MemorySource, MemorySourceConfig};
use penstock_connect::traits::{DataSource, RowStream, TaskContext};
use penstock_rdbc::schema::MetaColumn;
use penstock_rdbc::types::{GenericType, Row, Value};

fn columns() -> Vec<MetaColumn> {
    vec![
        MetaColumn::new("id", GenericType::BigInt),
        MetaColumn::new("val", GenericType::String),
    ]
}

fn row(i: i64) -> Row {
    Row::new(vec![Value::from(i), Value::from(format!("v{:04}", i))])
}

fn data_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().into_string().unwrap())
        .filter(|n| !n.starts_with('.') && !n.starts_with('_'))
        .collect();
    names.sort();
    names
}

fn read_ids(dir: &Path) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in data_files(dir) {
        let content = std::fs::read_to_string(dir.join(&name)).unwrap();
        for line in content.lines() {
            ids.push(line.split(',').next().unwrap().parse().unwrap());
        }
    }
    ids
}

async fn open_writer(
    out: &Path,
    store: Arc<FileCheckpointStore>,
    ctx: &TaskContext,
) -> RollingWriter {
    let mut builder = OutputFormatBuilder::new();
    builder.target_dir(out).unwrap();
    builder.columns(columns()).unwrap();
    builder.delimiter(',').unwrap();
    builder.max_file_rows(100).unwrap();
    builder
        .restore(RestoreEngine::new(store, ctx.checkpoint_key()))
        .unwrap();
    RollingWriter::open(builder.finish().unwrap(), ctx).await.unwrap()
}

#[tokio::test]
async fn test_crash_after_checkpoint_resumes_without_duplicates_or_gaps() {
    let out = tempfile::tempdir().unwrap();
    let cp = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(cp.path()));
    let ctx = TaskContext::single("backfill");

    // first attempt dies with rows 501..=550 accepted but never promoted
    let mut writer = open_writer(out.path(), store.clone(), &ctx).await;
    for i in 1..=550 {
        writer.write_row(&row(i)).await.unwrap();
    }
    drop(writer);

    let committed = store.load(&ctx.checkpoint_key()).await.unwrap().unwrap();
    assert_eq!(committed.rows_written, 500);
    assert_eq!(committed.file_index, 4);
    assert_eq!(read_ids(out.path()), (1..=500).collect::<Vec<i64>>());

    // restart: the resume point is the committed boundary, not the crash point
    let mut writer = open_writer(out.path(), store.clone(), &ctx).await;
    assert_eq!(writer.resume_checkpoint().unwrap().rows_written, 500);
    for i in 501..=600 {
        writer.write_row(&row(i)).await.unwrap();
    }
    let result = writer.finalize().await.unwrap();

    let last = result.last_checkpoint.expect("checkpoint committed");
    assert_eq!(last.rows_written, 600);
    assert_eq!(last.file_index, 5);

    // every row exactly once, in order, across both attempts
    assert_eq!(read_ids(out.path()), (1..=600).collect::<Vec<i64>>());
    assert_eq!(data_files(out.path()).len(), 6);
}

fn restorable_yaml(out: &Path, cp: &Path) -> serde_yaml::Value {
    serde_yaml::from_str(&format!(
        r#"
path: {}
sync:
  columns:
    - name: id
      type: bigint
    - name: val
      type: string
  field_delimiter: ","
  max_file_rows: 2
  restore:
    enabled: true
    checkpoint_dir: {}
"#,
        out.display(),
        cp.display()
    ))
    .unwrap()
}

#[tokio::test]
async fn test_host_restart_resumes_source_and_sink_through_registry() {
    let out = tempfile::tempdir().unwrap();
    let cp = tempfile::tempdir().unwrap();
    let config = restorable_yaml(out.path(), cp.path());
    let ctx = TaskContext::single("orders");
    let sinks = builtin_sink_registry();
    let all_rows: Vec<Row> = (1..=10).map(row).collect();

    // the first run only receives six rows before the source goes away
    let first_six: RowStream = stream::iter(all_rows[..6].to_vec().into_iter().map(Ok)).boxed();
    let first = sinks
        .create("file-x")
        .unwrap()
        .write_raw(&config, &ctx, first_six)
        .await
        .unwrap();
    assert_eq!(first.rows_written, 6);
    assert_eq!(first.files_completed, 3);

    // the host reads the committed boundary and resumes the source there
    let store = Arc::new(FileCheckpointStore::new(cp.path()));
    let resume = store.load(&ctx.checkpoint_key()).await.unwrap();
    assert_eq!(resume.as_ref().unwrap().rows_written, 6);

    let source = MemorySource::new(all_rows.clone());
    let tail = source
        .read(&MemorySourceConfig::default(), &ctx, resume)
        .await
        .unwrap();
    let second = sinks
        .create("file-x")
        .unwrap()
        .write_raw(&config, &ctx, tail)
        .await
        .unwrap();
    assert_eq!(second.rows_written, 4);
    assert_eq!(second.last_checkpoint.as_ref().unwrap().rows_written, 10);

    // the target now holds the whole logical stream exactly once
    let output = builtin_source_registry()
        .create("file-x")
        .unwrap()
        .read_raw(&config, &ctx, None)
        .await
        .unwrap();
    let rows: Vec<Row> = output.map(|r| r.unwrap()).collect().await;
    assert_eq!(rows, all_rows);

    // job done: the host clears the checkpoint
    RestoreEngine::new(store.clone(), ctx.checkpoint_key())
        .complete()
        .await
        .unwrap();
    assert!(store.load(&ctx.checkpoint_key()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unreadable_checkpoint_fails_startup_before_any_output() {
    let out = tempfile::tempdir().unwrap();
    let cp = tempfile::tempdir().unwrap();
    let config = restorable_yaml(out.path(), cp.path());
    let ctx = TaskContext::single("orders");

    std::fs::create_dir_all(cp.path().join("orders")).unwrap();
    std::fs::write(cp.path().join("orders/0.json"), b"{half a checkpoint").unwrap();

    let input: RowStream = stream::iter((1..=3).map(|i| Ok(row(i)))).boxed();
    let err = builtin_sink_registry()
        .create("file-x")
        .unwrap()
        .write_raw(&config, &ctx, input)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Restore(_)), "got {}", err);
    assert!(err.to_string().contains("corrupt checkpoint"));
    assert!(data_files(out.path()).is_empty());
}
