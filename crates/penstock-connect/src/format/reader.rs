//! Delimited directory reader
//!
//! Streams typed rows out of every data file in a source directory, in
//! lexicographic file order. Hidden files (`.` prefix) and markers (`_`
//! prefix) are skipped, `.gz` files are decoded transparently. A line that
//! fails to decode is routed to the dirty channel and the stream moves on;
//! the stream itself only errors on storage failures or when the dirty
//! guard trips.

use std::collections::VecDeque;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use futures::stream;
use futures::StreamExt;
use penstock_rdbc::types::Row;
use tracing::{debug, info, warn};

use crate::dirty::DirtyDataRouter;
use crate::error::{Result, SyncError};
use crate::format::builder::InputFormat;
use crate::format::codec::DelimitedCodec;
use crate::traits::RowStream;

/// Reader turning an [`InputFormat`] into a row stream.
pub struct DelimitedReader {
    format: InputFormat,
    skip: u64,
}

impl DelimitedReader {
    /// Create a reader over an assembled input format
    pub fn new(format: InputFormat) -> Self {
        Self { format, skip: 0 }
    }

    /// Skip the first `rows` decodable rows before emitting anything.
    ///
    /// This is the resume path: rows already delivered to a committed
    /// checkpoint are passed over, and lines that fail to decode inside the
    /// skipped prefix are dropped silently since the previous run already
    /// routed them.
    pub fn skip_rows(mut self, rows: u64) -> Self {
        self.skip = rows;
        self
    }

    /// Scan the source directory and return the row stream.
    ///
    /// The directory listing happens up front, so an unreadable source
    /// fails here instead of mid-stream.
    pub async fn into_stream(self) -> Result<RowStream> {
        let files = scan_source_dir(&self.format.source_dir).await?;
        info!(
            files = files.len(),
            dir = %self.format.source_dir.display(),
            "scanned source directory"
        );

        let state = ReadState {
            files: files.into(),
            lines: Vec::new().into_iter(),
            codec: self.format.codec,
            router: Some(self.format.router),
            skip: self.skip,
            done: false,
        };
        Ok(stream::unfold(state, |mut state| async move { state.next().await }).boxed())
    }
}

struct ReadState {
    files: VecDeque<PathBuf>,
    lines: std::vec::IntoIter<String>,
    codec: DelimitedCodec,
    router: Option<DirtyDataRouter>,
    skip: u64,
    done: bool,
}

impl ReadState {
    async fn next(mut self) -> Option<(Result<Row>, ReadState)> {
        loop {
            if self.done {
                return None;
            }

            let Some(line) = self.lines.next() else {
                match self.files.pop_front() {
                    Some(path) => match read_lines(&path).await {
                        Ok(lines) => {
                            debug!(file = %path.display(), lines = lines.len(), "reading source file");
                            self.lines = lines.into_iter();
                            continue;
                        }
                        Err(e) => return self.fail(e).await,
                    },
                    None => return self.finish().await,
                }
            };

            if self.skip > 0 {
                match self.codec.decode(&line) {
                    Ok(_) => self.skip -= 1,
                    Err(e) if e.is_row() => {
                        debug!(reason = %e, "skipping previously routed line")
                    }
                    Err(e) => return self.fail(e).await,
                }
                continue;
            }

            match self.codec.decode(&line) {
                Ok(row) => {
                    if let Some(router) = self.router.as_ref() {
                        router.record_success();
                    }
                    return Some((Ok(row), self));
                }
                Err(e) if e.is_row() => {
                    let routed = match self.router.as_mut() {
                        Some(router) => router.route(line, &e).await,
                        None => Ok(()),
                    };
                    match routed {
                        Ok(()) => continue,
                        Err(trip) => return self.fail(trip).await,
                    }
                }
                Err(e) => return self.fail(e).await,
            }
        }
    }

    /// Emit a fatal error as the last stream item, flushing the dirty
    /// channel first so routed records survive the abort.
    async fn fail(mut self, error: SyncError) -> Option<(Result<Row>, ReadState)> {
        self.done = true;
        if let Some(router) = self.router.take() {
            if let Err(e) = router.finalize().await {
                warn!(error = %e, "dirty channel flush failed during abort");
            }
        }
        Some((Err(error), self))
    }

    /// Clean end of stream: flush the dirty channel and stop.
    async fn finish(mut self) -> Option<(Result<Row>, ReadState)> {
        self.done = true;
        let Some(router) = self.router.take() else {
            return None;
        };
        match router.finalize().await {
            Ok(stats) => {
                debug!(dirty = stats.records, "source dirty channel flushed");
                None
            }
            Err(e) => Some((Err(e), self)),
        }
    }
}

async fn scan_source_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SyncError::storage(format!("scanning source {}: {}", dir.display(), e)))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::storage(format!("scanning source: {}", e)))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| SyncError::storage(format!("inspecting {}: {}", name, e)))?;
        if !file_type.is_file() {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SyncError::storage(format!("reading {}: {}", path.display(), e)))?;
    let text = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut decoder = MultiGzDecoder::new(bytes.as_slice());
        let mut text = String::new();
        decoder.read_to_string(&mut text).map_err(|e| {
            SyncError::storage(format!("decoding {}: {}", path.display(), e))
        })?;
        text
    } else {
        String::from_utf8(bytes).map_err(|e| {
            SyncError::storage(format!("{} is not valid UTF-8: {}", path.display(), e))
        })?
    };
    Ok(text.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    use penstock_rdbc::schema::MetaColumn;
    use penstock_rdbc::types::{GenericType, Value};

    use crate::dirty::{ErrorLimits, NdjsonDirtySink};
    use crate::format::builder::InputFormatBuilder;

    fn reader_for(dir: &Path) -> InputFormatBuilder {
        let mut builder = InputFormatBuilder::new();
        builder.source_dir(dir).unwrap();
        builder
            .columns(vec![
                MetaColumn::new("id", GenericType::BigInt),
                MetaColumn::new("name", GenericType::String),
            ])
            .unwrap();
        builder.delimiter(',').unwrap();
        builder
    }

    async fn collect(mut stream: RowStream) -> (Vec<Row>, Vec<SyncError>) {
        let mut rows = Vec::new();
        let mut errors = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(row) => rows.push(row),
                Err(e) => errors.push(e),
            }
        }
        (rows, errors)
    }

    #[tokio::test]
    async fn test_reads_sorted_files_skipping_markers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("part-b.txt"), "3,carol\n4,dave\n").unwrap();
        std::fs::write(dir.path().join("part-a.txt"), "1,alice\n2,bob\n").unwrap();
        std::fs::write(dir.path().join("_SUCCESS"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "junk").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let format = reader_for(dir.path()).finish().unwrap();
        let stream = DelimitedReader::new(format).into_stream().await.unwrap();
        let (rows, errors) = collect(stream).await;

        assert!(errors.is_empty());
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get(0)?.as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(rows[0].get(1), Some(&Value::String("alice".into())));
    }

    #[tokio::test]
    async fn test_skip_resumes_past_delivered_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "1,a\n2,b\n3,c\n4,d\n5,e\n").unwrap();

        let format = reader_for(dir.path()).finish().unwrap();
        let stream = DelimitedReader::new(format)
            .skip_rows(3)
            .into_stream()
            .await
            .unwrap();
        let (rows, errors) = collect(stream).await;

        assert!(errors.is_empty());
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get(0)?.as_i64()).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_undecodable_line_routed_and_stream_goes_on() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "1,a\nnope,b\n3,c\n").unwrap();
        let dirty_path = dir.path().join("dirty.ndjson");

        let mut builder = reader_for(dir.path());
        builder
            .dirty_sink(Box::new(NdjsonDirtySink::new(&dirty_path, 1)))
            .unwrap();
        let format = builder.finish().unwrap();
        let stream = DelimitedReader::new(format).into_stream().await.unwrap();
        let (rows, errors) = collect(stream).await;

        assert!(errors.is_empty());
        assert_eq!(rows.len(), 2);
        let dirty = std::fs::read_to_string(&dirty_path).unwrap();
        assert_eq!(dirty.lines().count(), 1);
        assert!(dirty.contains("nope,b"));
    }

    #[tokio::test]
    async fn test_guard_trip_is_last_item() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "1,a\nbad,b\n3,c\n").unwrap();

        let mut builder = reader_for(dir.path());
        builder.error_limits(ErrorLimits::new(None, Some(0))).unwrap();
        let format = builder.finish().unwrap();
        let mut stream = DelimitedReader::new(format).into_stream().await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get(0), Some(&Value::Int64(1)));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_data_quality_abort());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_skipped_prefix_does_not_reroute_dirty_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "1,a\nbad,b\n3,c\n4,d\n").unwrap();
        let dirty_path = dir.path().join("dirty.ndjson");

        let mut builder = reader_for(dir.path());
        builder
            .dirty_sink(Box::new(NdjsonDirtySink::new(&dirty_path, 1)))
            .unwrap();
        // the previous run delivered rows 1 and 3 and routed the bad line
        let format = builder.finish().unwrap();
        let stream = DelimitedReader::new(format)
            .skip_rows(2)
            .into_stream()
            .await
            .unwrap();
        let (rows, errors) = collect(stream).await;

        assert!(errors.is_empty());
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get(0)?.as_i64()).collect();
        assert_eq!(ids, vec![4]);
        assert!(!dirty_path.exists());
    }

    #[tokio::test]
    async fn test_reads_gzip_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"1,a\n2,b\n").unwrap();
        std::fs::write(dir.path().join("data.txt.gz"), encoder.finish().unwrap()).unwrap();

        let format = reader_for(dir.path()).finish().unwrap();
        let stream = DelimitedReader::new(format).into_stream().await.unwrap();
        let (rows, errors) = collect(stream).await;
        assert!(errors.is_empty());
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_source_dir_fails_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let format = reader_for(&dir.path().join("absent")).finish().unwrap();
        let err = DelimitedReader::new(format).into_stream().await.err().unwrap();
        assert!(matches!(err, SyncError::Storage { .. }));
    }
}
