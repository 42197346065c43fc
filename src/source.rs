//! Streaming line reader for one source log.
//!
//! A reader is driven in bursts by the scheduler: each [`SourceReader::resume`]
//! consumes lines into the [`BucketStore`] until a line lands past the round
//! threshold (the reader pauses right after committing it) or the file ends.
//! At most one read is in flight per source and lines are committed in file
//! order.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::bucket::{AppendOutcome, BucketStore};
use crate::error::{MergeError, Result};
use crate::timestamp::{MinuteIndex, MinuteIndexer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A line past the threshold was committed; resume with a higher one.
    Paused,
    /// End of input reached and the file closed.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Reading,
    Paused,
    Exhausted,
}

/// Per-source counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct SourceStats {
    pub path: PathBuf,
    pub bytes_read: u64,
    pub lines: u64,
    pub late_lines: u64,
    pub first_minute: Option<MinuteIndex>,
    pub last_minute: Option<MinuteIndex>,
}

pub struct SourceReader {
    path: PathBuf,
    file: Option<File>,
    read_buf: Vec<u8>,
    /// Bytes read but not yet committed: unconsumed lines after a pause plus
    /// a trailing partial line.
    pending: Vec<u8>,
    /// Prefix of `pending` already searched for a newline without a match.
    scanned: usize,
    threshold: MinuteIndex,
    state: ReaderState,
    /// Physical line number of the next line, for diagnostics.
    line_no: u64,
    stats: SourceStats,
}

impl SourceReader {
    pub async fn open(path: impl Into<PathBuf>, read_buffer_size: usize) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)
            .await
            .map_err(|err| MergeError::source_io(&path, err))?;
        Ok(Self {
            stats: SourceStats {
                path: path.clone(),
                ..SourceStats::default()
            },
            path,
            file: Some(file),
            read_buf: vec![0; read_buffer_size.max(1)],
            pending: Vec::new(),
            scanned: 0,
            threshold: MinuteIndex::MIN,
            state: ReaderState::Idle,
            line_no: 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn threshold(&self) -> MinuteIndex {
        self.threshold
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn into_stats(self) -> SourceStats {
        self.stats
    }

    /// Streams lines into `store` until one lands past `threshold` or the input ends.
    pub async fn resume(
        &mut self,
        threshold: MinuteIndex,
        indexer: &mut MinuteIndexer,
        store: &mut BucketStore,
    ) -> Result<ReadOutcome> {
        if self.state == ReaderState::Exhausted {
            return Ok(ReadOutcome::Exhausted);
        }
        self.threshold = threshold;
        self.state = ReaderState::Reading;

        loop {
            if self.drain_lines(indexer, store)? {
                self.state = ReaderState::Paused;
                debug!(
                    "{} paused past minute {} ({} lines)",
                    self.path.display(),
                    threshold,
                    self.stats.lines
                );
                return Ok(ReadOutcome::Paused);
            }

            let size = match self.file.as_mut() {
                Some(file) => file
                    .read(&mut self.read_buf)
                    .await
                    .map_err(|err| MergeError::source_io(&self.path, err))?,
                None => 0,
            };
            if size == 0 {
                self.file = None;
                return self.finish(indexer, store);
            }
            self.stats.bytes_read += size as u64;
            self.pending.extend_from_slice(&self.read_buf[..size]);
        }
    }

    /// Commits complete pending lines. Returns `true` once a line past the
    /// threshold was committed, leaving the rest pending.
    fn drain_lines(
        &mut self,
        indexer: &mut MinuteIndexer,
        store: &mut BucketStore,
    ) -> Result<bool> {
        let mut start = 0;
        let mut search = self.scanned;
        let mut paused = false;
        while let Some(offset) = self.pending[search..].iter().position(|&byte| byte == b'\n') {
            let end = search + offset + 1;
            let line_no = self.line_no;
            self.line_no += 1;
            let index = commit_line(
                &self.path,
                line_no,
                &self.pending[start..end],
                indexer,
                store,
                &mut self.stats,
            )?;
            start = end;
            search = end;
            if index.is_some_and(|index| index > self.threshold) {
                paused = true;
                break;
            }
        }
        self.pending.drain(..start);
        // After a pause the remainder has not been searched yet.
        self.scanned = if paused { 0 } else { self.pending.len() };
        Ok(paused)
    }

    fn finish(
        &mut self,
        indexer: &mut MinuteIndexer,
        store: &mut BucketStore,
    ) -> Result<ReadOutcome> {
        let mut tail = std::mem::take(&mut self.pending);
        self.scanned = 0;
        if !tail.is_empty() {
            if tail.last() != Some(&b'\n') {
                tail.push(b'\n');
            }
            commit_line(
                &self.path,
                self.line_no,
                &tail,
                indexer,
                store,
                &mut self.stats,
            )?;
            self.line_no += 1;
        }
        self.state = ReaderState::Exhausted;
        debug!(
            "{} exhausted after {} lines ({} late)",
            self.path.display(),
            self.stats.lines,
            self.stats.late_lines
        );
        Ok(ReadOutcome::Exhausted)
    }
}

/// Indexes and stores one newline-terminated line. Empty lines are skipped
/// and yield `None`.
fn commit_line(
    path: &Path,
    line_no: u64,
    line: &[u8],
    indexer: &mut MinuteIndexer,
    store: &mut BucketStore,
    stats: &mut SourceStats,
) -> Result<Option<MinuteIndex>> {
    if line.first().map_or(true, |&byte| byte == b'\n') {
        return Ok(None);
    }
    let index = indexer
        .index(line)
        .map_err(|source| MergeError::MalformedLine {
            path: path.to_path_buf(),
            line_no,
            line: String::from_utf8_lossy(line).trim_end().to_string(),
            source,
        })?;

    stats.lines += 1;
    stats.first_minute.get_or_insert(index);
    stats.last_minute = Some(index);
    if store.append(index, line) == AppendOutcome::Late {
        stats.late_lines += 1;
    }
    Ok(Some(index))
}

/// Minute of the first non-empty line of `path`. `None` for a source with no lines.
///
/// The whole line is read however long it is, so seeding accepts exactly the
/// lines [`SourceReader`] accepts.
pub async fn probe_first_minute(
    path: &Path,
    buffer_size: usize,
    indexer: &mut MinuteIndexer,
) -> Result<Option<MinuteIndex>> {
    let file = File::open(path)
        .await
        .map_err(|err| MergeError::source_io(path, err))?;
    let mut reader = BufReader::with_capacity(buffer_size.max(1), file);
    let mut line = Vec::new();
    let mut line_no = 1;
    loop {
        line.clear();
        let size = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|err| MergeError::source_io(path, err))?;
        if size == 0 {
            return Ok(None);
        }
        if line[0] == b'\n' {
            line_no += 1;
            continue;
        }
        return indexer
            .index(&line)
            .map(Some)
            .map_err(|source| MergeError::MalformedLine {
                path: path.to_path_buf(),
                line_no,
                line: String::from_utf8_lossy(&line).trim_end().to_string(),
                source,
            });
    }
}
