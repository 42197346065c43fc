use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::timestamp::{MinuteIndex, TimestampError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("malformed line {line_no} in {}: {source}: {line:?}", path.display())]
    MalformedLine {
        path: PathBuf,
        line_no: u64,
        line: String,
        #[source]
        source: TimestampError,
    },
    #[error("source {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("destination {}: {source}", path.display())]
    DestinationIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("minute index out of range: {0}")]
    MinuteOutOfRange(MinuteIndex),
    #[error("writer for {} is closed", .0.display())]
    WriterClosed(PathBuf),
    #[error("writer task failed: {0}")]
    WriterTask(String),
    #[error("flusher already closed")]
    FlusherClosed,
}

impl MergeError {
    pub(crate) fn source_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MergeError::SourceIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn destination_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MergeError::DestinationIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
