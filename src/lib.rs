//! Streaming time-bucket merge of access logs.
//!
//! N individually time-ordered log files are merged into two outputs: one
//! with a `DD/Mon/YYYY:HH:MM` header for every minute and one labelled only
//! every 30 minutes. Sources are read in lockstep against a shared minute
//! threshold so that only a short trailing window of buckets is ever held in
//! memory, and every bucket is written exactly once, in time order.

pub mod bucket;
pub mod config;
pub mod error;
pub mod flusher;
pub mod merge;
pub mod scheduler;
pub mod source;
pub mod timestamp;
pub mod writer;

pub use bucket::{AppendOutcome, BucketState, BucketStore};
pub use config::MergeConfig;
pub use error::{MergeError, Result};
pub use flusher::{DualResolutionFlusher, FlushTotals};
pub use merge::{merge, LogMerger, MergeStats};
pub use scheduler::{FlushSignal, MergeScheduler};
pub use source::{ReadOutcome, SourceReader, SourceStats};
pub use timestamp::{format_minute, MinuteIndex, MinuteIndexer, TimestampError};
pub use writer::{OutputWriter, WriteUnit};
