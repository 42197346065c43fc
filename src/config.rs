//! Merge configuration.
//!
//! Defines the source and destination paths of a run plus the tuning knobs of
//! the scheduler, the bucket store and the writers.

use std::path::PathBuf;

use crate::bucket::DEFAULT_BLOCK_SIZE;
use crate::error::{MergeError, Result};

/// Buckets withheld from each partial flush to absorb skew (minutes).
pub const DEFAULT_DELAY_MINUTES: u32 = 30;
/// Threshold advance per scheduling round (minutes).
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;
/// Size of each source read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;
/// Buffer size used while reading each source's first line for seeding.
pub const DEFAULT_PROBE_BUFFER_SIZE: usize = 4096;
/// A coarse-output header is written once per this many buckets.
pub const DEFAULT_COARSE_EVERY: u64 = 30;
/// Pending write units per destination before the flusher waits.
pub const DEFAULT_WRITER_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Source log files, driven in this order every round.
    pub sources: Vec<PathBuf>,
    /// Destination with a header for every minute.
    pub full_output: PathBuf,
    /// Destination with a header every `coarse_every` minutes.
    pub coarse_output: PathBuf,

    /// Lateness tolerance in minutes.
    /// Default: 30
    pub delay_minutes: u32,

    /// Round-advance step in minutes.
    /// Default: 5
    pub interval_minutes: u32,

    /// Bucket capacity step in bytes.
    /// Default: 8 MiB
    pub block_size: usize,

    /// Bytes requested per source read.
    /// Default: 64 KiB
    pub read_buffer_size: usize,

    /// Read buffer for seeding from the first line of each source. The whole
    /// line is always read, however long.
    /// Default: 4 KiB
    pub probe_buffer_size: usize,

    /// Coarse header cadence in buckets.
    /// Default: 30
    pub coarse_every: u64,

    /// Bounded queue depth of each output writer.
    /// Default: 1024
    pub writer_queue_depth: usize,
}

impl MergeConfig {
    pub fn new(
        sources: impl IntoIterator<Item = impl Into<PathBuf>>,
        full_output: impl Into<PathBuf>,
        coarse_output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            full_output: full_output.into(),
            coarse_output: coarse_output.into(),
            delay_minutes: DEFAULT_DELAY_MINUTES,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            block_size: DEFAULT_BLOCK_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            probe_buffer_size: DEFAULT_PROBE_BUFFER_SIZE,
            coarse_every: DEFAULT_COARSE_EVERY,
            writer_queue_depth: DEFAULT_WRITER_QUEUE_DEPTH,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            return Err(MergeError::InvalidConfig("interval must be at least one minute"));
        }
        if self.block_size == 0 {
            return Err(MergeError::InvalidConfig("block size must be non-zero"));
        }
        if self.read_buffer_size == 0 {
            return Err(MergeError::InvalidConfig("read buffer size must be non-zero"));
        }
        if self.probe_buffer_size == 0 {
            return Err(MergeError::InvalidConfig("probe buffer size must be non-zero"));
        }
        if self.coarse_every == 0 {
            return Err(MergeError::InvalidConfig("coarse header cadence must be non-zero"));
        }
        if self.writer_queue_depth == 0 {
            return Err(MergeError::InvalidConfig("writer queue depth must be non-zero"));
        }
        if self.full_output == self.coarse_output {
            return Err(MergeError::InvalidConfig(
                "full and coarse outputs must be different files",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_config_default() {
        let config = MergeConfig::new(["a.log", "b.log"], "total_1", "total_30");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.delay_minutes, 30);
        assert_eq!(config.interval_minutes, 5);
        assert_eq!(config.block_size, 8 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, 64 * 1024);
        assert_eq!(config.probe_buffer_size, 4096);
        assert_eq!(config.coarse_every, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_config_rejects_zero_interval() {
        let mut config = MergeConfig::new(["a.log"], "total_1", "total_30");
        config.interval_minutes = 0;
        assert!(matches!(
            config.validate(),
            Err(MergeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_merge_config_rejects_shared_output() {
        let config = MergeConfig::new(["a.log"], "total", "total");
        assert!(config.validate().is_err());
    }
}
