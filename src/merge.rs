//! One complete merge run.
//!
//! Wires the scheduler, the bucket store and the flusher together: every
//! scheduling round yields a flush signal that is applied before the next
//! round starts, until the terminal signal closes both outputs.

use log::info;

use crate::bucket::BucketStore;
use crate::config::MergeConfig;
use crate::error::Result;
use crate::flusher::DualResolutionFlusher;
use crate::scheduler::MergeScheduler;
use crate::source::SourceStats;
use crate::timestamp::MinuteIndex;
use crate::writer::OutputWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct MergeStats {
    pub sources: Vec<SourceStats>,
    pub rounds: u64,
    pub lines: u64,
    pub late_lines: u64,
    pub buckets: u64,
    pub first_minute: Option<MinuteIndex>,
    pub full_bytes: u64,
    pub coarse_bytes: u64,
    pub distinct_stamps: usize,
}

pub struct LogMerger {
    config: MergeConfig,
}

impl LogMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<MergeStats> {
        let config = &self.config;
        config.validate()?;

        let mut scheduler = MergeScheduler::open(config).await?;
        let start = scheduler.base().unwrap_or(0);
        let mut store = BucketStore::new(start, config.block_size);
        let full = OutputWriter::create(&config.full_output, config.writer_queue_depth).await?;
        let coarse =
            OutputWriter::create(&config.coarse_output, config.writer_queue_depth).await?;
        let mut flusher = DualResolutionFlusher::new(full, coarse, start, config.coarse_every);

        loop {
            let signal = scheduler.run_round(&mut store).await?;
            flusher.flush(signal, &mut store).await?;
            if signal.is_terminal() {
                break;
            }
        }

        let totals = flusher.totals().unwrap_or_default();
        let sources = scheduler.source_stats();
        let stats = MergeStats {
            rounds: scheduler.rounds(),
            lines: sources.iter().map(|source| source.lines).sum(),
            late_lines: store.late_lines(),
            buckets: totals.buckets,
            first_minute: scheduler.base(),
            full_bytes: totals.full_bytes,
            coarse_bytes: totals.coarse_bytes,
            distinct_stamps: scheduler.indexer().cached(),
            sources,
        };
        info!(
            "merged {} lines into {} minutes over {} rounds ({} late)",
            stats.lines, stats.buckets, stats.rounds, stats.late_lines
        );
        Ok(stats)
    }
}

/// Runs a merge with `config`.
pub async fn merge(config: MergeConfig) -> Result<MergeStats> {
    LogMerger::new(config).run().await
}
