//! Round-robin driver for the source readers.
//!
//! Every round advances a shared threshold by the interval and resumes each
//! active reader in source order, one at a time, until it pauses past the
//! threshold or runs dry. A round ends with a [`FlushSignal`] telling the
//! flusher how far output may safely advance.

use std::path::PathBuf;

use log::{debug, info};

use crate::bucket::BucketStore;
use crate::config::MergeConfig;
use crate::error::Result;
use crate::source::{probe_first_minute, ReadOutcome, SourceReader, SourceStats};
use crate::timestamp::{MinuteIndex, MinuteIndexer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSignal {
    /// Buckets below the bound are complete; sources are still open.
    Partial(MinuteIndex),
    /// Every source is exhausted; flush everything below the bound and close.
    Terminal(MinuteIndex),
}

impl FlushSignal {
    pub fn bound(self) -> MinuteIndex {
        match self {
            FlushSignal::Partial(bound) | FlushSignal::Terminal(bound) => bound,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlushSignal::Terminal(_))
    }
}

pub struct MergeScheduler {
    active: Vec<SourceReader>,
    finished: Vec<SourceStats>,
    indexer: MinuteIndexer,
    base: Option<MinuteIndex>,
    threshold: MinuteIndex,
    interval: MinuteIndex,
    delay: MinuteIndex,
    rounds: u64,
}

impl MergeScheduler {
    /// Opens every source and seeds the threshold from the earliest first line.
    pub async fn open(config: &MergeConfig) -> Result<Self> {
        let mut indexer = MinuteIndexer::new();
        let mut base: Option<MinuteIndex> = None;
        let mut active = Vec::with_capacity(config.sources.len());
        for path in &config.sources {
            let first = probe_first_minute(path, config.probe_buffer_size, &mut indexer).await?;
            if let Some(first) = first {
                base = Some(base.map_or(first, |base| base.min(first)));
            }
            active.push(SourceReader::open(path, config.read_buffer_size).await?);
        }
        info!("merging {} sources from minute {:?}", active.len(), base);

        Ok(Self {
            active,
            finished: Vec::new(),
            indexer,
            base,
            threshold: base.unwrap_or(0),
            interval: MinuteIndex::from(config.interval_minutes.max(1)),
            delay: MinuteIndex::from(config.delay_minutes),
            rounds: 0,
        })
    }

    /// Earliest first-line minute across sources; `None` when every source is empty.
    pub fn base(&self) -> Option<MinuteIndex> {
        self.base
    }

    pub fn threshold(&self) -> MinuteIndex {
        self.threshold
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn active_sources(&self) -> Vec<PathBuf> {
        self.active
            .iter()
            .map(|reader| reader.path().to_path_buf())
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.active.is_empty()
    }

    pub fn indexer(&self) -> &MinuteIndexer {
        &self.indexer
    }

    /// Runs one round over the active readers.
    pub async fn run_round(&mut self, store: &mut BucketStore) -> Result<FlushSignal> {
        self.threshold += self.interval;
        self.rounds += 1;

        let mut slot = 0;
        while slot < self.active.len() {
            let outcome = self.active[slot]
                .resume(self.threshold, &mut self.indexer, store)
                .await?;
            match outcome {
                ReadOutcome::Paused => slot += 1,
                // The next reader shifts into this slot and is driven this round too.
                ReadOutcome::Exhausted => {
                    let reader = self.active.remove(slot);
                    self.finished.push(reader.into_stats());
                }
            }
        }

        if self.active.is_empty() {
            return Ok(FlushSignal::Terminal(store.bucket_end()));
        }
        // Every active reader stopped on a line past the threshold, so nothing
        // at or below it is still missing except skewed stragglers.
        let bound = store.bucket_end().min(self.threshold + 1) - self.delay;
        debug!(
            "round {} threshold {} bound {} ({} active)",
            self.rounds,
            self.threshold,
            bound,
            self.active.len()
        );
        Ok(FlushSignal::Partial(bound))
    }

    /// Per-source stats, exhausted sources first.
    pub fn source_stats(&self) -> Vec<SourceStats> {
        self.finished
            .iter()
            .cloned()
            .chain(self.active.iter().map(|reader| reader.stats().clone()))
            .collect()
    }
}
