//! Bucket flushing into the two resolution streams.
//!
//! The flusher owns the global flush cursor: the earliest minute not yet
//! written. Every flush signal drains buckets from the cursor up to the
//! signal's bound, strictly in order, each exactly once. The full stream gets
//! a `DD/Mon/YYYY:HH:MM` header before every bucket; the coarse stream gets
//! the same data but only every `coarse_every`-th header, counted from the
//! start of the run rather than aligned to the clock.

use std::sync::Arc;

use log::debug;

use crate::bucket::BucketStore;
use crate::error::{MergeError, Result};
use crate::scheduler::FlushSignal;
use crate::timestamp::{format_minute, MinuteIndex};
use crate::writer::OutputWriter;

/// Totals reported once both writers are closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushTotals {
    pub buckets: u64,
    pub full_bytes: u64,
    pub coarse_bytes: u64,
}

pub struct DualResolutionFlusher {
    full: OutputWriter,
    coarse: OutputWriter,
    cursor: MinuteIndex,
    flushed: u64,
    coarse_every: u64,
    totals: Option<FlushTotals>,
}

impl DualResolutionFlusher {
    /// `start` is the first minute to flush, normally the seeded base of the run.
    pub fn new(
        full: OutputWriter,
        coarse: OutputWriter,
        start: MinuteIndex,
        coarse_every: u64,
    ) -> Self {
        Self {
            full,
            coarse,
            cursor: start,
            flushed: 0,
            coarse_every: coarse_every.max(1),
            totals: None,
        }
    }

    /// Earliest minute not yet flushed.
    pub fn cursor(&self) -> MinuteIndex {
        self.cursor
    }

    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Set once a terminal signal has been handled.
    pub fn totals(&self) -> Option<FlushTotals> {
        self.totals
    }

    pub async fn flush(&mut self, signal: FlushSignal, store: &mut BucketStore) -> Result<()> {
        if self.totals.is_some() {
            return Err(MergeError::FlusherClosed);
        }

        let bound = signal.bound();
        let from = self.cursor;
        while self.cursor < bound {
            self.flush_bucket(store).await?;
        }
        if self.cursor > from {
            debug!(
                "flushed minutes {}..{} ({} resident)",
                from,
                self.cursor,
                store.resident()
            );
        }

        if signal.is_terminal() {
            let full_bytes = self.full.close().await?;
            let coarse_bytes = self.coarse.close().await?;
            self.totals = Some(FlushTotals {
                buckets: self.flushed,
                full_bytes,
                coarse_bytes,
            });
        }
        Ok(())
    }

    async fn flush_bucket(&mut self, store: &mut BucketStore) -> Result<()> {
        let index = self.cursor;
        let stamp = format_minute(index).ok_or(MergeError::MinuteOutOfRange(index))?;
        let header = Arc::new(format!("{stamp}\n").into_bytes());
        let data = Arc::new(store.drain(index).unwrap_or_default());

        self.full.write(Arc::clone(&header)).await?;
        self.full.write(Arc::clone(&data)).await?;
        if self.flushed % self.coarse_every == 0 {
            self.coarse.write(header).await?;
        }
        self.coarse.write(data).await?;

        self.cursor += 1;
        self.flushed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketState;
    use crate::timestamp::parse_stamp;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_every_minute_and_sparse_coarse_headers() {
        let dir = tempdir().expect("tempdir");
        let full_path = dir.path().join("total_1");
        let coarse_path = dir.path().join("total_30");
        let full = OutputWriter::create(&full_path, 8).await.expect("full");
        let coarse = OutputWriter::create(&coarse_path, 8).await.expect("coarse");

        let base = parse_stamp(b"01/Jan/2020:00:00").expect("stamp");
        let mut store = BucketStore::new(base, 64);
        store.append(base, b"a\n");
        store.append(base + 2, b"c\n");

        let mut flusher = DualResolutionFlusher::new(full, coarse, base, 2);
        flusher
            .flush(FlushSignal::Partial(base + 2), &mut store)
            .await
            .expect("partial");
        assert_eq!(flusher.cursor(), base + 2);
        assert_eq!(flusher.flushed(), 2);
        assert_eq!(store.state(base + 1), BucketState::Sealed);
        assert_eq!(store.state(base + 2), BucketState::Open);

        // A bound behind the cursor is a no-op.
        flusher
            .flush(FlushSignal::Partial(base - 10), &mut store)
            .await
            .expect("stale partial");

        flusher
            .flush(FlushSignal::Terminal(base + 3), &mut store)
            .await
            .expect("terminal");
        let totals = flusher.totals().expect("totals");
        assert_eq!(totals.buckets, 3);

        let full_text = std::fs::read_to_string(&full_path).expect("read full");
        assert_eq!(
            full_text,
            "01/Jan/2020:00:00\na\n01/Jan/2020:00:01\n01/Jan/2020:00:02\nc\n"
        );
        let coarse_text = std::fs::read_to_string(&coarse_path).expect("read coarse");
        assert_eq!(coarse_text, "01/Jan/2020:00:00\na\n01/Jan/2020:00:02\nc\n");
        assert_eq!(totals.full_bytes, full_text.len() as u64);
        assert_eq!(totals.coarse_bytes, coarse_text.len() as u64);
    }

    #[tokio::test]
    async fn rejects_flush_after_terminal() {
        let dir = tempdir().expect("tempdir");
        let full = OutputWriter::create(dir.path().join("f"), 8).await.expect("full");
        let coarse = OutputWriter::create(dir.path().join("c"), 8).await.expect("coarse");
        let mut store = BucketStore::new(0, 64);
        let mut flusher = DualResolutionFlusher::new(full, coarse, 0, 30);

        flusher
            .flush(FlushSignal::Terminal(0), &mut store)
            .await
            .expect("terminal");
        assert_eq!(flusher.totals(), Some(FlushTotals::default()));
        let err = flusher
            .flush(FlushSignal::Partial(5), &mut store)
            .await
            .expect_err("closed");
        assert!(matches!(err, MergeError::FlusherClosed));
    }
}
