//! Per-minute line buffers ("carriages").
//!
//! # Design
//!
//! - One bucket per [`MinuteIndex`], created lazily on first append
//! - Capacity grows by exactly one block per step, never geometrically
//! - Buckets are drained in index order; draining seals the bucket and every
//!   index below it
//! - Appends to sealed buckets are late data: dropped, logged, counted
//!
//! Only the trailing window between the seal horizon and the most advanced
//! source is resident, so the map stays small.

use std::collections::BTreeMap;

use log::warn;

use crate::timestamp::MinuteIndex;

/// Default capacity step of a bucket buffer (8 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// No data has arrived yet.
    Unborn,
    /// Holds data and accepts appends.
    Open,
    /// Drained; further appends are late data.
    Sealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    Late,
}

#[derive(Debug, Default)]
struct Bucket {
    buf: Vec<u8>,
}

impl Bucket {
    fn push(&mut self, line: &[u8], block_size: usize) {
        let needed = self.buf.len() + line.len();
        let capacity = self.buf.capacity();
        if needed > capacity {
            let blocks = (needed - capacity).div_ceil(block_size);
            self.buf.reserve_exact(capacity + blocks * block_size - self.buf.len());
        }
        self.buf.extend_from_slice(line);
    }
}

pub struct BucketStore {
    buckets: BTreeMap<MinuteIndex, Bucket>,
    /// Every index below this is sealed.
    sealed_below: MinuteIndex,
    highest: Option<MinuteIndex>,
    block_size: usize,
    late_lines: u64,
}

impl BucketStore {
    /// Creates a store whose first unsealed minute is `floor`.
    pub fn new(floor: MinuteIndex, block_size: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            sealed_below: floor,
            highest: None,
            block_size: block_size.max(1),
            late_lines: 0,
        }
    }

    pub fn append(&mut self, index: MinuteIndex, line: &[u8]) -> AppendOutcome {
        if index < self.sealed_below {
            self.late_lines += 1;
            warn!(
                "dropping late line for sealed minute {index}: {}",
                String::from_utf8_lossy(line).trim_end()
            );
            return AppendOutcome::Late;
        }

        let block_size = self.block_size;
        self.buckets
            .entry(index)
            .or_default()
            .push(line, block_size);
        self.highest = Some(self.highest.map_or(index, |highest| highest.max(index)));
        AppendOutcome::Stored
    }

    /// Takes the bucket's bytes and seals it, along with every index below it.
    ///
    /// Returns `None` when the bucket never received data or was already drained.
    pub fn drain(&mut self, index: MinuteIndex) -> Option<Vec<u8>> {
        let bucket = self.buckets.remove(&index);
        if index >= self.sealed_below {
            self.sealed_below = index + 1;
            // Anything left below the new horizon can never be flushed.
            let retained = self.buckets.split_off(&self.sealed_below);
            let stranded = std::mem::replace(&mut self.buckets, retained);
            if !stranded.is_empty() {
                warn!(
                    "discarding {} unflushed buckets below minute {}",
                    stranded.len(),
                    self.sealed_below
                );
            }
        }
        bucket.map(|bucket| bucket.buf).filter(|buf| !buf.is_empty())
    }

    pub fn state(&self, index: MinuteIndex) -> BucketState {
        if index < self.sealed_below {
            BucketState::Sealed
        } else if self.buckets.contains_key(&index) {
            BucketState::Open
        } else {
            BucketState::Unborn
        }
    }

    /// One past the highest minute that ever received data, or the seal
    /// horizon when nothing was stored.
    pub fn bucket_end(&self) -> MinuteIndex {
        match self.highest {
            Some(highest) => (highest + 1).max(self.sealed_below),
            None => self.sealed_below,
        }
    }

    pub fn sealed_below(&self) -> MinuteIndex {
        self.sealed_below
    }

    pub fn resident(&self) -> usize {
        self.buckets.len()
    }

    pub fn resident_bytes(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.buf.len()).sum()
    }

    pub fn late_lines(&self) -> u64 {
        self.late_lines
    }

    #[cfg(test)]
    fn capacity(&self, index: MinuteIndex) -> Option<usize> {
        self.buckets.get(&index).map(|bucket| bucket.buf.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_unborn_open_sealed() {
        let mut store = BucketStore::new(10, 64);
        assert_eq!(store.state(10), BucketState::Unborn);
        assert_eq!(store.append(10, b"a\n"), AppendOutcome::Stored);
        assert_eq!(store.state(10), BucketState::Open);
        assert_eq!(store.drain(10), Some(b"a\n".to_vec()));
        assert_eq!(store.state(10), BucketState::Sealed);
        assert_eq!(store.state(9), BucketState::Sealed);
        assert_eq!(store.state(11), BucketState::Unborn);
        assert_eq!(store.resident(), 0);
    }

    #[test]
    fn appends_concatenate_in_order() {
        let mut store = BucketStore::new(0, 64);
        store.append(3, b"first\n");
        store.append(1, b"other\n");
        store.append(3, b"second\n");
        assert_eq!(store.resident(), 2);
        assert_eq!(store.resident_bytes(), 19);
        assert_eq!(store.drain(1), Some(b"other\n".to_vec()));
        assert_eq!(store.drain(2), None);
        assert_eq!(store.drain(3), Some(b"first\nsecond\n".to_vec()));
    }

    #[test]
    fn grows_one_block_at_a_time() {
        let mut store = BucketStore::new(0, 8);
        store.append(0, b"12345");
        assert_eq!(store.capacity(0), Some(8));
        store.append(0, b"678");
        assert_eq!(store.capacity(0), Some(8));
        // 11 more bytes need two further blocks, not a doubling.
        store.append(0, b"90123456789");
        assert_eq!(store.capacity(0), Some(24));
        store.append(0, b"0123456");
        assert_eq!(store.capacity(0), Some(32));
        assert_eq!(store.drain(0), Some(b"12345678901234567890123456".to_vec()));
    }

    #[test]
    fn late_data_is_dropped() {
        let mut store = BucketStore::new(0, 64);
        store.append(0, b"on time\n");
        store.drain(0);
        assert_eq!(store.append(0, b"late\n"), AppendOutcome::Late);
        assert_eq!(store.append(-5, b"before start\n"), AppendOutcome::Late);
        assert_eq!(store.late_lines(), 2);
        assert_eq!(store.resident(), 0);
        assert_eq!(store.drain(0), None);
    }

    #[test]
    fn data_below_the_floor_is_late() {
        let mut store = BucketStore::new(100, 64);
        assert_eq!(store.append(99, b"early\n"), AppendOutcome::Late);
        assert_eq!(store.bucket_end(), 100);
    }

    #[test]
    fn bucket_end_tracks_highest_touch() {
        let mut store = BucketStore::new(5, 64);
        assert_eq!(store.bucket_end(), 5);
        store.append(7, b"x\n");
        store.append(6, b"y\n");
        assert_eq!(store.bucket_end(), 8);
        for index in 5..8 {
            store.drain(index);
        }
        assert_eq!(store.bucket_end(), 8);
        assert_eq!(store.sealed_below(), 8);
    }
}
