//! Minute indexing for access-log timestamps.
//!
//! Lines carry an Apache common-log timestamp such as
//! `[10/Oct/2000:13:55:36 -0700]` as their first bracketed token. Only the
//! `DD/Mon/YYYY:HH:MM` prefix is significant: seconds and the zone offset are
//! ignored and the text is read as UTC, so [`format_minute`] reproduces the
//! same text for bucket headers.

use std::collections::HashMap;

use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Minutes since the Unix epoch.
pub type MinuteIndex = i64;

/// Width of the `DD/Mon/YYYY:HH:MM` text following the opening bracket.
pub const STAMP_LEN: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("no opening bracket")]
    MissingBracket,
    #[error("timestamp truncated")]
    Truncated,
    #[error("invalid timestamp {0:?}")]
    InvalidDate(String),
}

/// Resolves lines to their [`MinuteIndex`], memoized by the raw timestamp text.
///
/// Bursts of traffic share a minute, so most lookups are cache hits. The cache
/// is never evicted; it grows with the number of distinct minutes in a run.
#[derive(Debug, Default)]
pub struct MinuteIndexer {
    cache: HashMap<[u8; STAMP_LEN], MinuteIndex>,
    hits: u64,
}

impl MinuteIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&mut self, line: &[u8]) -> Result<MinuteIndex, TimestampError> {
        let stamp = stamp_of(line)?;
        if let Some(index) = self.cache.get(&stamp) {
            self.hits += 1;
            return Ok(*index);
        }
        let index = parse_stamp(&stamp)?;
        self.cache.insert(stamp, index);
        Ok(index)
    }

    /// Number of distinct timestamps parsed so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

fn stamp_of(line: &[u8]) -> Result<[u8; STAMP_LEN], TimestampError> {
    let open = line
        .iter()
        .position(|&byte| byte == b'[')
        .ok_or(TimestampError::MissingBracket)?;
    let start = open + 1;
    line.get(start..start + STAMP_LEN)
        .and_then(|stamp| stamp.try_into().ok())
        .ok_or(TimestampError::Truncated)
}

/// Parses `DD/Mon/YYYY:HH:MM` into minutes since the epoch.
///
/// Pre-epoch minutes are negative (floor division), matching calendar arithmetic.
pub fn parse_stamp(stamp: &[u8]) -> Result<MinuteIndex, TimestampError> {
    let invalid = || TimestampError::InvalidDate(String::from_utf8_lossy(stamp).into_owned());
    let text = std::str::from_utf8(stamp).map_err(|_| invalid())?;
    let parsed = PrimitiveDateTime::parse(
        text,
        format_description!("[day]/[month repr:short]/[year]:[hour]:[minute]"),
    )
    .map_err(|_| invalid())?;
    Ok(parsed.assume_utc().unix_timestamp().div_euclid(60))
}

/// Renders a minute as `DD/Mon/YYYY:HH:MM`, or `None` if it is outside the calendar range.
pub fn format_minute(index: MinuteIndex) -> Option<String> {
    let seconds = index.checked_mul(60)?;
    let moment = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    moment
        .format(format_description!(
            "[day]/[month repr:short]/[year]:[hour]:[minute]"
        ))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_2020: MinuteIndex = 1_577_836_800 / 60;

    #[test]
    fn indexes_apache_timestamp() {
        let mut indexer = MinuteIndexer::new();
        let line = b"127.0.0.1 - frank [01/Jan/2020:00:00:36 -0700] \"GET / HTTP/1.0\" 200 2326\n";
        assert_eq!(indexer.index(line), Ok(JAN_2020));
    }

    #[test]
    fn seconds_do_not_change_the_minute() {
        let mut indexer = MinuteIndexer::new();
        let first = indexer.index(b"a [01/Jan/2020:00:05:01 +0000] x\n").unwrap();
        let second = indexer.index(b"b [01/Jan/2020:00:05:59 +0000] y\n").unwrap();
        assert_eq!(first, JAN_2020 + 5);
        assert_eq!(first, second);
        assert_eq!(indexer.cached(), 1);
        assert_eq!(indexer.hits(), 1);
    }

    #[test]
    fn repeated_lookup_is_stable() {
        let mut indexer = MinuteIndexer::new();
        let line = b"[15/Mar/2021:12:34:56 +0000]\n";
        let fresh = indexer.index(line).unwrap();
        let cached = indexer.index(line).unwrap();
        assert_eq!(fresh, cached);
        assert_eq!(Ok(fresh), parse_stamp(b"15/Mar/2021:12:34"));
    }

    #[test]
    fn pre_epoch_minutes_floor() {
        assert_eq!(parse_stamp(b"31/Dec/1969:23:59"), Ok(-1));
        assert_eq!(parse_stamp(b"01/Jan/1970:00:00"), Ok(0));
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut indexer = MinuteIndexer::new();
        assert_eq!(
            indexer.index(b"no timestamp here\n"),
            Err(TimestampError::MissingBracket)
        );
        assert_eq!(
            indexer.index(b"x [01/Jan/20\n"),
            Err(TimestampError::Truncated)
        );
        assert!(matches!(
            indexer.index(b"x [32/Jan/2020:00:00:00 +0000]\n"),
            Err(TimestampError::InvalidDate(_))
        ));
        assert_eq!(indexer.cached(), 0);
    }

    #[test]
    fn formats_round_trip() {
        assert_eq!(format_minute(JAN_2020).as_deref(), Some("01/Jan/2020:00:00"));
        assert_eq!(format_minute(-1).as_deref(), Some("31/Dec/1969:23:59"));
        let index = parse_stamp(b"09/Oct/2000:13:55").unwrap();
        assert_eq!(format_minute(index).as_deref(), Some("09/Oct/2000:13:55"));
        assert_eq!(format_minute(MinuteIndex::MAX), None);
    }
}
