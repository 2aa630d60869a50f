//! `Range` request header parsing and evaluation (RFC 7233, `bytes` unit only).
//!
//! Parsing is lenient per entry and strict per header: a header whose
//! unit is not `bytes`, or that has no `=`, yields no [`RangeSet`] at all, while
//! individual entries that are not integers or are structurally broken are dropped.
//! Whether anything is left to serve is decided later by
//! [`RangeSet::satisfiable`] against the actual resource length.

use std::fmt;

/// One `start-end`, `start-` or `-suffix` entry of a `Range` header.
///
/// For a suffix entry `start` is `None` and `end` holds the suffix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Inclusive, in-bounds byte indices of a range resolved against a resource length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Resolves open ends against `total` and returns the range if it is satisfiable.
    ///
    /// A range is satisfiable iff `0 <= start <= end <= total - 1` after resolving
    /// `start-` to the end of the resource and `-n` to the last `n` bytes. A suffix
    /// longer than the resource is not satisfiable.
    pub fn resolve(&self, total: u64) -> Option<ResolvedRange> {
        let last = total.checked_sub(1)?;
        let (start, end) = match (self.start, self.end) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, last),
            (None, Some(suffix)) => {
                if suffix == 0 {
                    return None;
                }
                (total.checked_sub(suffix)?, last)
            }
            (None, None) => return None,
        };

        (start <= end && end <= last).then_some(ResolvedRange { start, end })
    }

    fn parse(entry: &str) -> Option<Self> {
        let (start, end) = entry.trim().split_once('-')?;
        let start = parse_index(start)?;
        let end = parse_index(end)?;
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(Self { start, end })
    }
}

/// `Ok(None)` for an empty side, `None` for anything that is not a plain integer.
fn parse_index(s: &str) -> Option<Option<u64>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(None);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().map(Some)
}

impl ResolvedRange {
    /// Number of bytes covered, always at least one.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for this range, e.g. `bytes 0-499/1234`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The entries of one `Range` header, in the order they were written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    /// Parses a `Range` header value such as `bytes=0-499,-500`.
    ///
    /// Returns `None` when the unit is not `bytes` or there is no `=`. Malformed
    /// entries are skipped, so the result may be empty.
    pub fn parse(header: &str) -> Option<Self> {
        let (unit, entries) = header.trim().split_once('=')?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return None;
        }

        let ranges = entries.split(',').filter_map(ByteRange::parse).collect();
        Some(Self { ranges })
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The satisfiable entries resolved against `total`, unsatisfiable ones dropped.
    pub fn satisfiable(&self, total: u64) -> Vec<ResolvedRange> {
        self.ranges.iter().filter_map(|range| range.resolve(total)).collect()
    }
}
