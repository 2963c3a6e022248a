//! Closed UTC time spans and the timestamp text format shared with storage.
//!
//! All instants are normalized to whole seconds. The stored text format
//! (`YYYY-MM-DDTHH:MM:SSZ`) is fixed-width, so comparing timestamps as text
//! in SQL gives the same order as comparing them as instants.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Text layout used for every persisted timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Truncate an instant to the store's one-second resolution.
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    normalize(ts).format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp as written by this tool or typed by a user.
///
/// Accepts RFC 3339 (any offset, converted to UTC), `YYYY-MM-DD HH:MM:SS`
/// (taken as UTC) and a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(normalize(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(normalize(naive.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(start_of_day(date));
    }
    Err(CoreError::InvalidTimestamp(raw.to_string()))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last whole second of `date` (23:59:59 UTC).
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::seconds(86_399)
}

// ── TimeSpan ──────────────────────────────────────────────────

/// A closed interval `[start, end]` with `start <= end`.
///
/// The fields are private so a malformed span cannot be built; every
/// constructor validates and normalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawSpan", into = "RawSpan")]
pub struct TimeSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        let start = normalize(start);
        let end = normalize(end);
        if start > end {
            return Err(CoreError::InvalidSpan { start, end });
        }
        Ok(Self { start, end })
    }

    /// A zero-width span covering a single instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        let at = normalize(at);
        Self { start: at, end: at }
    }

    /// Build a span from two persisted/user-supplied timestamp strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, CoreError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    /// `[start of first day, 23:59:59 of last day]`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Result<Self, CoreError> {
        Self::new(start_of_day(first), end_of_day(last))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn contains_span(&self, other: &TimeSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the spans share at least one instant. Spans that only
    /// touch at an endpoint (`[a,b]`, `[b,c]`) count as overlapping.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersection(&self, other: &TimeSpan) -> Option<TimeSpan> {
        if !self.overlaps(other) {
            return None;
        }
        Some(TimeSpan {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Caller guarantees `start <= end` and whole-second instants.
    pub(crate) fn from_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Smallest span containing both.
    pub(crate) fn hull(&self, other: &TimeSpan) -> TimeSpan {
        TimeSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RawSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawSpan> for TimeSpan {
    type Error = CoreError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        TimeSpan::new(raw.start, raw.end)
    }
}

impl From<TimeSpan> for RawSpan {
    fn from(span: TimeSpan) -> Self {
        RawSpan {
            start: span.start,
            end: span.end,
        }
    }
}
