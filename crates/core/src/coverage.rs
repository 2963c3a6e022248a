//! Coverage tracking: which parts of time a source has already been scanned.
//!
//! A [`CoverageSet`] keeps its spans sorted by start, pairwise disjoint and
//! never adjacent. Time is counted in whole seconds, so `[a,b]` and `[b,c]`
//! collapse into `[a,c]`, and so do `[a,b]` and `[b+1s,c]`: no instant lies
//! between them. Otherwise every run would keep re-requesting the seam.
//!
//! Gaps returned by [`uncovered_spans`] are closed and share their boundary
//! instants with the neighbouring covered spans. With coverage `[01-01, 01-10]`
//! a request for `[01-05, 01-20]` yields `[01-10, 01-20]`. Re-fetching the
//! shared instant is harmless because event inserts are idempotent, and it
//! lets the fetched gap merge back into one contiguous span.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::span::TimeSpan;

/// Whether a span ending at `end` and one starting at `start` leave no
/// whole second uncovered between them.
fn adjoins(end: DateTime<Utc>, start: DateTime<Utc>) -> bool {
    start <= end + Duration::seconds(1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoverageSet {
    spans: Vec<TimeSpan>,
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary spans (any order, overlapping or touching).
    ///
    /// Used when reading persisted rows, which are not trusted to be minimal.
    pub fn from_spans(spans: impl IntoIterator<Item = TimeSpan>) -> Self {
        let mut sorted: Vec<TimeSpan> = spans.into_iter().collect();
        sorted.sort();

        let mut normalized: Vec<TimeSpan> = Vec::with_capacity(sorted.len());
        for span in sorted {
            match normalized.last_mut() {
                Some(last) if adjoins(last.end(), span.start()) => *last = last.hull(&span),
                _ => normalized.push(span),
            }
        }
        Self { spans: normalized }
    }

    pub fn spans(&self) -> &[TimeSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether the instant `ts` has been scanned.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let idx = self.spans.partition_point(|s| s.end() < ts);
        self.spans.get(idx).is_some_and(|s| s.contains(ts))
    }

    /// Whether all of `span` has been scanned.
    pub fn covers(&self, span: &TimeSpan) -> bool {
        let idx = self.spans.partition_point(|s| s.end() < span.start());
        self.spans.get(idx).is_some_and(|s| s.contains_span(span))
    }

    /// The covered parts of `requested` (`C ∩ R`), ascending.
    pub fn intersect(&self, requested: &TimeSpan) -> Vec<TimeSpan> {
        let first = self.spans.partition_point(|s| s.end() < requested.start());
        self.spans[first..]
            .iter()
            .take_while(|s| s.start() <= requested.end())
            .filter_map(|s| s.intersection(requested))
            .collect()
    }

    pub fn uncovered(&self, requested: &TimeSpan) -> Vec<TimeSpan> {
        uncovered_spans(self, requested)
    }

    pub fn merge(&self, span: TimeSpan) -> CoverageSet {
        merge(self, span)
    }

    /// Total scanned time across all spans.
    pub fn total_duration(&self) -> chrono::Duration {
        self.spans
            .iter()
            .fold(chrono::Duration::zero(), |acc, s| acc + s.duration())
    }
}

impl FromIterator<TimeSpan> for CoverageSet {
    fn from_iter<I: IntoIterator<Item = TimeSpan>>(iter: I) -> Self {
        Self::from_spans(iter)
    }
}

/// Sub-spans of `requested` not yet covered by `existing`, ascending.
///
/// Returns nothing when `requested` is fully covered and `[requested]` when
/// nothing in `existing` touches it. Linear in the spans overlapping
/// `requested` after a binary search for the first one.
pub fn uncovered_spans(existing: &CoverageSet, requested: &TimeSpan) -> Vec<TimeSpan> {
    let mut gaps = Vec::new();
    let mut cursor = requested.start();
    // Whether the instant at `cursor` is already scanned.
    let mut cursor_covered = false;

    let first = existing
        .spans
        .partition_point(|s| s.end() < requested.start());
    for span in &existing.spans[first..] {
        if span.start() > requested.end() {
            break;
        }
        if span.start() > cursor {
            gaps.push(TimeSpan::from_ordered(cursor, span.start()));
        }
        if span.end() >= requested.end() {
            return gaps;
        }
        cursor = cursor.max(span.end());
        cursor_covered = true;
    }

    if cursor < requested.end() || !cursor_covered {
        gaps.push(TimeSpan::from_ordered(cursor, requested.end()));
    }
    gaps
}

/// Insert `new_span`, coalescing every span it overlaps or adjoins.
///
/// Idempotent, and the final set does not depend on merge order.
pub fn merge(existing: &CoverageSet, new_span: TimeSpan) -> CoverageSet {
    let mut spans = Vec::with_capacity(existing.spans.len() + 1);
    let mut pending = new_span;
    let mut placed = false;

    for span in &existing.spans {
        if placed || !adjoins(span.end(), pending.start()) {
            spans.push(*span);
        } else if !adjoins(pending.end(), span.start()) {
            spans.push(pending);
            spans.push(*span);
            placed = true;
        } else {
            pending = pending.hull(span);
        }
    }
    if !placed {
        spans.push(pending);
    }

    CoverageSet { spans }
}
