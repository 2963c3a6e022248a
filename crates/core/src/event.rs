use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::span::normalize;

/// A single timestamped activity record produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Descriptive only; not part of [`EventKey`].
    pub event_type: String,
    pub metadata: String,
}

/// The deduplication identity of an event: `(timestamp, source, metadata)`.
///
/// Two events with equal keys are the same event no matter how often they
/// are fetched, even if their `event_type` differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub metadata: String,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: normalize(timestamp),
            source: source.into(),
            event_type: event_type.into(),
            metadata: metadata.into(),
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            timestamp: normalize(self.timestamp),
            source: self.source.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::parse_timestamp;

    #[test]
    fn event_type_is_not_part_of_identity() {
        let at = parse_timestamp("2024-03-01T08:00:00Z").unwrap();
        let visit = Event::new(at, "chrome", "browser-history", "Docs | https://docs.rs");
        let download = Event::new(at, "chrome", "download", "Docs | https://docs.rs");
        assert_ne!(visit, download);
        assert_eq!(visit.key(), download.key());
    }

    #[test]
    fn new_normalizes_timestamp() {
        let at = parse_timestamp("2024-03-01T08:00:00Z").unwrap();
        let fractional = at + chrono::Duration::milliseconds(750);
        let event = Event::new(fractional, "chrome", "browser-history", "x");
        assert_eq!(event.timestamp, at);
    }
}
