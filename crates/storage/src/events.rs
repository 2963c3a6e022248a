//! The `events` table: deduplicated activity events.
//!
//! [`EventStore`] is a stateless unit struct. Writes accept any SQLite
//! executor so they can run inside the per-span transaction; reads take the
//! pool. Uniqueness of `(timestamp, source, metadata)` is enforced by the
//! table's UNIQUE constraint, not by application checks.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor, SqlitePool};

use chronicle_core::{format_timestamp, parse_timestamp, Event, TimeSpan};

use crate::error::StorageError;

/// Row filter for [`EventStore::query`]. Bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub limit: Option<u32>,
}

impl EventFilter {
    pub fn within(span: &TimeSpan) -> Self {
        Self {
            start: Some(span.start()),
            end: Some(span.end()),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct EventStore;

impl EventStore {
    /// Insert an event. Returns `false` when an event with the same identity
    /// already exists; that is not an error.
    pub async fn insert<'e, E>(executor: E, event: &Event) -> Result<bool, StorageError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "INSERT INTO events (timestamp, source, event_type, metadata)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (timestamp, source, metadata) DO NOTHING",
        )
        .bind(format_timestamp(event.timestamp))
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(&event.metadata)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Events matching `filter`, newest first.
    pub async fn query(pool: &SqlitePool, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT timestamp, source, event_type, metadata FROM events WHERE 1=1",
        );
        if let Some(start) = filter.start {
            qb.push(" AND timestamp >= ").push_bind(format_timestamp(start));
        }
        if let Some(end) = filter.end {
            qb.push(" AND timestamp <= ").push_bind(format_timestamp(end));
        }
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Number of stored events, optionally for one source.
    pub async fn count(pool: &SqlitePool, source: Option<&str>) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE (?1 IS NULL OR source = ?1)",
        )
        .bind(source)
        .fetch_one(pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    /// Timestamp of the newest stored event, optionally for one source.
    pub async fn latest_timestamp(
        pool: &SqlitePool,
        source: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT MAX(timestamp) FROM events WHERE (?1 IS NULL OR source = ?1)",
        )
        .bind(source)
        .fetch_one(pool)
        .await?;

        raw.map(|s| parse_timestamp(&s))
            .transpose()
            .map_err(|source| StorageError::Corrupt { table: "events", source })
    }

    /// Delete every event strictly older than `cutoff`.
    pub async fn prune_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(format_timestamp(cutoff))
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Keep only the last `days_to_keep` days of events (relative to `now`).
    pub async fn apply_retention(
        pool: &SqlitePool,
        days_to_keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        if days_to_keep == 0 {
            return Err(StorageError::InvalidRetention(days_to_keep));
        }
        let cutoff = now - Duration::days(i64::from(days_to_keep));
        Self::prune_before(pool, cutoff).await
    }
}

fn row_to_event(row: &SqliteRow) -> Result<Event, StorageError> {
    let raw: String = row.try_get("timestamp")?;
    let timestamp =
        parse_timestamp(&raw).map_err(|source| StorageError::Corrupt { table: "events", source })?;
    // Rows written by older releases may carry NULL metadata.
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(Event {
        timestamp,
        source: row.try_get("source")?,
        event_type: row.try_get("event_type")?,
        metadata: metadata.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn event(at: &str, source: &str, metadata: &str) -> Event {
        Event::new(parse_timestamp(at).unwrap(), source, "browser-history", metadata)
    }

    #[tokio::test]
    async fn test_insert_twice_keeps_one_row() {
        let store = Store::open_in_memory().await.unwrap();
        let e = event("2024-01-05T10:00:00Z", "chrome", "Rust | https://rust-lang.org");

        assert!(EventStore::insert(store.pool(), &e).await.unwrap());
        assert!(!EventStore::insert(store.pool(), &e).await.unwrap());

        assert_eq!(EventStore::count(store.pool(), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_event_type_does_not_split_identity() {
        let store = Store::open_in_memory().await.unwrap();
        let visit = event("2024-01-05T10:00:00Z", "chrome", "same");
        let mut other = visit.clone();
        other.event_type = "download".to_string();

        assert!(EventStore::insert(store.pool(), &visit).await.unwrap());
        assert!(!EventStore::insert(store.pool(), &other).await.unwrap());

        let rows = EventStore::query(store.pool(), &EventFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "browser-history");
    }

    #[tokio::test]
    async fn test_same_metadata_different_source_is_distinct() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(EventStore::insert(store.pool(), &event("2024-01-05T10:00:00Z", "chrome", "x"))
            .await
            .unwrap());
        assert!(EventStore::insert(store.pool(), &event("2024-01-05T10:00:00Z", "firefox", "x"))
            .await
            .unwrap());
        assert_eq!(EventStore::count(store.pool(), None).await.unwrap(), 2);
        assert_eq!(EventStore::count(store.pool(), Some("chrome")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_filters() {
        let store = Store::open_in_memory().await.unwrap();
        for (at, source) in [
            ("2024-01-01T09:00:00Z", "chrome"),
            ("2024-01-03T09:00:00Z", "chrome"),
            ("2024-01-02T09:00:00Z", "chrome"),
            ("2024-01-02T10:00:00Z", "dummy"),
            ("2024-01-10T09:00:00Z", "chrome"),
        ] {
            EventStore::insert(store.pool(), &event(at, source, at)).await.unwrap();
        }

        let all = EventStore::query(store.pool(), &EventFilter::default()).await.unwrap();
        let stamps: Vec<_> = all.iter().map(|e| format_timestamp(e.timestamp)).collect();
        assert_eq!(
            stamps,
            vec![
                "2024-01-10T09:00:00Z",
                "2024-01-03T09:00:00Z",
                "2024-01-02T10:00:00Z",
                "2024-01-02T09:00:00Z",
                "2024-01-01T09:00:00Z",
            ]
        );

        let span = TimeSpan::parse("2024-01-02T09:00:00Z", "2024-01-03T09:00:00Z").unwrap();
        let filter = EventFilter::within(&span).with_source("chrome");
        let hits = EventStore::query(store.pool(), &filter).await.unwrap();
        assert_eq!(hits.len(), 2, "bounds are inclusive on both ends");
        assert!(hits.iter().all(|e| e.source == "chrome"));

        let limited = EventStore::query(store.pool(), &EventFilter::default().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(format_timestamp(limited[0].timestamp), "2024-01-10T09:00:00Z");
    }

    #[tokio::test]
    async fn test_latest_timestamp() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(EventStore::latest_timestamp(store.pool(), None).await.unwrap(), None);

        EventStore::insert(store.pool(), &event("2024-01-01T09:00:00Z", "chrome", "a"))
            .await
            .unwrap();
        EventStore::insert(store.pool(), &event("2024-01-04T09:00:00Z", "dummy", "b"))
            .await
            .unwrap();

        let latest = EventStore::latest_timestamp(store.pool(), Some("chrome")).await.unwrap();
        assert_eq!(latest, Some(parse_timestamp("2024-01-01T09:00:00Z").unwrap()));
        let latest = EventStore::latest_timestamp(store.pool(), None).await.unwrap();
        assert_eq!(latest, Some(parse_timestamp("2024-01-04T09:00:00Z").unwrap()));
    }

    #[tokio::test]
    async fn test_retention_prunes_old_events() {
        let store = Store::open_in_memory().await.unwrap();
        EventStore::insert(store.pool(), &event("2024-01-01T00:00:00Z", "chrome", "old"))
            .await
            .unwrap();
        EventStore::insert(store.pool(), &event("2024-03-01T00:00:00Z", "chrome", "new"))
            .await
            .unwrap();

        let now = parse_timestamp("2024-03-10T00:00:00Z").unwrap();
        let deleted = EventStore::apply_retention(store.pool(), 30, now).await.unwrap();
        assert_eq!(deleted, 1);

        let left = EventStore::query(store.pool(), &EventFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].metadata, "new");
    }

    #[tokio::test]
    async fn test_retention_rejects_zero_days() {
        let store = Store::open_in_memory().await.unwrap();
        let err = EventStore::apply_retention(store.pool(), 0, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRetention(0)));
    }

    #[tokio::test]
    async fn test_legacy_null_metadata_reads_as_empty() {
        let store = Store::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO events (timestamp, source, event_type, metadata)
             VALUES ('2024-01-01T00:00:00Z', 'chrome', 'browser-history', NULL)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let rows = EventStore::query(store.pool(), &EventFilter::default()).await.unwrap();
        assert_eq!(rows[0].metadata, "");
    }
}
