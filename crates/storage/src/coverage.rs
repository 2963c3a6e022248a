//! The `plugin_scans` table: per-source scanned time spans.
//!
//! The rows for a source are always read and written as a whole set.
//! [`CoverageStore::save`] replaces every row for the source, so the stored
//! rows mirror the in-memory [`CoverageSet`] exactly. Rows written by older
//! releases may overlap; [`CoverageStore::load`] normalizes them.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::debug;

use chronicle_core::{format_timestamp, CoverageSet, TimeSpan};

use crate::error::StorageError;

pub struct CoverageStore;

impl CoverageStore {
    /// The full coverage set for `source` (empty if never scanned).
    pub async fn load<'e, E>(executor: E, source: &str) -> Result<CoverageSet, StorageError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(
            "SELECT start_time, end_time FROM plugin_scans
             WHERE plugin_name = ?
             ORDER BY start_time",
        )
        .bind(source)
        .fetch_all(executor)
        .await?;

        let spans = rows
            .iter()
            .map(row_to_span)
            .collect::<Result<Vec<_>, _>>()?;
        let set = CoverageSet::from_spans(spans);

        if set.len() != rows.len() {
            debug!(
                source,
                rows = rows.len(),
                spans = set.len(),
                "normalized overlapping coverage rows"
            );
        }
        Ok(set)
    }

    /// Replace all coverage rows for `source` with `coverage`.
    ///
    /// Runs several statements; callers wrap it in a transaction.
    pub async fn save(
        conn: &mut SqliteConnection,
        source: &str,
        coverage: &CoverageSet,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM plugin_scans WHERE plugin_name = ?")
            .bind(source)
            .execute(&mut *conn)
            .await?;

        for span in coverage.spans() {
            sqlx::query(
                "INSERT INTO plugin_scans (plugin_name, start_time, end_time)
                 VALUES (?, ?, ?)",
            )
            .bind(source)
            .bind(format_timestamp(span.start()))
            .bind(format_timestamp(span.end()))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Names of all sources with recorded coverage, sorted.
    pub async fn sources(pool: &SqlitePool) -> Result<Vec<String>, StorageError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT plugin_name FROM plugin_scans ORDER BY plugin_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(names)
    }

    /// Forget everything scanned for `source`. Returns the number of rows removed.
    pub async fn clear(pool: &SqlitePool, source: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM plugin_scans WHERE plugin_name = ?")
            .bind(source)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_span(row: &SqliteRow) -> Result<TimeSpan, StorageError> {
    let start: String = row.try_get("start_time")?;
    let end: String = row.try_get("end_time")?;
    TimeSpan::parse(&start, &end).map_err(|source| StorageError::Corrupt {
        table: "plugin_scans",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn span(start: &str, end: &str) -> TimeSpan {
        TimeSpan::parse(start, end).unwrap()
    }

    #[tokio::test]
    async fn test_load_unknown_source_is_empty() {
        let store = Store::open_in_memory().await.unwrap();
        let set = CoverageStore::load(store.pool(), "chrome").await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let first = CoverageSet::from_spans([
            span("2024-01-01", "2024-01-03"),
            span("2024-01-06", "2024-01-08"),
        ]);
        store.save_coverage("chrome", &first).await.unwrap();

        let second = first.merge(span("2024-01-03", "2024-01-06"));
        store.save_coverage("chrome", &second).await.unwrap();

        let loaded = CoverageStore::load(store.pool(), "chrome").await.unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.spans(), &[span("2024-01-01", "2024-01-08")]);

        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM plugin_scans WHERE plugin_name = 'chrome'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_sources_are_partitioned() {
        let store = Store::open_in_memory().await.unwrap();
        let chrome = CoverageSet::from_spans([span("2024-01-01", "2024-01-03")]);
        let dummy = CoverageSet::from_spans([span("2024-02-01", "2024-02-03")]);
        store.save_coverage("chrome", &chrome).await.unwrap();
        store.save_coverage("dummy", &dummy).await.unwrap();

        assert_eq!(CoverageStore::load(store.pool(), "chrome").await.unwrap(), chrome);
        assert_eq!(CoverageStore::load(store.pool(), "dummy").await.unwrap(), dummy);
        assert_eq!(
            CoverageStore::sources(store.pool()).await.unwrap(),
            vec!["chrome".to_string(), "dummy".to_string()]
        );

        assert_eq!(CoverageStore::clear(store.pool(), "chrome").await.unwrap(), 1);
        assert!(CoverageStore::load(store.pool(), "chrome").await.unwrap().is_empty());
        assert_eq!(CoverageStore::load(store.pool(), "dummy").await.unwrap(), dummy);
    }

    #[tokio::test]
    async fn test_load_normalizes_legacy_overlapping_rows() {
        let store = Store::open_in_memory().await.unwrap();
        // Earlier releases appended raw min/max event ranges.
        for (start, end) in [
            ("2024-01-01T08:00:00Z", "2024-01-01T18:00:00Z"),
            ("2024-01-01T12:00:00Z", "2024-01-02T09:00:00Z"),
            ("2024-01-05T08:00:00Z", "2024-01-05T09:00:00Z"),
        ] {
            sqlx::query(
                "INSERT INTO plugin_scans (plugin_name, start_time, end_time) VALUES ('chrome', ?, ?)",
            )
            .bind(start)
            .bind(end)
            .execute(store.pool())
            .await
            .unwrap();
        }

        let set = CoverageStore::load(store.pool(), "chrome").await.unwrap();
        assert_eq!(
            set.spans(),
            &[
                span("2024-01-01T08:00:00Z", "2024-01-02T09:00:00Z"),
                span("2024-01-05T08:00:00Z", "2024-01-05T09:00:00Z"),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_rejects_inverted_row() {
        let store = Store::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO plugin_scans (plugin_name, start_time, end_time)
             VALUES ('chrome', '2024-01-10T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = CoverageStore::load(store.pool(), "chrome").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { table: "plugin_scans", .. }));
    }
}
