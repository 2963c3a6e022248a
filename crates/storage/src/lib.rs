pub mod coverage;
pub mod error;
pub mod events;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use chronicle_core::config::StorageConfig;
use chronicle_core::{CoverageSet, Event};

pub use coverage::CoverageStore;
pub use error::StorageError;
pub use events::{EventFilter, EventStore};

/// Outcome of committing one fetched span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanWrite {
    /// Events that were new to the store.
    pub inserted: usize,
    /// Events that already existed and were absorbed.
    pub duplicates: usize,
}

/// Handle to the local SQLite database, opened once per run.
///
/// Uses a single-connection pool: the tool runs one reconciliation at a time
/// and the in-memory database used by tests only exists per connection.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database configured in `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::open_path(&config.database_path).await
    }

    pub async fn open_path(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!("Storage: sqlite database at {}", path.display());
        Self::init(pool).await
    }

    /// A private, empty in-memory database.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn load_coverage(&self, source: &str) -> Result<CoverageSet, StorageError> {
        CoverageStore::load(&self.pool, source).await
    }

    /// Replace the coverage set for `source` in its own transaction.
    pub async fn save_coverage(
        &self,
        source: &str,
        coverage: &CoverageSet,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        CoverageStore::save(&mut *tx, source, coverage).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store `events` and replace the coverage of `source` atomically.
    ///
    /// Either both the events and the new coverage become visible, or
    /// neither does; coverage can never run ahead of the events it vouches for.
    pub async fn commit_span(
        &self,
        source: &str,
        events: &[Event],
        coverage: &CoverageSet,
    ) -> Result<SpanWrite, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for event in events {
            if EventStore::insert(&mut *tx, event).await? {
                inserted += 1;
            }
        }
        CoverageStore::save(&mut *tx, source, coverage).await?;
        tx.commit().await?;

        Ok(SpanWrite {
            inserted,
            duplicates: events.len() - inserted,
        })
    }

    /// Close the pool, flushing any pending writes.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
