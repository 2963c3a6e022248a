//! Chrome / Chromium browser history.
//!
//! Reads the `History` SQLite file of one or more browser profiles. The
//! browser keeps the file locked while running, so each file is copied to a
//! temporary location and the copy is opened read-only.
//!
//! Chrome stores visit times as microseconds since 1601-01-01 UTC.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Row, SqliteConnection};
use tracing::{debug, info, warn};

use chronicle_core::{Event, TimeSpan};

use crate::traits::{typed_options, SourceAdapter, SourceError};

pub const CHROME_SOURCE: &str = "chrome";

/// Seconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChromeOptions {
    /// Paths to `History` files; a leading `~/` expands to the home directory.
    pub history_paths: Vec<String>,
    /// Event type recorded for every visit.
    #[serde(default = "default_event_type")]
    pub event_type: String,
}

fn default_event_type() -> String {
    "browser-history".to_string()
}

#[derive(Debug, Default)]
pub struct ChromeSource {
    options: Option<ChromeOptions>,
}

impl ChromeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ChromeOptions) -> Self {
        Self {
            options: Some(options),
        }
    }
}

#[async_trait]
impl SourceAdapter for ChromeSource {
    fn identifier(&self) -> &str {
        CHROME_SOURCE
    }

    fn configure(&mut self, options: &serde_json::Value) -> Result<(), SourceError> {
        let options: ChromeOptions = typed_options(CHROME_SOURCE, options)?;
        if options.history_paths.is_empty() {
            return Err(SourceError::config(
                CHROME_SOURCE,
                "history_paths must list at least one History file",
            ));
        }
        if options.event_type.trim().is_empty() {
            return Err(SourceError::config(CHROME_SOURCE, "event_type must not be empty"));
        }
        self.options = Some(options);
        Ok(())
    }

    async fn fetch(&self, span: &TimeSpan) -> Result<Vec<Event>, SourceError> {
        let options = self
            .options
            .as_ref()
            .ok_or_else(|| SourceError::config(CHROME_SOURCE, "source used before configure"))?;

        let mut events = Vec::new();
        let mut files_read = 0;
        for raw in &options.history_paths {
            let path = expand_home(raw);
            if !path.exists() {
                warn!(path = %path.display(), "chrome history file not found, skipping");
                continue;
            }
            let found = read_history(&path, span, &options.event_type).await?;
            debug!(path = %path.display(), count = found.len(), %span, "read chrome history");
            events.extend(found);
            files_read += 1;
        }

        // Nothing was read, so an empty result would wrongly mark the span scanned.
        if files_read == 0 {
            return Err(SourceError::fetch(
                CHROME_SOURCE,
                "no history file found in history_paths",
            ));
        }

        info!(count = events.len(), files = files_read, %span, "chrome fetch complete");
        Ok(events)
    }
}

/// Read the visits inside `span` from one History file.
async fn read_history(
    path: &Path,
    span: &TimeSpan,
    event_type: &str,
) -> Result<Vec<Event>, SourceError> {
    let copy = tempfile::Builder::new()
        .prefix("chronicle-chrome-")
        .suffix(".sqlite")
        .tempfile()?;
    copy_history(path, copy.path())?;

    let options = SqliteConnectOptions::new()
        .filename(copy.path())
        .read_only(true);
    let mut conn = SqliteConnection::connect_with(&options).await?;

    // Closed span on whole seconds: everything up to (end + 1s), exclusive.
    let rows = sqlx::query(
        "SELECT visits.visit_time AS visit_time, urls.url AS url, urls.title AS title
         FROM visits
         JOIN urls ON urls.id = visits.url
         WHERE visits.visit_time >= ? AND visits.visit_time < ?
         ORDER BY visits.visit_time",
    )
    .bind(to_chrome_time(span.start()))
    .bind(to_chrome_time(span.end() + Duration::seconds(1)))
    .fetch_all(&mut conn)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in &rows {
        let visit_time: i64 = row.try_get("visit_time")?;
        let url: String = row.try_get("url")?;
        let title: Option<String> = row.try_get("title")?;

        let Some(timestamp) = from_chrome_time(visit_time) else {
            warn!(visit_time, url = %url, "visit time out of range, skipping");
            continue;
        };
        events.push(Event::new(
            timestamp,
            CHROME_SOURCE,
            event_type,
            format!("{} | {}", title.unwrap_or_default(), url),
        ));
    }

    conn.close().await?;
    Ok(events)
}

fn copy_history(from: &Path, to: &Path) -> Result<(), SourceError> {
    std::fs::copy(from, to).map_err(|e| {
        SourceError::fetch(
            CHROME_SOURCE,
            format!("failed to copy {}: {}", from.display(), e),
        )
    })?;
    Ok(())
}

pub fn to_chrome_time(ts: DateTime<Utc>) -> i64 {
    (ts.timestamp() + WINDOWS_EPOCH_OFFSET_SECS) * 1_000_000
}

pub fn from_chrome_time(visit_time: i64) -> Option<DateTime<Utc>> {
    let unix_micros = visit_time.checked_sub(WINDOWS_EPOCH_OFFSET_SECS * 1_000_000)?;
    DateTime::from_timestamp_micros(unix_micros)
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::parse_timestamp;

    #[test]
    fn test_chrome_time_conversion() {
        let ts = parse_timestamp("2024-01-05T10:30:00Z").unwrap();
        let chrome = to_chrome_time(ts);
        assert_eq!(chrome, (1_704_450_600 + WINDOWS_EPOCH_OFFSET_SECS) * 1_000_000);
        assert_eq!(from_chrome_time(chrome), Some(ts));
        assert_eq!(from_chrome_time(0).map(|t| t.timestamp()), Some(-WINDOWS_EPOCH_OFFSET_SECS));
    }

    #[test]
    fn test_configure_requires_history_paths() {
        let mut source = ChromeSource::new();
        let err = source.configure(&serde_json::Value::Null).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("history_paths"));

        let err = source
            .configure(&serde_json::json!({ "history_paths": [] }))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_configure_rejects_unknown_options() {
        let mut source = ChromeSource::new();
        let err = source
            .configure(&serde_json::json!({
                "history_paths": ["~/History"],
                "stop_range": "2024-01-01",
            }))
            .unwrap_err();
        assert!(err.to_string().contains("stop_range"));
    }

    #[test]
    fn test_configure_defaults_event_type() {
        let mut source = ChromeSource::new();
        source
            .configure(&serde_json::json!({ "history_paths": ["~/History"] }))
            .unwrap();
        let options = source.options.as_ref().unwrap();
        assert_eq!(options.event_type, "browser-history");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/History"), PathBuf::from("/abs/History"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x/History"), home.join("x/History"));
        }
    }

    #[tokio::test]
    async fn test_fetch_before_configure_fails() {
        let source = ChromeSource::new();
        let span = TimeSpan::parse("2024-01-01", "2024-01-02").unwrap();
        assert!(source.fetch(&span).await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_no_existing_history_file_fails_fetch() {
        let source = ChromeSource::with_options(ChromeOptions {
            history_paths: vec!["/definitely/not/here/History".to_string()],
            event_type: default_event_type(),
        });
        let span = TimeSpan::parse("2024-01-01", "2024-01-02").unwrap();
        let err = source.fetch(&span).await.unwrap_err();
        assert!(!err.is_config());
        assert!(err.to_string().contains("no history file found"));
    }
}
