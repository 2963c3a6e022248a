//! Source adapter trait definition and shared error types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use chronicle_core::{Event, TimeSpan};

/// Errors raised by source adapters.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("configuration error for source '{source_name}': {message}")]
    Config { source_name: String, message: String },

    #[error("fetch failed for source '{source_name}': {message}")]
    Fetch { source_name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SourceError {
    pub fn config(source_name: &str, message: impl Into<String>) -> Self {
        Self::Config {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn fetch(source_name: &str, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Configuration problems disable the source; everything else only
    /// fails the span being fetched.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

/// A pluggable origin of activity events.
///
/// Adapters only return the events inside the requested span. Deduplication
/// and coverage bookkeeping belong to the caller.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name, used as the partition key for stored events and coverage.
    fn identifier(&self) -> &str;

    /// Validate and apply this adapter's options (a table from the config file,
    /// or `null` when the file has none).
    fn configure(&mut self, options: &serde_json::Value) -> Result<(), SourceError>;

    /// Fetch every event whose timestamp lies within `span` (closed).
    async fn fetch(&self, span: &TimeSpan) -> Result<Vec<Event>, SourceError>;
}

/// Deserialize an adapter's typed options, treating a missing table as empty.
pub fn typed_options<T: DeserializeOwned>(
    source_name: &str,
    options: &serde_json::Value,
) -> Result<T, SourceError> {
    let value = match options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| SourceError::config(source_name, e.to_string()))
}
