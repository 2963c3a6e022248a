use chronicle_storage::StorageError;

/// Errors that stop a reconciliation. Per-span fetch failures are not
/// errors at this level; they are collected in the report.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Store(#[from] StorageError),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("source '{source_name}' is disabled: {reason}")]
    Disabled { source_name: String, reason: String },
}
