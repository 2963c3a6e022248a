use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row in {table}: {source}")]
    Corrupt {
        table: &'static str,
        #[source]
        source: chronicle_core::CoreError,
    },

    #[error("invalid retention period: {0} days")]
    InvalidRetention(u32),
}
