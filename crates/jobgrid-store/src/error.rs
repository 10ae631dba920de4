use thiserror::Error;

/// Errors that can occur within a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inserting or updating would create a second ACTIVE job with the
    /// same (code, group) in one cluster.
    #[error("Conflict: active job '{code}' already exists in group '{group}'")]
    Conflict { code: String, group: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
