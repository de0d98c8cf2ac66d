//! Error types for the storage layer.

use hybridsync_types::Table;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// The database stayed locked for longer than the busy timeout.
    #[error("database is busy")]
    Busy,

    /// A unique field collides with an existing row. Callers are expected
    /// to surface this to the user.
    #[error("{table}.{field} value '{value}' already exists")]
    Validation {
        table: Table,
        field: String,
        value: String,
    },

    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Error from the shared type layer.
    #[error(transparent)]
    Types(#[from] hybridsync_types::Error),
}

impl StoreError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Busy,
            _ => StoreError::Database(err),
        }
    }
}
