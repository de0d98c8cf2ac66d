//! Error types for the sync layer.

use hybridsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote store could not be reached (refused, DNS, timeout).
    #[error("remote unreachable: {0}")]
    Connectivity(String),

    /// The remote rejected a write because an equivalent row already exists.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// The remote rejected a write because a referenced row is missing.
    #[error("referential conflict: {0}")]
    Referential(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Any other error reported by the remote store.
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// How the push path reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Remote unreachable: stop the cycle and go offline.
    Connectivity,
    /// Already applied remotely.
    Duplicate,
    /// Cannot succeed until the referenced row exists. Parked at once.
    Referential,
    /// Worth retrying up to the cap.
    Transient,
}

impl SyncError {
    /// Classifies the error for the push path.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Connectivity(_) => FailureKind::Connectivity,
            SyncError::Duplicate(_) => FailureKind::Duplicate,
            SyncError::Referential(_) => FailureKind::Referential,
            _ => FailureKind::Transient,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        self.kind() == FailureKind::Connectivity
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
