//! Core type definitions for hybridsync.
//!
//! This crate defines the plain data types shared by the local store and
//! the sync engine:
//! - Record and queue identifiers
//! - The fixed set of synchronized [`Table`]s and their column metadata
//! - Queue entries ([`PendingChange`]) and their [`Operation`]/[`ChangeStatus`]
//! - Typed business entities and the [`Entity`] conversion trait

mod change;
mod entity;
mod ids;
mod record;
mod table;

pub use change::{ChangeStatus, NewChange, Operation, PendingChange};
pub use entity::{AttendanceEntry, Employee, Entity, Holiday, Location, Setting, User};
pub use ids::{ChangeId, RecordId};
pub use record::{Fields, Record, fields_differ, values_equal};
pub use table::Table;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown change status: {0}")]
    UnknownStatus(String),

    #[error("{0} entity did not serialize to a JSON object")]
    NotAnObject(Table),
}
