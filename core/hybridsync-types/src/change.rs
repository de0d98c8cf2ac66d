//! Queue entry types for local mutations awaiting push.
//!
//! A [`PendingChange`] is the durable record of one local mutation that has
//! not yet been confirmed by the remote store. Its dedupe identity is the
//! triple returned by [`PendingChange::dedupe_key`].

use crate::{ChangeId, Error, Fields, RecordId, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of mutation a queue entry replays remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Stored representation (`INSERT`, `UPDATE`, `DELETE`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    /// Whether a duplicate-key rejection for this operation means "already applied".
    pub const fn duplicate_is_success(self) -> bool {
        matches!(self, Operation::Insert | Operation::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Waiting for the next push attempt.
    Pending,
    /// Confirmed remotely. Confirmed entries are normally deleted instead.
    Synced,
    /// Excluded from automatic retries until an operator requeues it.
    Parked,
}

impl ChangeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Synced => "synced",
            ChangeStatus::Parked => "parked",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChangeStatus::Pending),
            "synced" => Ok(ChangeStatus::Synced),
            "parked" => Ok(ChangeStatus::Parked),
            // Older queues used "failed" for what is now "parked".
            "failed" => Ok(ChangeStatus::Parked),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// A mutation to be enqueued. The queue assigns the id and bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChange {
    pub table: Table,
    pub operation: Operation,
    pub record_id: RecordId,
    /// Full row for INSERT/UPDATE, empty for DELETE.
    pub payload: Fields,
    pub created_at: DateTime<Utc>,
}

impl NewChange {
    /// Creates a change stamped with the current time.
    pub fn new(table: Table, operation: Operation, record_id: RecordId, payload: Fields) -> Self {
        let payload = match operation {
            Operation::Delete => Fields::new(),
            _ => payload,
        };
        Self {
            table,
            operation,
            record_id,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// A durable queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: ChangeId,
    pub table: Table,
    pub operation: Operation,
    pub record_id: RecordId,
    pub payload: Fields,
    pub retry_count: u32,
    pub status: ChangeStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PendingChange {
    /// Identity used for dedupe: once one entry for this triple succeeds,
    /// every queued entry with the same triple is cleared.
    pub fn dedupe_key(&self) -> (Table, RecordId, Operation) {
        (self.table, self.record_id, self.operation)
    }
}
