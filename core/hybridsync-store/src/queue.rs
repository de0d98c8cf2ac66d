//! Durable queue of local mutations awaiting push.
//!
//! The queue lives in the same database file as the business tables, in
//! `sync_queue`. Entries are processed FIFO by `(created_at, id)`. Entries
//! confirmed by the remote store are deleted, never marked.

use crate::connection;
use crate::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use hybridsync_types::{ChangeId, ChangeStatus, Fields, NewChange, Operation, PendingChange, RecordId, Table};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const COLUMNS: &str = "id, table_name, operation, record_id, payload, retry_count, status, \
                       created_at, last_attempt, last_error";

/// Number of queue entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub synced: u64,
    pub parked: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.synced + self.parked
    }
}

/// Handle to the `sync_queue` table. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeQueue {
    path: PathBuf,
    busy_timeout: Duration,
}

impl ChangeQueue {
    pub(crate) fn new(path: PathBuf, busy_timeout: Duration) -> Self {
        Self { path, busy_timeout }
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    fn connect(&self) -> StoreResult<Connection> {
        connection::open(&self.path, self.busy_timeout)
    }

    /// Appends a pending entry, keeping the change's own creation time.
    pub fn enqueue(&self, change: &NewChange) -> StoreResult<ChangeId> {
        let conn = self.connect()?;
        let payload = serde_json::to_string(&change.payload)?;
        conn.execute(
            "INSERT INTO sync_queue (table_name, operation, record_id, payload, retry_count, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, 'pending', ?5)",
            params![
                change.table.name(),
                change.operation.as_str(),
                change.record_id.get(),
                payload,
                timestamp(change.created_at),
            ],
        )?;
        let id = ChangeId::new(conn.last_insert_rowid());
        debug!(
            %id,
            table = %change.table,
            op = %change.operation,
            record = %change.record_id,
            "queued change"
        );
        Ok(id)
    }

    /// Oldest pending entries first.
    pub fn fetch_pending(&self, limit: usize) -> StoreResult<Vec<PendingChange>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM sync_queue WHERE status = 'pending' ORDER BY created_at, id LIMIT ?1"
        );
        query_changes(&conn, &sql, params![to_i64(limit)])
    }

    pub fn get(&self, id: ChangeId) -> StoreResult<Option<PendingChange>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1");
        let raw = conn.query_row(&sql, [id.get()], RawChange::from_row).optional()?;
        raw.map(RawChange::into_change).transpose()
    }

    /// Deletes the entries of the dedupe triple recorded up to `through`.
    /// Entries queued after it stay. Returns how many went.
    pub fn remove_matching(
        &self,
        table: Table,
        record_id: RecordId,
        operation: Operation,
        through: ChangeId,
    ) -> StoreResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM sync_queue
             WHERE table_name = ?1 AND record_id = ?2 AND operation = ?3 AND id <= ?4",
            params![table.name(), record_id.get(), operation.as_str(), through.get()],
        )?;
        Ok(removed)
    }

    /// Counts a failed attempt. The entry is parked once its retry count
    /// reaches `max_retries`. Returns the resulting status.
    pub fn record_failure(&self, id: ChangeId, error: &str, max_retries: u32) -> StoreResult<ChangeStatus> {
        let conn = self.connect()?;
        let retries: Option<i64> = conn
            .query_row("SELECT retry_count FROM sync_queue WHERE id = ?1", [id.get()], |row| row.get(0))
            .optional()?;
        let Some(retries) = retries else {
            return Err(StoreError::NotFound(format!("queue entry {id}")));
        };
        let retries = retries + 1;
        let status = if retries >= i64::from(max_retries) {
            ChangeStatus::Parked
        } else {
            ChangeStatus::Pending
        };
        conn.execute(
            "UPDATE sync_queue SET retry_count = ?1, status = ?2, last_attempt = ?3, last_error = ?4 WHERE id = ?5",
            params![retries, status.as_str(), timestamp(Utc::now()), error, id.get()],
        )?;
        if status == ChangeStatus::Parked {
            warn!(%id, retries, error, "queue entry parked after repeated failures");
        }
        Ok(status)
    }

    /// Parks an entry immediately, without counting an attempt.
    pub fn park(&self, id: ChangeId, error: &str) -> StoreResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE sync_queue SET status = 'parked', last_attempt = ?1, last_error = ?2 WHERE id = ?3",
            params![timestamp(Utc::now()), error, id.get()],
        )?;
        Ok(changed > 0)
    }

    pub fn count(&self, status: ChangeStatus) -> StoreResult<u64> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(n.max(0).unsigned_abs())
    }

    pub fn counts(&self) -> StoreResult<QueueCounts> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n.max(0).unsigned_abs();
            match status.parse::<ChangeStatus>()? {
                ChangeStatus::Pending => counts.pending += n,
                ChangeStatus::Synced => counts.synced += n,
                ChangeStatus::Parked => counts.parked += n,
            }
        }
        Ok(counts)
    }

    /// Pending entries grouped by table name.
    pub fn pending_by_table(&self) -> StoreResult<BTreeMap<String, u64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT table_name, COUNT(*) FROM sync_queue WHERE status = 'pending' GROUP BY table_name",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut by_table = BTreeMap::new();
        for row in rows {
            let (table, n) = row?;
            by_table.insert(table, n.max(0).unsigned_abs());
        }
        Ok(by_table)
    }

    /// Most recently created entries of any status, newest first.
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<PendingChange>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {COLUMNS} FROM sync_queue ORDER BY created_at DESC, id DESC LIMIT ?1");
        query_changes(&conn, &sql, params![to_i64(limit)])
    }

    /// Deletes parked entries whose last activity is older than `older_than`.
    pub fn purge_parked(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.connect()?;
        let purged = conn.execute(
            "DELETE FROM sync_queue WHERE status = 'parked' AND COALESCE(last_attempt, created_at) < ?1",
            [timestamp(older_than)],
        )?;
        if purged > 0 {
            debug!(purged, "purged parked queue entries");
        }
        Ok(purged)
    }

    /// Moves every parked entry back to pending with a fresh retry budget.
    pub fn requeue_parked(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        Ok(conn.execute(
            "UPDATE sync_queue SET status = 'pending', retry_count = 0 WHERE status = 'parked'",
            [],
        )?)
    }

    /// Deletes every entry regardless of status.
    pub fn clear(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        Ok(conn.execute("DELETE FROM sync_queue", [])?)
    }

    /// Whether a pending entry for the triple was queued after `after`.
    pub fn has_newer(
        &self,
        table: Table,
        record_id: RecordId,
        operation: Operation,
        after: ChangeId,
    ) -> StoreResult<bool> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sync_queue
                 WHERE table_name = ?1 AND record_id = ?2 AND operation = ?3 AND id > ?4
                   AND status = 'pending'
                 LIMIT 1",
                params![table.name(), record_id.get(), operation.as_str(), after.get()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether any queued (pending or parked) entry for the record, of any
    /// operation, was queued before `before`.
    pub fn has_earlier(&self, table: Table, record_id: RecordId, before: ChangeId) -> StoreResult<bool> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sync_queue
                 WHERE table_name = ?1 AND record_id = ?2 AND id < ?3
                   AND status IN ('pending', 'parked')
                 LIMIT 1",
                params![table.name(), record_id.get(), before.get()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Lowest parked entry id per record. Entries of a record queued after
    /// its parked floor must wait until it is requeued or purged.
    pub fn parked_floors(&self) -> StoreResult<HashMap<(Table, RecordId), ChangeId>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT table_name, record_id, MIN(id) FROM sync_queue
             WHERE status = 'parked' GROUP BY table_name, record_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut floors = HashMap::new();
        for row in rows {
            let (table, record_id, id) = row?;
            floors.insert((table.parse::<Table>()?, RecordId::new(record_id)), ChangeId::new(id));
        }
        Ok(floors)
    }

    /// Record ids with a queued (pending or parked) entry for `operation`.
    pub fn queued_record_ids(&self, table: Table, operation: Operation) -> StoreResult<HashSet<RecordId>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT record_id FROM sync_queue
             WHERE table_name = ?1 AND operation = ?2 AND status IN ('pending', 'parked')",
        )?;
        let ids = stmt.query_map(params![table.name(), operation.as_str()], |row| {
            row.get::<_, i64>(0).map(RecordId::new)
        })?;
        Ok(ids.collect::<Result<HashSet<_>, _>>()?)
    }
}

// ── Row mapping ──────────────────────────────────────────────────

/// Column values as stored, before parsing into domain types.
struct RawChange {
    id: i64,
    table: String,
    operation: String,
    record_id: i64,
    payload: String,
    retry_count: i64,
    status: String,
    created_at: String,
    last_attempt: Option<String>,
    last_error: Option<String>,
}

impl RawChange {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            table: row.get(1)?,
            operation: row.get(2)?,
            record_id: row.get(3)?,
            payload: row.get(4)?,
            retry_count: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            last_attempt: row.get(8)?,
            last_error: row.get(9)?,
        })
    }

    fn into_change(self) -> StoreResult<PendingChange> {
        let payload: Fields = if self.payload.trim().is_empty() {
            Fields::new()
        } else {
            serde_json::from_str(&self.payload)?
        };
        Ok(PendingChange {
            id: ChangeId::new(self.id),
            table: self.table.parse()?,
            operation: self.operation.parse()?,
            record_id: RecordId::new(self.record_id),
            payload,
            retry_count: u32::try_from(self.retry_count).unwrap_or(0),
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            last_attempt: self.last_attempt.as_deref().map(parse_timestamp).transpose()?,
            last_error: self.last_error,
        })
    }
}

fn query_changes<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<PendingChange>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, RawChange::from_row)?;
    rows.map(|raw| raw.map_err(StoreError::from).and_then(RawChange::into_change))
        .collect()
}

/// Fixed-width UTC timestamps so lexical order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad queue timestamp '{raw}': {e}")))
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
