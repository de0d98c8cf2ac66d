//! In-process remote store.
//!
//! Behaves like a small PostgREST backend: unique columns and primary keys
//! are enforced (duplicate-key errors), attendance rows must reference
//! existing employees and locations (referential errors), and the store can
//! be taken offline or told to fail upcoming writes.

use super::RemoteClient;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use hybridsync_types::{Fields, Record, RecordId, Table, values_equal};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Rows = BTreeMap<i64, Fields>;

/// In-memory [`RemoteClient`].
#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<Table, Rows>>,
    offline: AtomicBool,
    failing_writes: AtomicU32,
    write_attempts: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<Table, Rows>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Test controls ────────────────────────────────────────────

    /// Takes the store on or offline. Offline calls fail with a
    /// connectivity error.
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    /// Makes the next `n` writes fail with a transient server error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of insert/update/delete calls received, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Writes a row directly, bypassing constraints, as another client would.
    pub fn seed(&self, table: Table, record: Record) {
        self.tables()
            .entry(table)
            .or_default()
            .insert(record.id.get(), record.fields);
    }

    /// Removes a row directly, bypassing constraints.
    pub fn remove(&self, table: Table, id: RecordId) -> bool {
        self.tables()
            .get_mut(&table)
            .is_some_and(|rows| rows.remove(&id.get()).is_some())
    }

    pub fn get(&self, table: Table, id: RecordId) -> Option<Record> {
        self.tables()
            .get(&table)
            .and_then(|rows| rows.get(&id.get()))
            .map(|fields| Record::new(id, fields.clone()))
    }

    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.tables()
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, fields)| Record::new(RecordId::new(*id), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Finds the first row whose `column` equals `value`.
    pub fn find_by(&self, table: Table, column: &str, value: &Value) -> Option<Record> {
        self.rows(table)
            .into_iter()
            .find(|record| values_equal(record.fields.get(column), Some(value)))
    }

    // ── Checks ───────────────────────────────────────────────────

    fn check_online(&self) -> SyncResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::Connectivity("memory remote is offline".into()))
        }
    }

    fn begin_write(&self) -> SyncResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SyncError::Remote {
                status: 500,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

fn check_unique(table: Table, rows: &Rows, fields: &Fields, own_id: i64) -> SyncResult<()> {
    for column in table.unique_columns() {
        let value = match fields.get(*column) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(v) => v,
        };
        let taken = rows
            .iter()
            .any(|(id, row)| *id != own_id && values_equal(row.get(*column), Some(value)));
        if taken {
            return Err(SyncError::Duplicate(format!(
                "duplicate key value violates unique constraint \"{table}_{column}_key\""
            )));
        }
    }
    Ok(())
}

fn check_references(tables: &HashMap<Table, Rows>, table: Table, fields: &Fields) -> SyncResult<()> {
    if table != Table::Attendance {
        return Ok(());
    }
    for (column, parent) in [("employee_id", Table::Employees), ("location_id", Table::Locations)] {
        let Some(id) = fields.get(column).and_then(Value::as_i64) else {
            continue;
        };
        let exists = tables.get(&parent).is_some_and(|rows| rows.contains_key(&id));
        if !exists {
            return Err(SyncError::Referential(format!(
                "insert or update on table \"attendance\" violates foreign key constraint \"attendance_{column}_fkey\""
            )));
        }
    }
    Ok(())
}

fn is_referenced(tables: &HashMap<Table, Rows>, table: Table, id: i64) -> bool {
    let column = match table {
        Table::Employees => "employee_id",
        Table::Locations => "location_id",
        _ => return false,
    };
    tables.get(&Table::Attendance).is_some_and(|rows| {
        rows.values()
            .any(|row| row.get(column).and_then(Value::as_i64) == Some(id))
    })
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn get_all(&self, table: Table) -> SyncResult<Vec<Record>> {
        self.check_online()?;
        Ok(self.rows(table))
    }

    async fn insert(&self, table: Table, fields: &Fields) -> SyncResult<()> {
        self.begin_write()?;
        let mut tables = self.tables();
        let mut row = fields.clone();
        let requested = row.remove("id").and_then(|v| v.as_i64());

        check_references(&tables, table, &row)?;
        let rows = tables.entry(table).or_default();
        let id = match requested {
            Some(id) if rows.contains_key(&id) => {
                return Err(SyncError::Duplicate(format!(
                    "duplicate key value violates unique constraint \"{table}_pkey\""
                )));
            }
            Some(id) => id,
            None => rows.keys().next_back().map_or(1, |last| last + 1),
        };
        check_unique(table, rows, &row, id)?;
        rows.insert(id, row);
        Ok(())
    }

    async fn update(&self, table: Table, id: RecordId, fields: &Fields) -> SyncResult<()> {
        self.begin_write()?;
        let mut tables = self.tables();
        let mut changes = fields.clone();
        changes.remove("id");

        check_references(&tables, table, &changes)?;
        let rows = tables.entry(table).or_default();
        let Some(existing) = rows.get(&id.get()) else {
            return Ok(());
        };
        let mut merged = existing.clone();
        merged.extend(changes);
        check_unique(table, rows, &merged, id.get())?;
        rows.insert(id.get(), merged);
        Ok(())
    }

    async fn delete(&self, table: Table, id: RecordId) -> SyncResult<()> {
        self.begin_write()?;
        let mut tables = self.tables();
        if is_referenced(&tables, table, id.get()) {
            return Err(SyncError::Referential(format!(
                "update or delete on table \"{table}\" violates foreign key constraint on table \"attendance\""
            )));
        }
        if let Some(rows) = tables.get_mut(&table) {
            rows.remove(&id.get());
        }
        Ok(())
    }

    async fn count(&self, table: Table) -> SyncResult<u64> {
        self.check_online()?;
        Ok(self.tables().get(&table).map_or(0, |rows| rows.len() as u64))
    }
}
