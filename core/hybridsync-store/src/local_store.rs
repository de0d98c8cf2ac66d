//! The embedded relational store.
//!
//! Every call opens its own short-lived connection, so a `LocalStore` is a
//! cheap, cloneable handle that can be moved into blocking tasks. Writes made
//! here never touch the change queue; recording mutations is the job of the
//! sync layer.

use crate::config::StoreConfig;
use crate::connection::{self, display_value, from_sql, to_sql};
use crate::queue::ChangeQueue;
use crate::{StoreError, StoreResult, schema};
use hybridsync_types::{Fields, Record, RecordId, Table};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle to the local SQLite database.
#[derive(Debug, Clone)]
pub struct LocalStore {
    config: StoreConfig,
}

impl LocalStore {
    /// Opens (or creates) a store at `path` with default timeouts.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(StoreConfig::new(path))
    }

    /// Opens (or creates) a store and makes sure the schema exists.
    pub fn open_with(config: StoreConfig) -> StoreResult<Self> {
        let store = Self { config };
        let conn = store.connect()?;
        schema::init(&conn)?;
        debug!(path = %store.path().display(), "local store ready");
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Queue handle using the regular busy timeout.
    pub fn queue(&self) -> ChangeQueue {
        ChangeQueue::new(self.config.path.clone(), self.config.busy_timeout)
    }

    /// Queue handle using the short recorder timeout.
    pub fn recorder_queue(&self) -> ChangeQueue {
        ChangeQueue::new(self.config.path.clone(), self.config.recorder_busy_timeout)
    }

    fn connect(&self) -> StoreResult<Connection> {
        connection::open(&self.config.path, self.config.busy_timeout)
    }

    /// Opens a connection and runs a trivial query.
    pub fn ping(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ── Application writes ───────────────────────────────────────

    /// Inserts a row and returns its new id.
    ///
    /// Unique columns are checked inside the same write transaction.
    pub fn create(&self, table: Table, fields: &Fields) -> StoreResult<RecordId> {
        let columns = checked_columns(table, fields)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        validate_unique(&tx, table, fields, None)?;

        if columns.is_empty() {
            tx.execute(&format!("INSERT INTO {table} DEFAULT VALUES"), [])?;
        } else {
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            );
            tx.execute(&sql, params_from_iter(values_for(&columns, fields)))?;
        }
        let id = RecordId::new(tx.last_insert_rowid());
        tx.commit()?;
        debug!(%table, %id, "created local record");
        Ok(id)
    }

    /// Updates the given columns of an existing row.
    ///
    /// Returns `false` when the row does not exist or `fields` holds no
    /// updatable column.
    pub fn update(&self, table: Table, id: RecordId, fields: &Fields) -> StoreResult<bool> {
        let columns = checked_columns(table, fields)?;
        if columns.is_empty() {
            return Ok(false);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        validate_unique(&tx, table, fields, Some(id))?;
        let changed = update_row(&tx, table, id, &columns, fields)?;
        tx.commit()?;
        Ok(changed)
    }

    pub fn delete(&self, table: Table, id: RecordId) -> StoreResult<bool> {
        let conn = self.connect()?;
        delete_row(&conn, table, id)
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn get_all(&self, table: Table) -> StoreResult<Vec<Record>> {
        let conn = self.connect()?;
        let sql = format!("{} ORDER BY id", select_clause(table));
        query_records(&conn, table, &sql, [])
    }

    pub fn get_by_id(&self, table: Table, id: RecordId) -> StoreResult<Option<Record>> {
        let conn = self.connect()?;
        let sql = format!("{} WHERE id = ?1", select_clause(table));
        Ok(conn
            .query_row(&sql, [id.get()], |row| read_record(table, row))
            .optional()?)
    }

    /// Case-insensitive substring search over the table's text columns.
    pub fn search(&self, table: Table, term: &str) -> StoreResult<Vec<Record>> {
        let term = term.trim();
        if term.is_empty() {
            return self.get_all(table);
        }
        let filter = table
            .search_columns()
            .iter()
            .map(|c| format!("LOWER(COALESCE({c}, '')) LIKE ?1 ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("{} WHERE {filter} ORDER BY id", select_clause(table));
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let conn = self.connect()?;
        query_records(&conn, table, &sql, [pattern])
    }

    // ── Replication writes ───────────────────────────────────────

    /// Writes a remote row with its remote id, replacing any local row with
    /// the same id. Fields that are not local columns are dropped.
    pub fn upsert_remote(&self, table: Table, record: &Record) -> StoreResult<()> {
        let columns: Vec<&'static str> = table
            .columns()
            .iter()
            .copied()
            .filter(|c| record.fields.contains_key(*c))
            .collect();
        let mut names = vec!["id"];
        names.extend(columns.iter().copied());
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
            names.join(", ")
        );
        let mut values = vec![SqlValue::Integer(record.id.get())];
        values.extend(values_for(&columns, &record.fields));

        let conn = self.connect()?;
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Overwrites local columns with remote values. Unknown fields are
    /// ignored and no unique validation is applied.
    pub fn apply_remote_update(&self, table: Table, id: RecordId, fields: &Fields) -> StoreResult<bool> {
        let columns: Vec<&'static str> = table
            .columns()
            .iter()
            .copied()
            .filter(|c| fields.contains_key(*c))
            .collect();
        if columns.is_empty() {
            return Ok(false);
        }
        let conn = self.connect()?;
        update_row(&conn, table, id, &columns, fields)
    }

    /// Deletes a row that no longer exists remotely.
    pub fn delete_remote(&self, table: Table, id: RecordId) -> StoreResult<bool> {
        let conn = self.connect()?;
        delete_row(&conn, table, id)
    }

    // ── Settings ─────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.connect()?;
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM app_settings WHERE key_name = ?1 ORDER BY id LIMIT 1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Inserts or updates a setting. Returns the row id and whether a new
    /// row was created.
    pub fn set_setting(&self, key: &str, value: &str) -> StoreResult<(RecordId, bool)> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM app_settings WHERE key_name = ?1 ORDER BY id LIMIT 1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        let result = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE app_settings SET value = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![value, id],
                )?;
                (RecordId::new(id), false)
            }
            None => {
                tx.execute(
                    "INSERT INTO app_settings (key_name, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
                (RecordId::new(tx.last_insert_rowid()), true)
            }
        };
        tx.commit()?;
        Ok(result)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Returns the data columns present in `fields`, rejecting unknown names.
fn checked_columns(table: Table, fields: &Fields) -> StoreResult<Vec<&'static str>> {
    if let Some(unknown) = fields
        .keys()
        .find(|k| k.as_str() != "id" && !table.has_column(k))
    {
        return Err(StoreError::InvalidData(format!(
            "{table} has no column '{unknown}'"
        )));
    }
    Ok(table
        .columns()
        .iter()
        .copied()
        .filter(|c| fields.contains_key(*c))
        .collect())
}

fn values_for(columns: &[&str], fields: &Fields) -> Vec<SqlValue> {
    columns
        .iter()
        .map(|c| fields.get(*c).map_or(SqlValue::Null, to_sql))
        .collect()
}

fn validate_unique(
    conn: &Connection,
    table: Table,
    fields: &Fields,
    exclude: Option<RecordId>,
) -> StoreResult<()> {
    for &column in table.unique_columns() {
        let value = match fields.get(column) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(v) => v,
        };
        let sql = format!("SELECT 1 FROM {table} WHERE {column} = ?1 AND id != ?2 LIMIT 1");
        let taken = conn
            .query_row(
                &sql,
                params![to_sql(value), exclude.map_or(-1, RecordId::get)],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(StoreError::Validation {
                table,
                field: column.to_string(),
                value: display_value(value),
            });
        }
    }
    Ok(())
}

fn update_row(
    conn: &Connection,
    table: Table,
    id: RecordId,
    columns: &[&str],
    fields: &Fields,
) -> StoreResult<bool> {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {table} SET {assignments}, updated_at = CURRENT_TIMESTAMP WHERE id = ?{}",
        columns.len() + 1
    );
    let mut values = values_for(columns, fields);
    values.push(SqlValue::Integer(id.get()));
    Ok(conn.execute(&sql, params_from_iter(values))? > 0)
}

fn delete_row(conn: &Connection, table: Table, id: RecordId) -> StoreResult<bool> {
    let sql = format!("DELETE FROM {table} WHERE id = ?1");
    Ok(conn.execute(&sql, [id.get()])? > 0)
}

fn select_clause(table: Table) -> String {
    format!("SELECT id, {} FROM {table}", table.columns().join(", "))
}

fn read_record(table: Table, row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let mut fields = Fields::new();
    for (i, column) in table.columns().iter().enumerate() {
        fields.insert((*column).to_string(), from_sql(row.get_ref(i + 1)?));
    }
    Ok(Record::new(RecordId::new(id), fields))
}

fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    table: Table,
    sql: &str,
    params: P,
) -> StoreResult<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| read_record(table, row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
