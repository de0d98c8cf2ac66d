//! Database schema for business tables and the change queue.

use crate::StoreResult;
use rusqlite::Connection;

/// Creates every table and index if missing.
///
/// Unique columns are validated by `LocalStore` rather than by SQL
/// constraints, so rows replicated from the remote store are never rejected
/// locally.
pub(crate) fn init(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_code TEXT NOT NULL,
            name TEXT NOT NULL,
            job_title TEXT,
            department TEXT,
            phone_number TEXT,
            qr_code TEXT,
            web_fingerprint TEXT,
            device_token TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL,
            check_time TEXT,
            date TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'Check-In',
            notes TEXT,
            location_id INTEGER,
            work_duration REAL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_attendance_employee_date
            ON attendance(employee_id, date);

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            password TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'Viewer',
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            latitude REAL NOT NULL DEFAULT 0,
            longitude REAL NOT NULL DEFAULT 0,
            radius_meters INTEGER NOT NULL DEFAULT 100,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS holidays (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS app_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_name TEXT NOT NULL,
            value TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_app_settings_key ON app_settings(key_name);

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            operation TEXT NOT NULL,
            record_id INTEGER NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            retry_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            last_attempt TEXT,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_status
            ON sync_queue(status, created_at, id);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_record
            ON sync_queue(table_name, record_id, operation);
        ",
    )?;
    Ok(())
}
