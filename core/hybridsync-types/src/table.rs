//! The fixed set of synchronized tables.
//!
//! Each table declares its column list, the columns that must be unique
//! locally, and the subset of columns compared during pull reconciliation.
//! Column names come only from these static lists, so they are safe to
//! splice into SQL and REST filters.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synchronized business table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Employees,
    Attendance,
    Users,
    Locations,
    Holidays,
    Settings,
}

impl Table {
    /// All tables, ordered so that referenced parents come before children.
    pub const ALL: [Table; 6] = [
        Table::Settings,
        Table::Locations,
        Table::Employees,
        Table::Users,
        Table::Holidays,
        Table::Attendance,
    ];

    /// SQL / REST table name. Identical locally and remotely.
    pub const fn name(self) -> &'static str {
        match self {
            Table::Employees => "employees",
            Table::Attendance => "attendance",
            Table::Users => "users",
            Table::Locations => "locations",
            Table::Holidays => "holidays",
            Table::Settings => "app_settings",
        }
    }

    /// Data columns, excluding `id` and the local `updated_at` bookkeeping column.
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Employees => &[
                "employee_code",
                "name",
                "job_title",
                "department",
                "phone_number",
                "qr_code",
                "web_fingerprint",
                "device_token",
            ],
            Table::Attendance => &[
                "employee_id",
                "check_time",
                "date",
                "type",
                "notes",
                "location_id",
                "work_duration",
            ],
            Table::Users => &["username", "password", "role"],
            Table::Locations => &["name", "latitude", "longitude", "radius_meters"],
            Table::Holidays => &["description", "date"],
            Table::Settings => &["key_name", "value"],
        }
    }

    /// Columns whose values must be unique within the local table.
    pub const fn unique_columns(self) -> &'static [&'static str] {
        match self {
            Table::Employees => &["employee_code", "phone_number"],
            Table::Attendance => &[],
            Table::Users => &["username"],
            Table::Locations => &["name"],
            Table::Holidays => &["date"],
            Table::Settings => &["key_name"],
        }
    }

    /// Columns compared when deciding whether a pulled row differs from the local one.
    pub const fn compared_columns(self) -> &'static [&'static str] {
        match self {
            Table::Employees => &[
                "name",
                "employee_code",
                "job_title",
                "department",
                "phone_number",
                "qr_code",
            ],
            Table::Attendance => &["check_time", "date", "type", "notes", "work_duration"],
            Table::Users => &["username", "role"],
            Table::Locations => &["name", "latitude", "longitude", "radius_meters"],
            Table::Holidays => &["description", "date"],
            Table::Settings => &["key_name", "value"],
        }
    }

    /// Text columns searched by `LocalStore::search`.
    pub const fn search_columns(self) -> &'static [&'static str] {
        match self {
            Table::Employees => &["employee_code", "name", "job_title", "department", "phone_number"],
            Table::Attendance => &["date", "type", "notes"],
            Table::Users => &["username", "role"],
            Table::Locations => &["name"],
            Table::Holidays => &["description", "date"],
            Table::Settings => &["key_name", "value"],
        }
    }

    /// Returns true if `column` is a data column of this table.
    pub fn has_column(self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employees" => Ok(Table::Employees),
            "attendance" => Ok(Table::Attendance),
            "users" => Ok(Table::Users),
            "locations" => Ok(Table::Locations),
            "holidays" => Ok(Table::Holidays),
            "app_settings" | "settings" => Ok(Table::Settings),
            other => Err(Error::UnknownTable(other.to_string())),
        }
    }
}
