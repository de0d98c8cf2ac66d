//! Typed business entities.
//!
//! Entities are plain serde structs. They are converted to the generic
//! [`Fields`] map only when crossing the store, queue or remote boundary.

use crate::{Error, Fields, Record, RecordId, Result, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed row of one synchronized table.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The table this entity is stored in.
    const TABLE: Table;

    /// Primary key, `None` before the row has been created.
    fn id(&self) -> Option<RecordId>;

    fn set_id(&mut self, id: RecordId);

    /// Serializes the entity into column values, dropping `id` and any
    /// field that is not a column of [`Self::TABLE`].
    fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                fields.remove("id");
                fields.retain(|key, _| Self::TABLE.has_column(key));
                Ok(fields)
            }
            _ => Err(Error::NotAnObject(Self::TABLE)),
        }
    }

    /// Rebuilds the entity from a stored record.
    fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(record.to_json())?)
    }
}

macro_rules! impl_entity {
    ($ty:ty, $table:expr) => {
        impl Entity for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> Option<RecordId> {
                self.id
            }

            fn set_id(&mut self, id: RecordId) {
                self.id = Some(id);
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub employee_code: String,
    pub name: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub web_fingerprint: Option<String>,
    #[serde(default)]
    pub device_token: Option<String>,
}

impl Employee {
    pub fn new(employee_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            employee_code: employee_code.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl_entity!(Employee, Table::Employees);

/// One check-in or check-out event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub employee_id: RecordId,
    #[serde(default)]
    pub check_time: Option<String>,
    pub date: String,
    #[serde(rename = "type", default = "default_attendance_kind")]
    pub kind: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub location_id: Option<RecordId>,
    /// Hours between check-in and check-out, set on check-out rows.
    #[serde(default)]
    pub work_duration: Option<f64>,
}

fn default_attendance_kind() -> String {
    "Check-In".to_string()
}

impl AttendanceEntry {
    pub fn check_in(employee_id: RecordId, date: impl Into<String>) -> Self {
        Self {
            id: None,
            employee_id,
            check_time: None,
            date: date.into(),
            kind: default_attendance_kind(),
            notes: None,
            location_id: None,
            work_duration: None,
        }
    }
}

impl_entity!(AttendanceEntry, Table::Attendance);

/// An application account. `password` holds whatever credential form the
/// authentication layer stores; hashing happens outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "Viewer".to_string()
}

impl_entity!(User, Table::Users);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius_meters: i64,
}

fn default_radius() -> i64 {
    100
}

impl_entity!(Location, Table::Locations);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub description: String,
    pub date: String,
}

impl_entity!(Holiday, Table::Holidays);

/// A key/value application setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub key_name: String,
    pub value: String,
}

impl Setting {
    pub fn new(key_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: None,
            key_name: key_name.into(),
            value: value.into(),
        }
    }
}

impl_entity!(Setting, Table::Settings);
