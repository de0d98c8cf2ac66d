//! Generic row representation used at the store/queue/remote boundary.

use crate::{RecordId, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named field values of one row, without the `id` column.
pub type Fields = serde_json::Map<String, Value>;

/// One row of a synchronized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: RecordId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Builds a record from a JSON object carrying an integer `id` member.
    /// Returns `None` for non-objects and rows without a usable id.
    pub fn from_json(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let id = match fields.remove("id")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Self::new(RecordId::new(id), fields))
    }

    /// Flattens the record into a single JSON object including `id`.
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::from(self.id.get()));
        Value::Object(object)
    }

    /// Returns a copy restricted to the table's known columns.
    pub fn retain_columns(mut self, table: Table) -> Self {
        self.fields.retain(|key, _| table.has_column(key));
        self
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Field equality used by pull reconciliation.
///
/// Numbers compare by value (`1` equals `1.0`) because SQLite and Postgres
/// round-trip integral reals differently. `null` and a missing field are
/// equal.
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
                _ => false,
            },
        },
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Returns true if `remote` differs from `local` on any of `columns`.
pub fn fields_differ(columns: &[&str], remote: &Fields, local: &Fields) -> bool {
    columns
        .iter()
        .any(|column| !values_equal(remote.get(*column), local.get(*column)))
}
