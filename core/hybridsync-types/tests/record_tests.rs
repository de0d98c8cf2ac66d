use hybridsync_types::{
    AttendanceEntry, ChangeId, Employee, Entity, Fields, NewChange, Operation, Record, RecordId,
    Setting, Table, fields_differ, values_equal,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

// ── Record ────────────────────────────────────────────────────────

#[test]
fn record_from_json_extracts_integer_id() {
    let record = Record::from_json(json!({"id": 7, "name": "Ana"})).unwrap();
    assert_eq!(record.id, RecordId::new(7));
    assert!(!record.fields.contains_key("id"));
    assert_eq!(record.get_str("name"), Some("Ana"));
}

#[test]
fn record_from_json_accepts_string_id() {
    let record = Record::from_json(json!({"id": " 12 ", "x": 1})).unwrap();
    assert_eq!(record.id.get(), 12);
}

#[test]
fn record_without_id_is_rejected() {
    assert!(Record::from_json(json!({"name": "no id"})).is_none());
    assert!(Record::from_json(json!({"id": null})).is_none());
    assert!(Record::from_json(json!([1, 2])).is_none());
}

#[test]
fn record_to_json_includes_id() {
    let record = Record::new(RecordId::new(3), fields(json!({"value": "dark"})));
    assert_eq!(record.to_json(), json!({"id": 3, "value": "dark"}));
}

#[test]
fn retain_columns_drops_unknown_fields() {
    let record = Record::new(
        RecordId::new(1),
        fields(json!({"key_name": "theme", "value": "light", "created_at": "x"})),
    )
    .retain_columns(Table::Settings);
    assert_eq!(record.fields.len(), 2);
    assert!(!record.fields.contains_key("created_at"));
}

// ── Field comparison ──────────────────────────────────────────────

#[test]
fn numbers_compare_by_value() {
    assert!(values_equal(Some(&json!(1)), Some(&json!(1.0))));
    assert!(values_equal(Some(&json!(24.5)), Some(&json!(24.5))));
    assert!(!values_equal(Some(&json!(1)), Some(&json!(2))));
}

#[test]
fn null_and_missing_are_equal() {
    assert!(values_equal(None, Some(&Value::Null)));
    assert!(values_equal(None, None));
    assert!(!values_equal(None, Some(&json!(""))));
}

#[test]
fn fields_differ_only_looks_at_listed_columns() {
    let remote = fields(json!({"name": "Ana", "device_token": "abc"}));
    let local = fields(json!({"name": "Ana", "device_token": "xyz"}));
    assert!(!fields_differ(&["name"], &remote, &local));
    assert!(fields_differ(&["name", "device_token"], &remote, &local));
}

proptest! {
    #[test]
    fn values_equal_is_symmetric(a in any::<i32>(), b in any::<i32>()) {
        let x = json!(a);
        let y = json!(f64::from(b));
        prop_assert_eq!(values_equal(Some(&x), Some(&y)), values_equal(Some(&y), Some(&x)));
        prop_assert_eq!(values_equal(Some(&x), Some(&y)), a == b);
    }
}

// ── Entities ──────────────────────────────────────────────────────

#[test]
fn employee_fields_exclude_id() {
    let mut employee = Employee::new("E100", "Layla");
    employee.set_id(RecordId::new(9));
    let fields = employee.to_fields().unwrap();
    assert!(!fields.contains_key("id"));
    assert_eq!(fields["employee_code"], json!("E100"));
    assert_eq!(fields["phone_number"], Value::Null);
}

#[test]
fn attendance_kind_maps_to_type_column() {
    let entry = AttendanceEntry::check_in(RecordId::new(4), "2026-10-15");
    let fields = entry.to_fields().unwrap();
    assert_eq!(fields["type"], json!("Check-In"));
    assert_eq!(fields["employee_id"], json!(4));
}

#[test]
fn entity_from_record_restores_id() {
    let record = Record::new(
        RecordId::new(5),
        fields(json!({"key_name": "language", "value": "ar"})),
    );
    let setting = Setting::from_record(record).unwrap();
    assert_eq!(setting.id(), Some(RecordId::new(5)));
    assert_eq!(setting.value, "ar");
}

// ── Queue types ───────────────────────────────────────────────────

#[test]
fn delete_changes_carry_no_payload() {
    let change = NewChange::new(
        Table::Employees,
        Operation::Delete,
        RecordId::new(1),
        fields(json!({"name": "ignored"})),
    );
    assert!(change.payload.is_empty());
}

#[test]
fn change_id_display() {
    assert_eq!(ChangeId::new(42).to_string(), "#42");
    assert_eq!("17".parse::<RecordId>().unwrap(), RecordId::new(17));
}
