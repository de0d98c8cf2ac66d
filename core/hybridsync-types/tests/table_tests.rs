use hybridsync_types::{ChangeStatus, Operation, Table};
use std::str::FromStr;

// ── Table ─────────────────────────────────────────────────────────

#[test]
fn every_table_parses_from_its_name() {
    for table in Table::ALL {
        assert_eq!(Table::from_str(table.name()).unwrap(), table);
        assert_eq!(table.to_string(), table.name());
    }
}

#[test]
fn settings_accepts_short_alias() {
    assert_eq!(Table::from_str("settings").unwrap(), Table::Settings);
    assert_eq!(Table::Settings.name(), "app_settings");
}

#[test]
fn unknown_table_is_rejected() {
    assert!(Table::from_str("payroll").is_err());
}

#[test]
fn parents_are_ordered_before_children() {
    let position = |t: Table| Table::ALL.iter().position(|x| *x == t).unwrap();
    assert!(position(Table::Employees) < position(Table::Attendance));
    assert!(position(Table::Locations) < position(Table::Attendance));
}

#[test]
fn unique_and_compared_columns_are_real_columns() {
    for table in Table::ALL {
        for column in table.unique_columns() {
            assert!(table.has_column(column), "{table}.{column}");
        }
        for column in table.compared_columns() {
            assert!(table.has_column(column), "{table}.{column}");
        }
        for column in table.search_columns() {
            assert!(table.has_column(column), "{table}.{column}");
        }
    }
}

#[test]
fn id_is_not_a_data_column() {
    for table in Table::ALL {
        assert!(!table.has_column("id"));
    }
}

// ── Operation / ChangeStatus ──────────────────────────────────────

#[test]
fn operation_string_forms() {
    assert_eq!(Operation::Insert.as_str(), "INSERT");
    assert_eq!(Operation::from_str("DELETE").unwrap(), Operation::Delete);
    assert!(Operation::from_str("insert").is_err());
}

#[test]
fn duplicate_counts_as_success_only_for_writes() {
    assert!(Operation::Insert.duplicate_is_success());
    assert!(Operation::Update.duplicate_is_success());
    assert!(!Operation::Delete.duplicate_is_success());
}

#[test]
fn operation_serializes_uppercase() {
    assert_eq!(serde_json::to_string(&Operation::Update).unwrap(), "\"UPDATE\"");
}

#[test]
fn legacy_failed_status_maps_to_parked() {
    assert_eq!(ChangeStatus::from_str("failed").unwrap(), ChangeStatus::Parked);
    assert_eq!(ChangeStatus::from_str("pending").unwrap(), ChangeStatus::Pending);
    assert!(ChangeStatus::from_str("done").is_err());
}
