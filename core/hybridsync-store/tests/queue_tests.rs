use chrono::{Duration as ChronoDuration, Utc};
use hybridsync_store::LocalStore;
use hybridsync_types::{ChangeStatus, Fields, NewChange, Operation, RecordId, Table};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn open_store() -> (TempDir, LocalStore) {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::open(dir.path().join("queue.db")).unwrap();
    (dir, store)
}

fn insert(record: i64) -> NewChange {
    let mut payload = Fields::new();
    payload.insert("id".into(), json!(record));
    payload.insert("employee_code".into(), json!(format!("E{record}")));
    NewChange::new(Table::Employees, Operation::Insert, RecordId::new(record), payload)
}

// ── Enqueue / fetch ───────────────────────────────────────────────

#[test]
fn enqueued_change_is_pending_with_payload() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let id = queue.enqueue(&insert(1)).unwrap();
    let change = queue.get(id).unwrap().unwrap();
    assert_eq!(change.status, ChangeStatus::Pending);
    assert_eq!(change.retry_count, 0);
    assert_eq!(change.payload["employee_code"], json!("E1"));
    assert_eq!(queue.count(ChangeStatus::Pending).unwrap(), 1);
}

#[test]
fn fetch_pending_is_fifo_by_creation_time() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let mut late = insert(1);
    late.created_at = Utc::now();
    let mut early = insert(2);
    early.created_at = late.created_at - ChronoDuration::seconds(5);
    queue.enqueue(&late).unwrap();
    queue.enqueue(&early).unwrap();

    let pending = queue.fetch_pending(10).unwrap();
    let order: Vec<i64> = pending.iter().map(|c| c.record_id.get()).collect();
    assert_eq!(order, vec![2, 1]);
    assert_eq!(queue.fetch_pending(1).unwrap().len(), 1);
}

#[test]
fn delete_changes_store_empty_payload() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let change = NewChange::new(Table::Users, Operation::Delete, RecordId::new(3), Fields::new());
    let id = queue.enqueue(&change).unwrap();
    assert!(queue.get(id).unwrap().unwrap().payload.is_empty());
}

// ── Dedupe ────────────────────────────────────────────────────────

fn update(record: i64, name: &str) -> NewChange {
    let mut payload = Fields::new();
    payload.insert("name".into(), json!(name));
    NewChange::new(Table::Employees, Operation::Update, RecordId::new(record), payload)
}

#[test]
fn remove_matching_clears_the_triple_up_to_the_pushed_entry() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    queue.enqueue(&insert(1)).unwrap();
    let second = queue.enqueue(&insert(1)).unwrap();
    queue.enqueue(&insert(2)).unwrap();
    queue.enqueue(&update(1, "A")).unwrap();
    let late_insert = queue.enqueue(&insert(1)).unwrap();

    let removed = queue
        .remove_matching(Table::Employees, RecordId::new(1), Operation::Insert, second)
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(queue.count(ChangeStatus::Pending).unwrap(), 3);
    assert!(queue.get(late_insert).unwrap().is_some());
}

#[test]
fn newer_and_earlier_entries_are_detected_per_record() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let created = queue.enqueue(&insert(1)).unwrap();
    let first = queue.enqueue(&update(1, "A")).unwrap();
    let second = queue.enqueue(&update(1, "B")).unwrap();
    let other = queue.enqueue(&update(2, "C")).unwrap();

    let (table, record) = (Table::Employees, RecordId::new(1));
    assert!(queue.has_newer(table, record, Operation::Update, first).unwrap());
    assert!(!queue.has_newer(table, record, Operation::Update, second).unwrap());
    assert!(!queue.has_newer(table, record, Operation::Insert, created).unwrap());

    assert!(queue.has_earlier(table, record, first).unwrap());
    assert!(!queue.has_earlier(table, record, created).unwrap());
    assert!(!queue.has_earlier(table, RecordId::new(2), other).unwrap());

    // A parked entry still counts as earlier.
    queue.park(created, "foreign key").unwrap();
    assert!(queue.has_earlier(table, record, first).unwrap());
}

#[test]
fn parked_floors_hold_the_lowest_parked_id_per_record() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let first = queue.enqueue(&insert(1)).unwrap();
    let second = queue.enqueue(&update(1, "A")).unwrap();
    queue.enqueue(&insert(2)).unwrap();
    queue.park(second, "x").unwrap();
    queue.park(first, "x").unwrap();

    let floors = queue.parked_floors().unwrap();
    assert_eq!(floors.len(), 1);
    assert_eq!(floors[&(Table::Employees, RecordId::new(1))], first);

    queue.requeue_parked().unwrap();
    assert!(queue.parked_floors().unwrap().is_empty());
}

// ── Failures and parking ──────────────────────────────────────────

#[test]
fn third_failure_parks_the_entry() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let id = queue.enqueue(&insert(1)).unwrap();

    assert_eq!(queue.record_failure(id, "timeout", 3).unwrap(), ChangeStatus::Pending);
    assert_eq!(queue.record_failure(id, "timeout", 3).unwrap(), ChangeStatus::Pending);
    assert_eq!(queue.record_failure(id, "server error", 3).unwrap(), ChangeStatus::Parked);

    let change = queue.get(id).unwrap().unwrap();
    assert_eq!(change.retry_count, 3);
    assert_eq!(change.last_error.as_deref(), Some("server error"));
    assert!(change.last_attempt.is_some());
    assert!(queue.fetch_pending(10).unwrap().is_empty());
    assert_eq!(queue.counts().unwrap().parked, 1);
}

#[test]
fn failure_on_missing_entry_is_not_found() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let id = queue.enqueue(&insert(1)).unwrap();
    queue.clear().unwrap();
    assert!(queue.record_failure(id, "x", 3).is_err());
}

#[test]
fn park_and_requeue() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let id = queue.enqueue(&insert(1)).unwrap();
    assert!(queue.park(id, "foreign key").unwrap());
    assert_eq!(queue.count(ChangeStatus::Parked).unwrap(), 1);

    assert_eq!(queue.requeue_parked().unwrap(), 1);
    let change = queue.get(id).unwrap().unwrap();
    assert_eq!(change.status, ChangeStatus::Pending);
    assert_eq!(change.retry_count, 0);
}

#[test]
fn purge_only_removes_old_parked_entries() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    let parked = queue.enqueue(&insert(1)).unwrap();
    queue.enqueue(&insert(2)).unwrap();
    queue.park(parked, "gone").unwrap();

    assert_eq!(queue.purge_parked(Utc::now() - ChronoDuration::hours(24)).unwrap(), 0);
    assert_eq!(queue.purge_parked(Utc::now() + ChronoDuration::seconds(1)).unwrap(), 1);
    let counts = queue.counts().unwrap();
    assert_eq!((counts.pending, counts.parked), (1, 0));
}

// ── Reporting ─────────────────────────────────────────────────────

#[test]
fn pending_by_table_and_recent() {
    let (_dir, store) = open_store();
    let queue = store.queue();
    queue.enqueue(&insert(1)).unwrap();
    queue.enqueue(&insert(2)).unwrap();
    let setting = NewChange::new(Table::Settings, Operation::Update, RecordId::new(1), Fields::new());
    let last = queue.enqueue(&setting).unwrap();

    let by_table = queue.pending_by_table().unwrap();
    assert_eq!(by_table.get("employees"), Some(&2));
    assert_eq!(by_table.get("app_settings"), Some(&1));

    let recent = queue.recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, last);
    assert_eq!(queue.counts().unwrap().total(), 3);
}

#[test]
fn recorder_queue_shares_the_same_table() {
    let (_dir, store) = open_store();
    store.recorder_queue().enqueue(&insert(7)).unwrap();
    assert_eq!(store.queue().count(ChangeStatus::Pending).unwrap(), 1);
    assert!(store.recorder_queue().busy_timeout() < store.queue().busy_timeout());
}
