mod common;

use common::{Harness, record, wait_for};
use hybridsync_sync::{ChangeDetector, Fingerprint, MemoryRemote, SyncConfig, SyncMode};
use hybridsync_types::{RecordId, Table};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn detector() -> (Arc<MemoryRemote>, ChangeDetector) {
    let remote = Arc::new(MemoryRemote::new());
    let detector = ChangeDetector::new(remote.clone());
    (remote, detector)
}

// ── Fingerprints ─────────────────────────────────────────────────

#[test]
fn fingerprint_hash_depends_only_on_counts() {
    let counts: BTreeMap<Table, u64> = Table::ALL.into_iter().map(|t| (t, 2)).collect();
    let a = Fingerprint::from_counts(counts.clone());
    let b = Fingerprint::from_counts(counts.clone());
    assert_eq!(a.hash, b.hash);
    assert_eq!(a.hash.len(), 64);

    let mut bumped = counts;
    bumped.insert(Table::Holidays, 3);
    let c = Fingerprint::from_counts(bumped);
    assert_ne!(a.hash, c.hash);
    assert_eq!(c.changed_tables(&a), vec![Table::Holidays]);
}

#[tokio::test]
async fn fingerprint_counts_every_table() {
    let (remote, detector) = detector();
    remote.seed(Table::Users, record(1, json!({"username": "a"})));
    remote.seed(Table::Users, record(2, json!({"username": "b"})));

    let fingerprint = detector.fingerprint().await.unwrap();
    assert_eq!(fingerprint.counts.len(), Table::ALL.len());
    assert_eq!(fingerprint.counts[&Table::Users], 2);
    assert_eq!(fingerprint.counts[&Table::Attendance], 0);
}

// ── Change flagging ──────────────────────────────────────────────

#[tokio::test]
async fn first_check_only_sets_the_baseline() {
    let (remote, detector) = detector();
    remote.seed(Table::Holidays, record(1, json!({"description": "Eid", "date": "2025-03-30"})));

    assert!(!detector.has_remote_changes().await.unwrap());
    let info = detector.change_info();
    assert!(!info.has_changes);
    assert_eq!(info.change_count, 0);
    assert!(info.last_check.is_some());
}

#[tokio::test]
async fn count_change_is_flagged_until_marked_synced() {
    let (remote, detector) = detector();
    detector.has_remote_changes().await.unwrap();

    remote.seed(Table::Employees, record(1, json!({"employee_code": "E1", "name": "A"})));
    assert!(detector.has_remote_changes().await.unwrap());
    // No further change, but the flag stays up.
    assert!(detector.has_remote_changes().await.unwrap());

    let info = detector.change_info();
    assert_eq!(info.change_count, 1);
    assert_eq!(info.changed_tables, vec![Table::Employees]);
    assert!(info.last_change_time.is_some());

    detector.mark_synced(detector.fingerprint().await.unwrap());
    assert!(!detector.has_pending_changes());
    assert!(detector.change_info().changed_tables.is_empty());
    assert!(!detector.has_remote_changes().await.unwrap());
}

#[tokio::test]
async fn changed_tables_accumulate_between_syncs() {
    let (remote, detector) = detector();
    detector.has_remote_changes().await.unwrap();

    remote.seed(Table::Users, record(1, json!({"username": "a"})));
    detector.has_remote_changes().await.unwrap();
    remote.remove(Table::Users, RecordId::new(1));
    remote.seed(Table::Locations, record(1, json!({"name": "HQ"})));
    detector.has_remote_changes().await.unwrap();

    let info = detector.change_info();
    assert_eq!(info.change_count, 2);
    assert_eq!(info.changed_tables, vec![Table::Users, Table::Locations]);
}

#[tokio::test]
async fn offline_remote_fails_the_check() {
    let (remote, detector) = detector();
    remote.set_online(false);
    let err = detector.has_remote_changes().await.unwrap_err();
    assert!(err.is_connectivity());
}

// ── Gated pulls ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detected_remote_change_triggers_pull() {
    common::init_tracing();
    let config = SyncConfig {
        pull_interval: Duration::from_millis(50),
        change_check_interval: Duration::from_millis(50),
        push_interval: Duration::from_millis(50),
        immediate_sync: false,
        final_drain_on_shutdown: false,
        ..SyncConfig::default()
    };
    let h = Harness::new(config);
    assert_eq!(h.coordinator.connect().await, SyncMode::Connected);
    h.coordinator.start().await;

    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.status().await.unwrap().last_pull.is_some()
        })
        .await
    );

    h.remote
        .seed(Table::Holidays, record(11, json!({"description": "Spring", "date": "2025-04-21"})));
    let store = h.store().clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.get_by_id(Table::Holidays, RecordId::new(11)).unwrap().is_some() }
        })
        .await
    );

    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.status().await.unwrap().stats.remote_changes_detected >= 1
        })
        .await
    );
    assert!(coordinator.status().await.unwrap().stats.pull_cycles >= 2);
    coordinator.stop().await;
}
