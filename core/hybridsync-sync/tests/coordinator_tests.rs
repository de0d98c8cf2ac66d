mod common;

use common::{Harness, manual_config, open_coordinator, record, wait_for};
use hybridsync_sync::{MemoryRemote, SyncConfig, SyncMode};
use hybridsync_types::{AttendanceEntry, ChangeStatus, Employee, RecordId, Table};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_config() -> SyncConfig {
    SyncConfig {
        push_interval: Duration::from_millis(50),
        pull_interval: Duration::from_millis(50),
        change_check_interval: Duration::from_millis(50),
        ..manual_config()
    }
}

// ── Offline-first scenarios ──────────────────────────────────────

#[tokio::test]
async fn offline_create_is_pushed_by_full_sync() {
    let h = Harness::new(manual_config());
    assert_eq!(h.coordinator.mode(), SyncMode::Disconnected);

    let app = h.coordinator.synced_store();
    let id = app.create(&Employee::new("E100", "Layla")).unwrap();
    assert!(app.get_by_id::<Employee>(id).unwrap().is_some());

    let status = h.coordinator.status().await.unwrap();
    assert_eq!(status.pending_count, 1);
    let pending = h.store().queue().fetch_pending(10).unwrap();
    assert_eq!(pending[0].table, Table::Employees);
    assert_eq!(pending[0].record_id, id);

    assert!(h.coordinator.force_full_sync().await);
    assert_eq!(h.coordinator.mode(), SyncMode::Connected);
    assert_eq!(h.coordinator.status().await.unwrap().pending_count, 0);
    assert!(h.remote.find_by(Table::Employees, "employee_code", &json!("E100")).is_some());
}

#[tokio::test]
async fn same_unique_key_from_two_stores_is_cleared_as_already_applied() {
    let remote = Arc::new(MemoryRemote::new());
    let first = Harness::with_remote(remote.clone(), manual_config());
    let second = Harness::with_remote(remote.clone(), manual_config());

    // Shift the second store's ids so both rows get different local ids.
    second
        .store()
        .create(Table::Employees, &common::fields(json!({"employee_code": "TMP", "name": "Temp"})))
        .unwrap();

    let a = first.coordinator.synced_store().create(&Employee::new("E200", "Kareem")).unwrap();
    let b = second.coordinator.synced_store().create(&Employee::new("E200", "Kareem")).unwrap();
    assert_ne!(a, b);

    assert!(first.coordinator.force_full_sync().await);
    assert!(second.coordinator.force_full_sync().await);

    let status = second.coordinator.status().await.unwrap();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.parked_count, 0);
    assert_eq!(status.stats.duplicates, 1);

    let remote_rows: Vec<_> = remote
        .rows(Table::Employees)
        .into_iter()
        .filter(|r| r.get_str("employee_code") == Some("E200"))
        .collect();
    assert_eq!(remote_rows.len(), 1);

    // The next pull converges the second store on the remote row.
    second.coordinator.pull_worker().run_all().await.unwrap();
    let local = second.coordinator.synced_store().get_all::<Employee>().unwrap();
    assert_eq!(local.iter().filter(|e| e.employee_code == "E200").count(), 1);
}

#[tokio::test]
async fn queued_changes_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("restart.db");
    let remote = Arc::new(MemoryRemote::new());
    remote.set_online(false);

    {
        let coordinator = open_coordinator(&path, remote.clone(), manual_config());
        assert_eq!(coordinator.connect().await, SyncMode::Disconnected);
        let app = coordinator.synced_store();
        app.create(&Employee::new("E300", "Yara")).unwrap();
        app.set_setting("company", "Acme").unwrap();
    }

    remote.set_online(true);
    let coordinator = open_coordinator(&path, remote.clone(), manual_config());
    assert_eq!(coordinator.status().await.unwrap().pending_count, 2);
    assert!(coordinator.force_full_sync().await);
    assert_eq!(remote.rows(Table::Employees).len(), 1);
    assert!(remote.find_by(Table::Settings, "key_name", &json!("company")).is_some());
}

#[tokio::test]
async fn force_full_sync_fails_while_remote_unreachable() {
    let h = Harness::new(manual_config());
    h.remote.set_online(false);
    h.coordinator.synced_store().create(&Employee::new("E1", "A")).unwrap();

    assert!(!h.coordinator.force_full_sync().await);
    assert_eq!(h.coordinator.mode(), SyncMode::Disconnected);
    assert_eq!(h.coordinator.status().await.unwrap().pending_count, 1);
}

#[tokio::test]
async fn connect_while_offline_stays_local_only() {
    let h = Harness::new(manual_config());
    h.remote.set_online(false);
    assert_eq!(h.coordinator.connect().await, SyncMode::Disconnected);

    let status = h.coordinator.status().await.unwrap();
    assert!(!status.remote_available);
    assert!(status.last_error.is_some());
    assert_eq!(status.provider, "memory");

    h.remote.set_online(true);
    assert_eq!(h.coordinator.connect().await, SyncMode::Connected);
}

// ── Immediate sync ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connected_writes_are_pushed_immediately() {
    let config = SyncConfig {
        immediate_sync: true,
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.connect().await;

    let app = h.coordinator.synced_store();
    let id = app.create(&Employee::new("E400", "Salma")).unwrap();

    let remote = h.remote.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let remote = remote.clone();
            async move { remote.get(Table::Employees, id).is_some() }
        })
        .await
    );
    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.status().await.unwrap().stats.immediate_synced == 1
        })
        .await
    );
    assert_eq!(h.store().queue().counts().unwrap().total(), 0);
}

#[tokio::test]
async fn disconnected_writes_skip_the_immediate_pool() {
    let config = SyncConfig {
        immediate_sync: true,
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.synced_store().create(&Employee::new("E401", "Hana")).unwrap();

    assert_eq!(h.coordinator.immediate_pool().in_flight(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.remote.write_attempts(), 0);
    assert_eq!(h.coordinator.status().await.unwrap().pending_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_pool_leaves_work_to_the_push_worker() {
    let config = SyncConfig {
        immediate_sync: true,
        immediate_pool_size: 1,
        immediate_delay: Duration::from_millis(300),
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.connect().await;

    let app = h.coordinator.synced_store();
    for n in 0..3 {
        app.create(&Employee::new(format!("S{n}"), format!("Staff {n}")))
            .unwrap();
    }
    assert_eq!(h.coordinator.immediate_pool().in_flight(), 1);
    assert_eq!(h.coordinator.status().await.unwrap().stats.immediate_skipped, 2);

    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.immediate_pool().in_flight() == 0
        })
        .await
    );
    assert_eq!(coordinator.push_worker().drain().await.unwrap(), 0);
    assert_eq!(h.remote.rows(Table::Employees).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn immediate_push_keeps_newer_updates_queued() {
    let config = SyncConfig {
        immediate_sync: true,
        immediate_pool_size: 2,
        immediate_delay: Duration::from_millis(200),
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.connect().await;

    let app = h.coordinator.synced_store();
    let mut employee = Employee::new("E700", "Rana");
    let id = app.create(&employee).unwrap();
    employee.id = Some(id);
    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.immediate_pool().in_flight() == 0
        })
        .await
    );
    assert!(h.remote.get(Table::Employees, id).is_some());

    employee.name = "A".into();
    app.update(&employee).unwrap();
    employee.name = "B".into();
    app.update(&employee).unwrap();
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.immediate_pool().in_flight() == 0
        })
        .await
    );

    let queued = h.store().queue().fetch_pending(10).unwrap();
    assert!(queued.iter().any(|c| c.payload["name"] == json!("B")));

    assert_eq!(coordinator.push_worker().drain().await.unwrap(), 0);
    let remote = h.remote.get(Table::Employees, id).unwrap();
    assert_eq!(remote.fields["name"], json!("B"));
    let local = app.get_by_id::<Employee>(id).unwrap().unwrap();
    assert_eq!(local.name, "B");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn immediate_connectivity_failure_switches_to_local_only() {
    let config = SyncConfig {
        immediate_sync: true,
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.connect().await;
    h.remote.set_online(false);

    h.coordinator.synced_store().create(&Employee::new("E402", "Dina")).unwrap();
    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.mode() == SyncMode::Disconnected
        })
        .await
    );
    assert_eq!(h.store().queue().count(ChangeStatus::Pending).unwrap(), 1);
}

// ── Background loops ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn started_workers_push_queued_changes() {
    let h = Harness::new(fast_config());
    h.coordinator.connect().await;
    h.coordinator.start().await;
    h.coordinator.start().await;
    assert!(h.coordinator.is_running().await);

    h.coordinator.synced_store().create(&Employee::new("E500", "Tamer")).unwrap();
    let remote = h.remote.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            let remote = remote.clone();
            async move { remote.rows(Table::Employees).len() == 1 }
        })
        .await
    );

    h.coordinator.stop().await;
    assert!(!h.coordinator.is_running().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_workers_do_nothing_until_resumed() {
    let h = Harness::new(fast_config());
    h.coordinator.connect().await;
    h.coordinator.pause();
    h.coordinator.start().await;

    h.coordinator.synced_store().create(&Employee::new("E600", "Mai")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = h.coordinator.status().await.unwrap();
    assert!(status.paused);
    assert_eq!(status.pending_count, 1);
    assert_eq!(h.remote.write_attempts(), 0);

    h.coordinator.resume();
    let coordinator = &h.coordinator;
    assert!(
        wait_for(Duration::from_secs(5), || async move {
            coordinator.status().await.unwrap().pending_count == 0
        })
        .await
    );
    coordinator.stop().await;
}

#[tokio::test]
async fn stop_runs_a_final_drain() {
    let config = SyncConfig {
        push_interval: Duration::from_secs(3600),
        pull_interval: Duration::from_secs(3600),
        change_check_interval: Duration::from_secs(3600),
        final_drain_on_shutdown: true,
        ..manual_config()
    };
    let h = Harness::new(config);
    h.coordinator.connect().await;
    h.coordinator.start().await;
    h.coordinator.synced_store().create(&Employee::new("E700", "Reem")).unwrap();

    h.coordinator.stop().await;
    assert_eq!(h.coordinator.status().await.unwrap().pending_count, 0);
    assert_eq!(h.remote.rows(Table::Employees).len(), 1);
}

// ── Operator actions ─────────────────────────────────────────────

#[tokio::test]
async fn requeue_parked_retries_with_fresh_budget() {
    let h = Harness::new(manual_config());
    h.coordinator
        .synced_store()
        .create(&AttendanceEntry::check_in(RecordId::new(42), "2025-05-01"))
        .unwrap();
    h.coordinator.push_worker().run_cycle().await.unwrap();
    assert_eq!(h.coordinator.status().await.unwrap().parked_count, 1);

    h.remote
        .seed(Table::Employees, record(42, json!({"employee_code": "E42", "name": "Fady"})));
    assert_eq!(h.coordinator.requeue_parked().await.unwrap(), 1);
    let report = h.coordinator.push_worker().run_cycle().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(h.remote.rows(Table::Attendance).len(), 1);
}

#[tokio::test]
async fn queue_info_and_clear() {
    let h = Harness::new(manual_config());
    let app = h.coordinator.synced_store();
    app.create(&Employee::new("Q1", "One")).unwrap();
    app.create(&Employee::new("Q2", "Two")).unwrap();
    app.set_setting("locale", "ar").unwrap();

    let info = h.coordinator.sync_queue_info().await.unwrap();
    assert_eq!(info.counts.pending, 3);
    assert_eq!(info.pending_by_table.get("employees"), Some(&2));
    assert_eq!(info.pending_by_table.get("app_settings"), Some(&1));
    assert_eq!(info.recent.len(), 3);
    assert_eq!(info.recent[0].table, Table::Settings);

    assert_eq!(h.coordinator.clear_queue().await.unwrap(), 3);
    assert_eq!(h.coordinator.status().await.unwrap().pending_count, 0);
}

#[tokio::test]
async fn settings_sync_as_insert_then_update() {
    let h = Harness::new(manual_config());
    let app = h.coordinator.synced_store();
    let id = app.set_setting("theme", "light").unwrap();
    assert_eq!(app.set_setting("theme", "dark").unwrap(), id);

    h.coordinator.push_worker().drain().await.unwrap();
    let row = h.remote.get(Table::Settings, id).unwrap();
    assert_eq!(row.fields["value"], json!("dark"));
    assert_eq!(app.get_setting("theme").unwrap().as_deref(), Some("dark"));
}

#[tokio::test]
async fn health_reflects_remote_reachability() {
    let h = Harness::new(manual_config());
    let health = h.coordinator.health().await;
    assert!(health.local_ok);
    assert!(health.remote_ok);
    assert!(!health.workers_running);

    h.remote.set_online(false);
    assert!(!h.coordinator.health().await.remote_ok);
}
