//! Shared setup for sync integration tests.

#![allow(dead_code)]

use hybridsync_store::LocalStore;
use hybridsync_sync::{MemoryRemote, SyncConfig, SyncCoordinator};
use hybridsync_types::{Fields, Record, RecordId};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

pub fn record(id: i64, value: Value) -> Record {
    Record::new(RecordId::new(id), fields(value))
}

/// Config with background pushes disabled so tests drive cycles by hand.
pub fn manual_config() -> SyncConfig {
    SyncConfig {
        immediate_sync: false,
        immediate_delay: Duration::from_millis(10),
        final_drain_on_shutdown: false,
        shutdown_timeout: Duration::from_secs(1),
        ..SyncConfig::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub remote: Arc<MemoryRemote>,
    pub coordinator: SyncCoordinator,
}

impl Harness {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_remote(Arc::new(MemoryRemote::new()), config)
    }

    pub fn with_remote(remote: Arc<MemoryRemote>, config: SyncConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let coordinator = open_coordinator(&dir.path().join("local.db"), remote.clone(), config);
        Self {
            dir,
            remote,
            coordinator,
        }
    }

    pub fn store(&self) -> &LocalStore {
        self.coordinator.local_store()
    }
}

pub fn open_coordinator(path: &Path, remote: Arc<MemoryRemote>, config: SyncConfig) -> SyncCoordinator {
    let store = LocalStore::open(path).unwrap();
    SyncCoordinator::new(store, remote, config)
}

/// Polls `check` until it returns true or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}
