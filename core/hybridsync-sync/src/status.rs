//! Engine status shared between the workers and readers.

use chrono::{DateTime, Utc};
use hybridsync_store::QueueCounts;
use hybridsync_types::PendingChange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

/// Whether synchronization is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Workers push and pull.
    Connected,
    /// Local-only mode. The local store keeps working; nothing is synced
    /// until an explicit reconnect.
    Disconnected,
}

/// Cumulative counters since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pushed: u64,
    pub duplicates: u64,
    pub parked: u64,
    pub retried: u64,
    pub push_cycles: u64,
    pub pull_cycles: u64,
    pub pulled_inserted: u64,
    pub pulled_updated: u64,
    pub pulled_deleted: u64,
    pub immediate_synced: u64,
    pub immediate_skipped: u64,
    pub remote_changes_detected: u64,
}

/// Snapshot returned by `SyncCoordinator::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub mode: SyncMode,
    pub remote_available: bool,
    pub paused: bool,
    pub provider: String,
    pub pending_count: u64,
    pub parked_count: u64,
    /// Changes held in memory because the queue could not be written.
    pub fallback_count: u64,
    pub last_push: Option<DateTime<Utc>>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stats: SyncStats,
}

/// Detailed queue view for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub counts: QueueCounts,
    pub pending_by_table: BTreeMap<String, u64>,
    pub recent: Vec<PendingChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub local_ok: bool,
    pub remote_ok: bool,
    pub workers_running: bool,
}

#[derive(Debug)]
struct Timeline {
    mode: SyncMode,
    last_push: Option<DateTime<Utc>>,
    last_pull: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub pushed: AtomicU64,
    pub duplicates: AtomicU64,
    pub parked: AtomicU64,
    pub retried: AtomicU64,
    pub push_cycles: AtomicU64,
    pub pull_cycles: AtomicU64,
    pub pulled_inserted: AtomicU64,
    pub pulled_updated: AtomicU64,
    pub pulled_deleted: AtomicU64,
    pub immediate_synced: AtomicU64,
    pub immediate_skipped: AtomicU64,
    pub remote_changes_detected: AtomicU64,
}

impl Counters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SyncStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncStats {
            pushed: get(&self.pushed),
            duplicates: get(&self.duplicates),
            parked: get(&self.parked),
            retried: get(&self.retried),
            push_cycles: get(&self.push_cycles),
            pull_cycles: get(&self.pull_cycles),
            pulled_inserted: get(&self.pulled_inserted),
            pulled_updated: get(&self.pulled_updated),
            pulled_deleted: get(&self.pulled_deleted),
            immediate_synced: get(&self.immediate_synced),
            immediate_skipped: get(&self.immediate_skipped),
            remote_changes_detected: get(&self.remote_changes_detected),
        }
    }
}

/// Mode, timestamps and counters, written by workers and read by status calls.
#[derive(Debug)]
pub(crate) struct SharedStatus {
    timeline: RwLock<Timeline>,
    paused: AtomicBool,
    pull_completed: AtomicBool,
    pub counters: Counters,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            timeline: RwLock::new(Timeline {
                mode: SyncMode::Disconnected,
                last_push: None,
                last_pull: None,
                last_error: None,
            }),
            paused: AtomicBool::new(false),
            pull_completed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.timeline.read().unwrap_or_else(PoisonError::into_inner).mode
    }

    pub fn is_connected(&self) -> bool {
        self.mode() == SyncMode::Connected
    }

    pub fn set_connected(&self) {
        let mut timeline = self.timeline.write().unwrap_or_else(PoisonError::into_inner);
        if timeline.mode != SyncMode::Connected {
            info!("Remote store reachable, sync connected");
        }
        timeline.mode = SyncMode::Connected;
    }

    /// Switches to local-only mode after a connectivity failure.
    pub fn go_offline(&self, reason: &str) {
        let mut timeline = self.timeline.write().unwrap_or_else(PoisonError::into_inner);
        if timeline.mode == SyncMode::Connected {
            warn!("Remote store unreachable, switching to local-only mode: {}", reason);
        }
        timeline.mode = SyncMode::Disconnected;
        timeline.last_error = Some(reason.to_string());
    }

    pub fn record_error(&self, error: impl ToString) {
        self.timeline.write().unwrap_or_else(PoisonError::into_inner).last_error = Some(error.to_string());
    }

    pub fn mark_push(&self) {
        self.timeline.write().unwrap_or_else(PoisonError::into_inner).last_push = Some(Utc::now());
        Counters::add(&self.counters.push_cycles, 1);
    }

    pub fn mark_pull(&self) {
        self.timeline.write().unwrap_or_else(PoisonError::into_inner).last_pull = Some(Utc::now());
        self.pull_completed.store(true, Ordering::SeqCst);
        Counters::add(&self.counters.pull_cycles, 1);
    }

    pub fn pull_completed(&self) -> bool {
        self.pull_completed.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Builds a status snapshot around the given queue figures.
    pub fn snapshot(&self, provider: &str, counts: QueueCounts, fallback_count: usize) -> SyncStatus {
        let timeline = self.timeline.read().unwrap_or_else(PoisonError::into_inner);
        SyncStatus {
            mode: timeline.mode,
            remote_available: timeline.mode == SyncMode::Connected,
            paused: self.is_paused(),
            provider: provider.to_string(),
            pending_count: counts.pending,
            parked_count: counts.parked,
            fallback_count: fallback_count as u64,
            last_push: timeline.last_push,
            last_pull: timeline.last_pull,
            last_error: timeline.last_error.clone(),
            stats: self.counters.snapshot(),
        }
    }
}
