//! Owns the workers and the engine mode.
//!
//! The coordinator wires the recorder, push worker, immediate pool, pull
//! worker and change detector around one local store and one remote
//! client, runs their loops as tokio tasks, and exposes status and
//! operator actions.
//!
//! Mode changes: any connectivity failure moves the engine to
//! [`SyncMode::Disconnected`]. Only [`connect`](SyncCoordinator::connect)
//! and [`force_full_sync`](SyncCoordinator::force_full_sync) move it back.

use crate::blocking;
use crate::claims::RecordClaims;
use crate::config::SyncConfig;
use crate::detector::{ChangeDetector, ChangeInfo};
use crate::error::SyncResult;
use crate::facade::SyncedStore;
use crate::immediate::ImmediateSyncPool;
use crate::pull::PullWorker;
use crate::push::PushWorker;
use crate::recorder::ChangeRecorder;
use crate::remote::RemoteClient;
use crate::status::{Counters, HealthReport, QueueInfo, SharedStatus, SyncMode, SyncStatus};
use hybridsync_store::LocalStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Entries returned by [`SyncCoordinator::sync_queue_info`].
const RECENT_QUEUE_ENTRIES: usize = 20;

/// Running background loops.
struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// The hybrid sync engine.
pub struct SyncCoordinator {
    store: LocalStore,
    remote: Arc<dyn RemoteClient>,
    config: SyncConfig,
    status: Arc<SharedStatus>,
    recorder: Arc<ChangeRecorder>,
    detector: Arc<ChangeDetector>,
    push: Arc<PushWorker>,
    pull: Arc<PullWorker>,
    immediate: Arc<ImmediateSyncPool>,
    workers: Mutex<Option<Workers>>,
}

impl SyncCoordinator {
    /// Builds the engine in local-only mode. Call [`connect`](Self::connect)
    /// and [`start`](Self::start) to begin syncing.
    ///
    /// Must be called inside a tokio runtime for immediate sync to work.
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteClient>, config: SyncConfig) -> Self {
        let status = Arc::new(SharedStatus::new());
        let recorder = Arc::new(ChangeRecorder::new(store.recorder_queue()));
        let detector = Arc::new(ChangeDetector::new(remote.clone()));
        let claims = RecordClaims::new();
        let push = Arc::new(PushWorker::new(
            store.clone(),
            remote.clone(),
            recorder.clone(),
            status.clone(),
            claims.clone(),
            config.clone(),
        ));
        let pull = Arc::new(PullWorker::new(
            store.clone(),
            remote.clone(),
            recorder.clone(),
            status.clone(),
        ));
        let immediate = Arc::new(ImmediateSyncPool::new(
            remote.clone(),
            store.recorder_queue(),
            status.clone(),
            claims,
            config.immediate_pool_size,
            config.immediate_delay,
            config.immediate_sync,
        ));

        Self {
            store,
            remote,
            config,
            status,
            recorder,
            detector,
            push,
            pull,
            immediate,
            workers: Mutex::new(None),
        }
    }

    /// Application-facing store that records and pushes every mutation.
    pub fn synced_store(&self) -> SyncedStore {
        SyncedStore::new(
            self.store.clone(),
            self.recorder.clone(),
            self.immediate.clone(),
            self.status.clone(),
        )
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.store
    }

    pub fn mode(&self) -> SyncMode {
        self.status.mode()
    }

    pub fn push_worker(&self) -> &PushWorker {
        &self.push
    }

    pub fn pull_worker(&self) -> &PullWorker {
        &self.pull
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn immediate_pool(&self) -> &ImmediateSyncPool {
        &self.immediate
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Checks the remote store and sets the mode accordingly.
    pub async fn connect(&self) -> SyncMode {
        match self.detector.has_remote_changes().await {
            Ok(_) => self.status.set_connected(),
            Err(e) => {
                self.status.go_offline(&e.to_string());
                info!(
                    "Starting in local-only mode; use force_full_sync to reconnect ({})",
                    e
                );
            }
        }
        self.status.mode()
    }

    /// Spawns the push, pull, detector and cleanup loops. No-op when
    /// already running.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(4);

        let (push, status) = (self.push.clone(), self.status.clone());
        handles.push(spawn_loop("push", self.config.push_interval, shutdown_rx.clone(), move || {
            let (push, status) = (push.clone(), status.clone());
            async move {
                if status.is_paused() || !status.is_connected() {
                    return;
                }
                if let Err(e) = push.run_cycle().await {
                    debug!("Push cycle ended early: {}", e);
                }
            }
        }));

        let (pull, detector, status) = (self.pull.clone(), self.detector.clone(), self.status.clone());
        let gated = self.config.gate_pull_on_changes;
        handles.push(spawn_loop("pull", self.config.pull_interval, shutdown_rx.clone(), move || {
            let (pull, detector, status) = (pull.clone(), detector.clone(), status.clone());
            async move {
                if status.is_paused() || !status.is_connected() {
                    return;
                }
                if gated && status.pull_completed() && !detector.has_pending_changes() {
                    return;
                }
                pull_and_rebase(&pull, &detector).await;
            }
        }));

        let (detector, status) = (self.detector.clone(), self.status.clone());
        handles.push(spawn_loop(
            "change detector",
            self.config.change_check_interval,
            shutdown_rx.clone(),
            move || {
                let (detector, status) = (detector.clone(), status.clone());
                async move {
                    if !status.is_connected() {
                        return;
                    }
                    let seen = detector.change_info().change_count;
                    match detector.has_remote_changes().await {
                        Ok(_) => {
                            let detected = detector.change_info().change_count.saturating_sub(seen);
                            Counters::add(&status.counters.remote_changes_detected, detected);
                        }
                        Err(e) if e.is_connectivity() => status.go_offline(&e.to_string()),
                        Err(e) => debug!("Change check failed: {}", e),
                    }
                }
            },
        ));

        let push = self.push.clone();
        handles.push(spawn_loop("cleanup", self.config.cleanup_interval, shutdown_rx, move || {
            let push = push.clone();
            async move {
                if let Err(e) = push.cleanup().await {
                    warn!("Queue cleanup failed: {}", e);
                }
            }
        }));

        info!("Sync workers started in {:?} mode", self.status.mode());
        *workers = Some(Workers { shutdown, handles });
    }

    /// Stops the loops and the immediate pool, each bounded by
    /// `shutdown_timeout`, then optionally pushes once more.
    pub async fn stop(&self) {
        let timeout = self.config.shutdown_timeout;
        if let Some(workers) = self.workers.lock().await.take() {
            let _ = workers.shutdown.send(true);
            for mut handle in workers.handles {
                if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                    warn!("Worker did not stop within {:?}, aborting", timeout);
                    handle.abort();
                }
            }
        }
        self.immediate.shutdown(timeout).await;

        if self.config.final_drain_on_shutdown && self.status.is_connected() {
            match tokio::time::timeout(timeout, self.push.run_cycle()).await {
                Ok(Ok(report)) => debug!("Final drain left {} pending", report.remaining),
                Ok(Err(e)) => debug!("Final drain failed: {}", e),
                Err(_) => warn!("Final drain timed out"),
            }
        }
        info!("Sync stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.workers.lock().await.is_some()
    }

    // ── Operator actions ─────────────────────────────────────────

    /// Reconnects, pulls every table, then pushes until the queue is empty
    /// or stops making progress. Returns true when everything succeeded
    /// and nothing is left pending.
    pub async fn force_full_sync(&self) -> bool {
        info!("Forcing full sync");
        if let Err(e) = self.detector.fingerprint().await {
            self.status.go_offline(&e.to_string());
            warn!("Full sync aborted, remote unreachable: {}", e);
            return false;
        }
        self.status.set_connected();

        let mut ok = true;
        if let Err(e) = self.pull.run_all().await {
            warn!("Full sync pull failed: {}", e);
            ok = false;
        }
        if self.status.is_connected() {
            match self.push.drain().await {
                Ok(0) => {}
                Ok(remaining) => {
                    warn!("Full sync left {} entries pending", remaining);
                    ok = false;
                }
                Err(e) => {
                    warn!("Full sync push failed: {}", e);
                    ok = false;
                }
            }
        } else {
            ok = false;
        }

        match self.detector.fingerprint().await {
            Ok(fingerprint) => self.detector.mark_synced(fingerprint),
            Err(e) => {
                debug!("Could not refresh change baseline: {}", e);
                ok = false;
            }
        }
        info!("Full sync finished (success: {})", ok);
        ok
    }

    /// Workers keep ticking but do no work while paused.
    pub fn pause(&self) {
        self.status.set_paused(true);
        info!("Sync paused");
    }

    pub fn resume(&self) {
        self.status.set_paused(false);
        info!("Sync resumed");
    }

    /// Moves parked entries back to pending.
    pub async fn requeue_parked(&self) -> SyncResult<usize> {
        let queue = self.store.queue();
        let requeued = blocking::run(move || queue.requeue_parked()).await?;
        info!("Requeued {} parked entries", requeued);
        Ok(requeued)
    }

    /// Deletes every queue entry. Unsynced local changes will not be pushed.
    pub async fn clear_queue(&self) -> SyncResult<usize> {
        let queue = self.store.queue();
        let cleared = blocking::run(move || queue.clear()).await?;
        warn!("Cleared {} queue entries", cleared);
        Ok(cleared)
    }

    // ── Status ───────────────────────────────────────────────────

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let queue = self.store.queue();
        let counts = blocking::run(move || queue.counts()).await?;
        Ok(self
            .status
            .snapshot(self.remote.provider_name(), counts, self.recorder.fallback_len()))
    }

    pub fn change_info(&self) -> ChangeInfo {
        self.detector.change_info()
    }

    pub async fn sync_queue_info(&self) -> SyncResult<QueueInfo> {
        let queue = self.store.queue();
        blocking::run(move || {
            Ok(QueueInfo {
                counts: queue.counts()?,
                pending_by_table: queue.pending_by_table()?,
                recent: queue.recent(RECENT_QUEUE_ENTRIES)?,
            })
        })
        .await
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.store.clone();
        let local_ok = matches!(blocking::run(move || store.ping()).await, Ok(()));
        let remote_ok = self.detector.fingerprint().await.is_ok();
        HealthReport {
            local_ok,
            remote_ok,
            workers_running: self.is_running().await,
        }
    }
}

/// Runs a pull and, when it completed, adopts the current remote
/// fingerprint as the detector baseline.
async fn pull_and_rebase(pull: &PullWorker, detector: &ChangeDetector) {
    if let Err(e) = pull.run_all().await {
        debug!("Pull cycle ended early: {}", e);
        return;
    }
    match detector.fingerprint().await {
        Ok(fingerprint) => detector.mark_synced(fingerprint),
        Err(e) => debug!("Could not refresh change baseline: {}", e),
    }
}

/// Spawns a loop calling `tick` every `period` until `shutdown` flips.
fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("{} loop stopped", name);
    })
}
