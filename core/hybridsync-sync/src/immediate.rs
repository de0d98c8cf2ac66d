//! Best-effort push of each mutation right after it is recorded.
//!
//! The pool is bounded: when every permit is taken the mutation is left to
//! the PushWorker. Failures are only logged, the queue entry stays in place.
//!
//! A task holds its record's claim from scheduling to completion. It only
//! pushes when its entry is the record's oldest queued change and the newest
//! one for its operation; otherwise the PushWorker replays the record in
//! order. On success it clears its triple up to its own entry.

use crate::blocking;
use crate::claims::RecordClaims;
use crate::push::{PushOutcome, push_change};
use crate::remote::RemoteClient;
use crate::status::{Counters, SharedStatus};
use hybridsync_store::ChangeQueue;
use hybridsync_types::{ChangeId, NewChange};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Bounded set of immediate push tasks.
pub struct ImmediateSyncPool {
    remote: Arc<dyn RemoteClient>,
    /// Queue handle with the short recorder timeout.
    queue: ChangeQueue,
    status: Arc<SharedStatus>,
    claims: Arc<RecordClaims>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    runtime: Option<Handle>,
    delay: Duration,
    enabled: bool,
    closed: AtomicBool,
}

impl ImmediateSyncPool {
    /// Creates the pool. Tasks are spawned on the runtime current at this
    /// call; without one the pool stays disabled.
    pub(crate) fn new(
        remote: Arc<dyn RemoteClient>,
        queue: ChangeQueue,
        status: Arc<SharedStatus>,
        claims: Arc<RecordClaims>,
        size: usize,
        delay: Duration,
        enabled: bool,
    ) -> Self {
        let runtime = Handle::try_current().ok();
        if enabled && runtime.is_none() {
            warn!("No tokio runtime available, immediate sync disabled");
        }
        Self {
            remote,
            queue,
            status,
            claims,
            permits: Arc::new(Semaphore::new(size)),
            tasks: Mutex::new(JoinSet::new()),
            runtime,
            delay,
            enabled: enabled && size > 0,
            closed: AtomicBool::new(false),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Starts an immediate push of `change`, queued as entry `id`. Returns
    /// `false` when the pool is disabled, shutting down or saturated, or
    /// when the record is already being pushed.
    pub fn try_sync(&self, id: ChangeId, change: NewChange) -> bool {
        if !self.enabled || self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(runtime) = &self.runtime else {
            return false;
        };
        let Some(claim) = self.claims.try_claim(change.table, change.record_id) else {
            debug!(
                "{} #{} already being pushed, leaving change {} to the push worker",
                change.table, change.record_id, id
            );
            Counters::add(&self.status.counters.immediate_skipped, 1);
            return false;
        };
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            debug!(
                "Immediate pool saturated, leaving {} {} #{} to the push worker",
                change.operation, change.table, change.record_id
            );
            Counters::add(&self.status.counters.immediate_skipped, 1);
            return false;
        };

        let remote = self.remote.clone();
        let queue = self.queue.clone();
        let status = self.status.clone();
        let delay = self.delay;
        let task = async move {
            let _permit = permit;
            let _claim = claim;
            tokio::time::sleep(delay).await;

            let (table, record_id, operation) = (change.table, change.record_id, change.operation);
            let check = queue.clone();
            let out_of_turn = blocking::run(move || {
                Ok(check.get(id)?.is_none()
                    || check.has_earlier(table, record_id, id)?
                    || check.has_newer(table, record_id, operation, id)?)
            })
            .await;
            match out_of_turn {
                Ok(false) => {}
                Ok(true) => {
                    debug!("Change {} is not next for {} #{}, leaving it to the push worker", id, table, record_id);
                    Counters::add(&status.counters.immediate_skipped, 1);
                    return;
                }
                Err(e) => {
                    debug!("Immediate sync could not inspect the queue: {}", e);
                    return;
                }
            }

            let result = push_change(remote.as_ref(), table, operation, record_id, &change.payload).await;
            match result {
                Ok(outcome) => {
                    match blocking::run(move || queue.remove_matching(table, record_id, operation, id)).await {
                        Ok(_) => {}
                        // The push worker clears the entry on its next pass.
                        Err(e) => debug!("Immediate sync could not clear queue entry: {}", e),
                    }
                    if outcome == PushOutcome::AlreadyApplied {
                        Counters::add(&status.counters.duplicates, 1);
                    }
                    Counters::add(&status.counters.immediate_synced, 1);
                }
                Err(e) if e.is_connectivity() => status.go_offline(&e.to_string()),
                Err(e) => debug!("Immediate sync of {} {} #{} failed: {}", operation, table, record_id, e),
            }
        };

        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task, runtime);
        true
    }

    /// Stops accepting work and waits up to `timeout` for running tasks;
    /// stragglers are aborted.
    pub async fn shutdown(&self, timeout: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        let mut tasks = std::mem::take(&mut *self.tasks());
        if tasks.is_empty() {
            return;
        }
        let joined = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            warn!("Aborting {} immediate sync tasks still running at shutdown", tasks.len());
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}
