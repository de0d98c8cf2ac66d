//! Pushes queued local mutations to the remote store.
//!
//! Each cycle flushes the recorder's in-memory fallback, then replays up to
//! `batch_size` pending entries in FIFO order:
//!
//! - success, or a duplicate-key rejection of an INSERT/UPDATE, removes
//!   the queued entries with the same `(table, record, operation)` up to the
//!   newest one fetched in this batch
//! - a referential rejection parks the entry at once
//! - a connectivity failure ends the cycle and switches to local-only mode
//!   without counting an attempt
//! - anything else counts a failed attempt; the entry is parked once it
//!   reaches `max_retries`
//!
//! Entries of one record go out in queue order. Once an entry of a record
//! fails or is parked, the record's later entries wait for a later cycle.
//! A record with a parked entry stays blocked until that entry is requeued
//! or purged. Records claimed by the immediate pool are skipped.

use crate::blocking;
use crate::claims::{Claim, RecordClaims};
use crate::config::SyncConfig;
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::recorder::ChangeRecorder;
use crate::remote::RemoteClient;
use crate::status::{Counters, SharedStatus};
use hybridsync_store::LocalStore;
use hybridsync_types::{ChangeId, ChangeStatus, Fields, Operation, PendingChange, RecordId, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a single push ended on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// Rejected as a duplicate, which means it was already applied.
    AlreadyApplied,
}

/// Summary of one push cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub flushed: usize,
    pub pushed: usize,
    pub duplicates: usize,
    pub parked: usize,
    pub retried: usize,
    /// Entries left for a later cycle because an earlier entry of the same
    /// record failed, is parked, or is being pushed by the immediate pool.
    pub deferred: usize,
    /// Pending entries left after the cycle.
    pub remaining: u64,
}

impl PushReport {
    /// Whether any entry left the pending set during the cycle.
    pub fn made_progress(&self) -> bool {
        self.pushed + self.duplicates + self.parked > 0
    }
}

/// Replays one mutation against the remote store.
///
/// INSERT payloads always carry the record id, so the remote row keeps the
/// local primary key.
pub async fn push_change(
    remote: &dyn RemoteClient,
    table: Table,
    operation: Operation,
    record_id: RecordId,
    payload: &Fields,
) -> SyncResult<PushOutcome> {
    let result = match operation {
        Operation::Insert => {
            let mut row = payload.clone();
            row.entry("id").or_insert(Value::from(record_id.get()));
            remote.insert(table, &row).await
        }
        Operation::Update => remote.update(table, record_id, payload).await,
        Operation::Delete => remote.delete(table, record_id).await,
    };
    match result {
        Ok(()) => Ok(PushOutcome::Applied),
        Err(e) if e.kind() == FailureKind::Duplicate && operation.duplicate_is_success() => {
            debug!("{} {} #{} already applied remotely: {}", operation, table, record_id, e);
            Ok(PushOutcome::AlreadyApplied)
        }
        Err(e) => Err(e),
    }
}

/// Periodic queue replay.
pub struct PushWorker {
    store: LocalStore,
    remote: Arc<dyn RemoteClient>,
    recorder: Arc<ChangeRecorder>,
    status: Arc<SharedStatus>,
    claims: Arc<RecordClaims>,
    config: SyncConfig,
}

impl PushWorker {
    pub(crate) fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteClient>,
        recorder: Arc<ChangeRecorder>,
        status: Arc<SharedStatus>,
        claims: Arc<RecordClaims>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            recorder,
            status,
            claims,
            config,
        }
    }

    /// Runs one push cycle.
    ///
    /// Returns `SyncError::Connectivity` when the remote became unreachable;
    /// entries pushed before that stay removed.
    pub async fn run_cycle(&self) -> SyncResult<PushReport> {
        let mut report = PushReport::default();

        let recorder = self.recorder.clone();
        let queue = self.store.queue();
        let batch_size = self.config.batch_size;
        let (flushed, batch, parked_floors) = blocking::run(move || {
            let flushed = recorder.flush_fallback();
            Ok((flushed, queue.fetch_pending(batch_size)?, queue.parked_floors()?))
        })
        .await?;
        report.flushed = flushed;

        // Clearing a triple drops its later entries in this batch too, so an
        // UPDATE is sent with the newest payload fetched for it.
        let mut latest: HashMap<_, Fields> = HashMap::new();
        let mut newest: HashMap<_, ChangeId> = HashMap::new();
        for change in &batch {
            if change.operation == Operation::Update {
                latest.insert(change.dedupe_key(), change.payload.clone());
            }
            let id = newest.entry(change.dedupe_key()).or_insert(change.id);
            *id = (*id).max(change.id);
        }

        let mut cleared = HashSet::new();
        let mut blocked = HashSet::new();
        let mut claimed: HashMap<(Table, RecordId), Claim> = HashMap::new();
        for change in batch {
            let key = change.dedupe_key();
            if cleared.contains(&key) {
                continue;
            }
            let record = (change.table, change.record_id);
            let behind_parked = parked_floors.get(&record).is_some_and(|floor| *floor < change.id);
            if blocked.contains(&record) || behind_parked {
                report.deferred += 1;
                continue;
            }
            if !claimed.contains_key(&record) {
                let Some(claim) = self.claims.try_claim(change.table, change.record_id) else {
                    debug!("{} #{} is being pushed immediately, deferring", change.table, change.record_id);
                    blocked.insert(record);
                    report.deferred += 1;
                    continue;
                };
                claimed.insert(record, claim);
            }

            let payload = latest.get(&key).unwrap_or(&change.payload);
            match push_change(
                self.remote.as_ref(),
                change.table,
                change.operation,
                change.record_id,
                payload,
            )
            .await
            {
                Ok(outcome) => {
                    let through = newest.get(&key).copied().unwrap_or(change.id);
                    if let Err(e) = self.remove(&change, through).await {
                        // Replayed next cycle, where it dedupes as a duplicate.
                        warn!("Pushed change {} but could not clear it from the queue: {}", change.id, e);
                    }
                    cleared.insert(key);
                    match outcome {
                        PushOutcome::Applied => report.pushed += 1,
                        PushOutcome::AlreadyApplied => report.duplicates += 1,
                    }
                }
                Err(e) => {
                    blocked.insert(record);
                    match e.kind() {
                        FailureKind::Connectivity => {
                            self.status.go_offline(&e.to_string());
                            self.finish(&report);
                            return Err(e);
                        }
                        FailureKind::Referential => {
                            warn!(
                                "Parking {} {} #{}: referenced row missing remotely: {}",
                                change.operation, change.table, change.record_id, e
                            );
                            self.park(&change, &e).await?;
                            report.parked += 1;
                        }
                        FailureKind::Duplicate | FailureKind::Transient => {
                            debug!("Push of change {} failed: {}", change.id, e);
                            self.status.record_error(&e);
                            match self.record_failure(&change, &e).await? {
                                ChangeStatus::Parked => report.parked += 1,
                                _ => report.retried += 1,
                            }
                        }
                    }
                }
            }
        }
        drop(claimed);

        let queue = self.store.queue();
        report.remaining = blocking::run(move || queue.count(ChangeStatus::Pending)).await?;
        self.finish(&report);

        if report.made_progress() {
            info!(
                "Push cycle: {} pushed, {} duplicates, {} parked, {} retried, {} deferred, {} remaining",
                report.pushed, report.duplicates, report.parked, report.retried, report.deferred, report.remaining
            );
        }
        Ok(report)
    }

    /// Pushes until the queue is empty or a cycle makes no progress.
    pub async fn drain(&self) -> SyncResult<u64> {
        loop {
            let report = self.run_cycle().await?;
            if report.remaining == 0 || !report.made_progress() {
                return Ok(report.remaining);
            }
        }
    }

    /// Deletes parked entries older than the retention period.
    pub async fn cleanup(&self) -> SyncResult<usize> {
        let retention = chrono::Duration::from_std(self.config.parked_retention)
            .map_err(|e| SyncError::Config(format!("parked_retention out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - retention;
        let queue = self.store.queue();
        let purged = blocking::run(move || queue.purge_parked(cutoff)).await?;
        if purged > 0 {
            info!("Purged {} parked queue entries", purged);
        }
        Ok(purged)
    }

    fn finish(&self, report: &PushReport) {
        let counters = &self.status.counters;
        Counters::add(&counters.pushed, report.pushed as u64);
        Counters::add(&counters.duplicates, report.duplicates as u64);
        Counters::add(&counters.parked, report.parked as u64);
        Counters::add(&counters.retried, report.retried as u64);
        self.status.mark_push();
    }

    async fn remove(&self, change: &PendingChange, through: ChangeId) -> SyncResult<usize> {
        let queue = self.store.queue();
        let (table, record_id, operation) = change.dedupe_key();
        blocking::run(move || queue.remove_matching(table, record_id, operation, through)).await
    }

    async fn park(&self, change: &PendingChange, error: &SyncError) -> SyncResult<bool> {
        let queue = self.store.queue();
        let id = change.id;
        let message = error.to_string();
        blocking::run(move || queue.park(id, &message)).await
    }

    async fn record_failure(&self, change: &PendingChange, error: &SyncError) -> SyncResult<ChangeStatus> {
        let queue = self.store.queue();
        let id = change.id;
        let message = error.to_string();
        let max_retries = self.config.max_retries;
        blocking::run(move || queue.record_failure(id, &message, max_retries)).await
    }
}
