//! Reconciles the local store with the remote snapshot, remote wins.
//!
//! Per table, in parent-before-child order:
//!
//! - rows only present remotely are written locally with their remote id
//! - rows present on both sides that differ on the table's compared
//!   columns are overwritten with the remote values
//! - rows only present locally are deleted, unless they still have a
//!   queued INSERT (not pushed yet)
//!
//! A remote-only row with a queued local DELETE is left alone so the
//! deletion is not undone before it is pushed.

use crate::blocking;
use crate::error::SyncResult;
use crate::recorder::ChangeRecorder;
use crate::remote::RemoteClient;
use crate::status::{Counters, SharedStatus};
use hybridsync_store::LocalStore;
use hybridsync_types::{Operation, Record, RecordId, Table, fields_differ};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of pulling one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePullReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Rows left alone: protected by the queue, or failed to apply.
    pub skipped: usize,
}

impl TablePullReport {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Outcome of a pull over every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub tables: BTreeMap<Table, TablePullReport>,
}

impl PullReport {
    pub fn total(&self) -> TablePullReport {
        self.tables.values().fold(TablePullReport::default(), |acc, t| TablePullReport {
            inserted: acc.inserted + t.inserted,
            updated: acc.updated + t.updated,
            deleted: acc.deleted + t.deleted,
            skipped: acc.skipped + t.skipped,
        })
    }
}

/// Local writes decided by comparing the two snapshots.
#[derive(Debug, Default)]
struct Plan {
    inserts: Vec<Record>,
    updates: Vec<Record>,
    deletes: Vec<RecordId>,
    skipped: usize,
}

/// Periodic remote-to-local reconciliation.
pub struct PullWorker {
    store: LocalStore,
    remote: Arc<dyn RemoteClient>,
    recorder: Arc<ChangeRecorder>,
    status: Arc<SharedStatus>,
}

impl PullWorker {
    pub(crate) fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteClient>,
        recorder: Arc<ChangeRecorder>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self {
            store,
            remote,
            recorder,
            status,
        }
    }

    /// Pulls every table. Stops at the first error; a connectivity error
    /// also switches to local-only mode.
    pub async fn run_all(&self) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        for table in Table::ALL {
            match self.pull_table(table).await {
                Ok(table_report) => {
                    report.tables.insert(table, table_report);
                }
                Err(e) => {
                    if e.is_connectivity() {
                        self.status.go_offline(&e.to_string());
                    } else {
                        warn!("Pull of {} failed: {}", table, e);
                        self.status.record_error(&e);
                    }
                    return Err(e);
                }
            }
        }

        let total = report.total();
        let counters = &self.status.counters;
        Counters::add(&counters.pulled_inserted, total.inserted as u64);
        Counters::add(&counters.pulled_updated, total.updated as u64);
        Counters::add(&counters.pulled_deleted, total.deleted as u64);
        self.status.mark_pull();

        if total.changed() > 0 {
            info!(
                "Pull: {} inserted, {} updated, {} deleted, {} skipped",
                total.inserted, total.updated, total.deleted, total.skipped
            );
        }
        Ok(report)
    }

    /// Reconciles one table.
    pub async fn pull_table(&self, table: Table) -> SyncResult<TablePullReport> {
        // Local state is read before the remote snapshot: a row created
        // after this point is missing from `local` and cannot be deleted.
        let store = self.store.clone();
        let queue = self.store.queue();
        let (local, mut queued_inserts, mut queued_deletes) = blocking::run(move || {
            let local = store.get_all(table)?;
            let inserts = queue.queued_record_ids(table, Operation::Insert)?;
            let deletes = queue.queued_record_ids(table, Operation::Delete)?;
            Ok((local, inserts, deletes))
        })
        .await?;
        queued_inserts.extend(self.recorder.held_record_ids(table, Operation::Insert));
        queued_deletes.extend(self.recorder.held_record_ids(table, Operation::Delete));

        let remote = self.remote.get_all(table).await?;

        let mut local: HashMap<RecordId, Record> = local.into_iter().map(|r| (r.id, r)).collect();
        let mut plan = Plan::default();

        for record in remote {
            let record = record.retain_columns(table);
            match local.remove(&record.id) {
                None if queued_deletes.contains(&record.id) => plan.skipped += 1,
                None => plan.inserts.push(record),
                Some(existing) => {
                    if fields_differ(table.compared_columns(), &record.fields, &existing.fields) {
                        plan.updates.push(record);
                    }
                }
            }
        }
        for id in local.into_keys() {
            if queued_inserts.contains(&id) {
                plan.skipped += 1;
            } else {
                plan.deletes.push(id);
            }
        }

        let store = self.store.clone();
        let report = blocking::run(move || Ok(apply(&store, table, plan))).await?;
        debug!(
            "Pulled {}: {} inserted, {} updated, {} deleted, {} skipped",
            table, report.inserted, report.updated, report.deleted, report.skipped
        );
        Ok(report)
    }
}

/// Applies a plan row by row. A row that fails is counted as skipped so one
/// bad row does not block the rest of the table.
fn apply(store: &LocalStore, table: Table, plan: Plan) -> TablePullReport {
    let mut report = TablePullReport {
        skipped: plan.skipped,
        ..Default::default()
    };
    for record in plan.inserts {
        match store.upsert_remote(table, &record) {
            Ok(()) => report.inserted += 1,
            Err(e) => {
                warn!("Could not insert pulled {} #{}: {}", table, record.id, e);
                report.skipped += 1;
            }
        }
    }
    for record in plan.updates {
        match store.apply_remote_update(table, record.id, &record.fields) {
            Ok(_) => report.updated += 1,
            Err(e) => {
                warn!("Could not update pulled {} #{}: {}", table, record.id, e);
                report.skipped += 1;
            }
        }
    }
    for id in plan.deletes {
        match store.delete_remote(table, id) {
            Ok(_) => report.deleted += 1,
            Err(e) => {
                warn!("Could not delete {} #{} missing remotely: {}", table, id, e);
                report.skipped += 1;
            }
        }
    }
    report
}
