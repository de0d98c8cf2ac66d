//! Cheap remote change detection.
//!
//! A [`Fingerprint`] is the per-table row count of the remote store, hashed
//! into one hex digest. Comparing it with the previous baseline tells the
//! pull worker whether a full reconciliation pass is worth running.

use crate::error::SyncResult;
use crate::remote::RemoteClient;
use chrono::{DateTime, Utc};
use hybridsync_types::Table;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Summary of the remote store used to detect changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub counts: BTreeMap<Table, u64>,
    pub hash: String,
}

impl Fingerprint {
    pub fn from_counts(counts: BTreeMap<Table, u64>) -> Self {
        let mut hasher = Sha256::new();
        for (table, count) in &counts {
            hasher.update(table.name().as_bytes());
            hasher.update(b":");
            hasher.update(count.to_be_bytes());
            hasher.update(b";");
        }
        let hash = hex::encode(hasher.finalize());
        Self { counts, hash }
    }

    /// Tables whose count differs from `other`.
    pub fn changed_tables(&self, other: &Fingerprint) -> Vec<Table> {
        Table::ALL
            .into_iter()
            .filter(|t| self.counts.get(t) != other.counts.get(t))
            .collect()
    }
}

/// Detector state exposed to operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub has_changes: bool,
    pub change_count: u64,
    pub last_change_time: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub changed_tables: Vec<Table>,
}

#[derive(Debug, Default)]
struct DetectorState {
    baseline: Option<Fingerprint>,
    info: ChangeInfo,
}

/// Compares remote fingerprints against a baseline.
pub struct ChangeDetector {
    remote: Arc<dyn RemoteClient>,
    state: RwLock<DetectorState>,
}

impl ChangeDetector {
    pub fn new(remote: Arc<dyn RemoteClient>) -> Self {
        Self {
            remote,
            state: RwLock::new(DetectorState::default()),
        }
    }

    /// Counts every table remotely.
    pub async fn fingerprint(&self) -> SyncResult<Fingerprint> {
        let mut counts = BTreeMap::new();
        for table in Table::ALL {
            counts.insert(table, self.remote.count(table).await?);
        }
        Ok(Fingerprint::from_counts(counts))
    }

    /// Takes a fresh fingerprint and compares it with the baseline.
    ///
    /// The first call only records the baseline. Returns whether changes
    /// have been seen since the last [`mark_synced`](Self::mark_synced).
    pub async fn has_remote_changes(&self) -> SyncResult<bool> {
        let current = self.fingerprint().await?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        state.info.last_check = Some(now);

        let changed = match state.baseline.as_ref() {
            None => {
                state.baseline = Some(current);
                return Ok(state.info.has_changes);
            }
            Some(baseline) if baseline.hash == current.hash => {
                debug!("No remote changes");
                return Ok(state.info.has_changes);
            }
            Some(baseline) => current.changed_tables(baseline),
        };

        info!("Remote changes detected in {:?}", changed);
        for table in changed {
            if !state.info.changed_tables.contains(&table) {
                state.info.changed_tables.push(table);
            }
        }
        state.info.has_changes = true;
        state.info.change_count += 1;
        state.info.last_change_time = Some(now);
        state.baseline = Some(current);
        Ok(true)
    }

    /// Adopts `fingerprint` as the new baseline and clears the change flag.
    pub fn mark_synced(&self, fingerprint: Fingerprint) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.baseline = Some(fingerprint);
        state.info.has_changes = false;
        state.info.changed_tables.clear();
    }

    /// Whether changes were flagged since the last sync.
    pub fn has_pending_changes(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).info.has_changes
    }

    pub fn change_info(&self) -> ChangeInfo {
        self.state.read().unwrap_or_else(PoisonError::into_inner).info.clone()
    }
}
