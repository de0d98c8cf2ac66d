//! Per-record exclusion between the push worker and the immediate pool.
//!
//! Only one pusher may have a record in flight at a time, so two pushes of
//! the same row never reach the remote store out of order.

use hybridsync_types::{RecordId, Table};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type RecordKey = (Table, RecordId);

#[derive(Debug, Default)]
pub(crate) struct RecordClaims {
    held: Mutex<HashSet<RecordKey>>,
}

impl RecordClaims {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> MutexGuard<'_, HashSet<RecordKey>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the record, or returns `None` while someone else holds it.
    pub(crate) fn try_claim(self: &Arc<Self>, table: Table, record_id: RecordId) -> Option<Claim> {
        if !self.held().insert((table, record_id)) {
            return None;
        }
        Some(Claim {
            claims: self.clone(),
            key: (table, record_id),
        })
    }
}

/// Releases the record when dropped.
#[derive(Debug)]
pub(crate) struct Claim {
    claims: Arc<RecordClaims>,
    key: RecordKey,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims.held().remove(&self.key);
    }
}
