//! Records local mutations into the durable change queue.
//!
//! Recording runs inline with application writes, so it uses the short
//! recorder busy timeout and never returns an error. When the queue cannot
//! be written the change is held in memory and retried at the start of the
//! next push cycle.

use hybridsync_store::ChangeQueue;
use hybridsync_types::{ChangeId, Fields, NewChange, Operation, RecordId, Table};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Appends mutations to the queue, with an in-memory fallback.
pub struct ChangeRecorder {
    queue: ChangeQueue,
    fallback: Mutex<VecDeque<NewChange>>,
}

impl ChangeRecorder {
    /// Creates a recorder writing through `queue`, normally the store's
    /// recorder queue.
    pub fn new(queue: ChangeQueue) -> Self {
        Self {
            queue,
            fallback: Mutex::new(VecDeque::new()),
        }
    }

    fn fallback(&self) -> MutexGuard<'_, VecDeque<NewChange>> {
        self.fallback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one mutation. Returns the queue id, or `None` when the
    /// change went to the in-memory fallback.
    pub fn record(&self, table: Table, operation: Operation, record_id: RecordId, payload: Fields) -> Option<ChangeId> {
        self.record_change(NewChange::new(table, operation, record_id, payload))
    }

    pub fn record_change(&self, change: NewChange) -> Option<ChangeId> {
        {
            // Nothing may overtake entries still waiting in memory.
            let mut held = self.fallback();
            if !held.is_empty() {
                held.push_back(change);
                return None;
            }
        }
        match self.queue.enqueue(&change) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    "Queueing {} {} #{} failed, holding in memory: {}",
                    change.operation, change.table, change.record_id, e
                );
                self.fallback().push_back(change);
                None
            }
        }
    }

    /// Moves held changes into the durable queue, oldest first. Stops at
    /// the first failure. Returns how many were written.
    pub fn flush_fallback(&self) -> usize {
        let mut flushed = 0;
        loop {
            let Some(change) = self.fallback().pop_front() else {
                break;
            };
            match self.queue.enqueue(&change) {
                Ok(_) => flushed += 1,
                Err(e) => {
                    debug!("Fallback flush stopped: {}", e);
                    self.fallback().push_front(change);
                    break;
                }
            }
        }
        if flushed > 0 {
            debug!("Flushed {} held changes into the queue", flushed);
        }
        flushed
    }

    /// Record ids of held changes matching `table` and `operation`.
    pub fn held_record_ids(&self, table: Table, operation: Operation) -> HashSet<RecordId> {
        self.fallback()
            .iter()
            .filter(|c| c.table == table && c.operation == operation)
            .map(|c| c.record_id)
            .collect()
    }

    /// Changes waiting in memory.
    pub fn fallback_len(&self) -> usize {
        self.fallback().len()
    }
}
