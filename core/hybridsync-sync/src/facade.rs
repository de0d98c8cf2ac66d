//! Typed CRUD for the application.
//!
//! Every successful mutation is committed locally first, then recorded in
//! the change queue and handed to the immediate pool. Calls never wait on
//! the network. Only [`StoreError::Validation`] is meant to be handled by
//! callers; other errors are genuine local faults.

use crate::immediate::ImmediateSyncPool;
use crate::recorder::ChangeRecorder;
use crate::status::SharedStatus;
use hybridsync_store::{LocalStore, StoreError, StoreResult};
use hybridsync_types::{Entity, Fields, NewChange, Operation, Record, RecordId, Setting, Table};
use serde_json::Value;
use std::sync::Arc;

/// Local store wrapper that records every mutation for sync.
#[derive(Clone)]
pub struct SyncedStore {
    store: LocalStore,
    recorder: Arc<ChangeRecorder>,
    immediate: Arc<ImmediateSyncPool>,
    status: Arc<SharedStatus>,
}

impl SyncedStore {
    pub(crate) fn new(
        store: LocalStore,
        recorder: Arc<ChangeRecorder>,
        immediate: Arc<ImmediateSyncPool>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self {
            store,
            recorder,
            immediate,
            status,
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.store
    }

    /// Inserts `entity` and returns its new id.
    pub fn create<E: Entity>(&self, entity: &E) -> StoreResult<RecordId> {
        let fields = entity.to_fields()?;
        let id = self.store.create(E::TABLE, &fields)?;
        self.record(E::TABLE, Operation::Insert, id, with_id(fields, id));
        Ok(id)
    }

    /// Updates the row identified by `entity.id()`. Returns `false` when
    /// the row does not exist.
    pub fn update<E: Entity>(&self, entity: &E) -> StoreResult<bool> {
        let id = entity
            .id()
            .ok_or_else(|| StoreError::InvalidData(format!("cannot update {} row without id", E::TABLE)))?;
        let fields = entity.to_fields()?;
        let changed = self.store.update(E::TABLE, id, &fields)?;
        if changed {
            self.record(E::TABLE, Operation::Update, id, with_id(fields, id));
        }
        Ok(changed)
    }

    pub fn delete<E: Entity>(&self, id: RecordId) -> StoreResult<bool> {
        let deleted = self.store.delete(E::TABLE, id)?;
        if deleted {
            self.record(E::TABLE, Operation::Delete, id, Fields::new());
        }
        Ok(deleted)
    }

    pub fn get_all<E: Entity>(&self) -> StoreResult<Vec<E>> {
        to_entities(self.store.get_all(E::TABLE)?)
    }

    pub fn get_by_id<E: Entity>(&self, id: RecordId) -> StoreResult<Option<E>> {
        self.store
            .get_by_id(E::TABLE, id)?
            .map(|record| E::from_record(record).map_err(StoreError::from))
            .transpose()
    }

    pub fn search<E: Entity>(&self, term: &str) -> StoreResult<Vec<E>> {
        to_entities(self.store.search(E::TABLE, term)?)
    }

    // ── Settings ─────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        self.store.get_setting(key)
    }

    /// Stores a setting and syncs it like any other row.
    pub fn set_setting(&self, key: &str, value: &str) -> StoreResult<RecordId> {
        let (id, inserted) = self.store.set_setting(key, value)?;
        let mut setting = Setting::new(key, value);
        setting.id = Some(id);
        let operation = if inserted {
            Operation::Insert
        } else {
            Operation::Update
        };
        self.record(Table::Settings, operation, id, with_id(setting.to_fields()?, id));
        Ok(id)
    }

    fn record(&self, table: Table, operation: Operation, record_id: RecordId, payload: Fields) {
        let change = NewChange::new(table, operation, record_id, payload);
        // Changes held in the fallback wait for the push worker.
        let Some(id) = self.recorder.record_change(change.clone()) else {
            return;
        };
        if self.status.is_connected() && !self.status.is_paused() {
            self.immediate.try_sync(id, change);
        }
    }
}

fn with_id(mut fields: Fields, id: RecordId) -> Fields {
    fields.insert("id".to_string(), Value::from(id.get()));
    fields
}

fn to_entities<E: Entity>(records: Vec<Record>) -> StoreResult<Vec<E>> {
    records
        .into_iter()
        .map(|record| E::from_record(record).map_err(StoreError::from))
        .collect()
}
