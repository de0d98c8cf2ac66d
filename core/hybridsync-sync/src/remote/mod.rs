//! Remote store clients.
//!
//! The sync engine talks to the authoritative remote store only through
//! [`RemoteClient`]. [`PostgrestClient`] speaks the PostgREST REST dialect;
//! [`MemoryRemote`] keeps everything in process for tests and demos.

mod memory;
mod postgrest;

pub use memory::MemoryRemote;
pub use postgrest::PostgrestClient;

use crate::error::SyncResult;
use async_trait::async_trait;
use hybridsync_types::{Fields, Record, RecordId, Table};

/// Abstract remote store interface.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Returns the name of the remote provider.
    fn provider_name(&self) -> &'static str;

    /// Fetches every row of `table`.
    async fn get_all(&self, table: Table) -> SyncResult<Vec<Record>>;

    /// Inserts a full row. `fields` carries the local `id`.
    async fn insert(&self, table: Table, fields: &Fields) -> SyncResult<()>;

    /// Updates the row with `id`.
    async fn update(&self, table: Table, id: RecordId, fields: &Fields) -> SyncResult<()>;

    /// Deletes the row with `id`. Deleting a missing row succeeds.
    async fn delete(&self, table: Table, id: RecordId) -> SyncResult<()>;

    /// Number of rows in `table`.
    async fn count(&self, table: Table) -> SyncResult<u64> {
        Ok(self.get_all(table).await?.len() as u64)
    }
}
