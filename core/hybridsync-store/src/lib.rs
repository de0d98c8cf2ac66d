//! SQLite storage layer for hybridsync.
//!
//! Provides the local source of truth for the application and the durable
//! queue of mutations waiting to be pushed to the remote store.
//!
//! # Architecture
//!
//! - One table per synchronized entity, keyed by integer ids
//! - `sync_queue` holds pending, synced and parked [`PendingChange`]s
//! - Each call opens a short-lived connection with a bounded busy timeout;
//!   a lock held past the timeout surfaces as [`StoreError::Busy`]
//!
//! [`PendingChange`]: hybridsync_types::PendingChange

pub mod config;
mod connection;
mod error;
mod local_store;
mod queue;
mod schema;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use local_store::LocalStore;
pub use queue::{ChangeQueue, QueueCounts};
