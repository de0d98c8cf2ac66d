//! Hybrid local/remote sync engine for hybridsync.
//!
//! The local SQLite store is the source of truth for the application; a
//! PostgREST-style remote store is the shared, authoritative copy. The
//! engine keeps them converging in the background.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **ChangeRecorder**: appends each local mutation to the durable queue
//! - **PushWorker**: replays the queue against the remote store
//! - **ImmediateSyncPool**: pushes fresh mutations right away, bounded
//! - **PullWorker**: reconciles local tables with the remote snapshot
//! - **ChangeDetector**: fingerprints the remote to gate pulls
//! - **SyncCoordinator**: owns the workers, the mode and the status
//!
//! ## Delivery
//!
//! Push is at-least-once. A duplicate-key rejection of an INSERT or UPDATE
//! is treated as "already applied", which makes replays idempotent. Pull is
//! last-writer-wins with the remote store winning.
//!
//! # Example
//!
//! ```no_run
//! use hybridsync_store::LocalStore;
//! use hybridsync_sync::{MemoryRemote, SyncConfig, SyncCoordinator};
//! use hybridsync_types::Employee;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::open("app.db")?;
//! let coordinator = SyncCoordinator::new(store, Arc::new(MemoryRemote::new()), SyncConfig::default());
//! coordinator.connect().await;
//! coordinator.start().await;
//!
//! let app = coordinator.synced_store();
//! app.create(&Employee::new("E100", "Layla"))?;
//!
//! coordinator.stop().await;
//! # Ok(())
//! # }
//! ```

mod blocking;
mod claims;
pub mod config;
mod coordinator;
pub mod detector;
mod error;
mod facade;
pub mod immediate;
pub mod pull;
pub mod push;
pub mod recorder;
pub mod remote;
pub mod status;

pub use config::{RemoteConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use detector::{ChangeDetector, ChangeInfo, Fingerprint};
pub use error::{FailureKind, SyncError, SyncResult};
pub use facade::SyncedStore;
pub use immediate::ImmediateSyncPool;
pub use pull::{PullReport, PullWorker, TablePullReport};
pub use push::{PushOutcome, PushReport, PushWorker, push_change};
pub use recorder::ChangeRecorder;
pub use remote::{MemoryRemote, PostgrestClient, RemoteClient};
pub use status::{HealthReport, QueueInfo, SyncMode, SyncStats, SyncStatus};
