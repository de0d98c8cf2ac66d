//! Runs local store calls off the async runtime.

use crate::error::SyncResult;
use hybridsync_store::StoreResult;

/// Runs a synchronous store call on the blocking pool.
///
/// The call runs to completion even if the awaiting task is dropped, so a
/// local write is never cut short by shutdown.
pub(crate) async fn run<T, F>(f: F) -> SyncResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
