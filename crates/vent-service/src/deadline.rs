//! Deadlines for storage calls.
//!
//! Callers block their call screen on quota checks and session start/end, so every
//! storage round-trip gets a short deadline. A missed deadline is a retryable
//! `Unavailable`, never a hang.

use std::future::Future;
use std::time::Duration;

use vent_core::VentError;
use vent_store::StoreError;

/// Run a storage call under `limit`, mapping errors into the domain taxonomy.
///
/// # Errors
///
/// Returns `VentError::Unavailable` on timeout, otherwise the mapped store error.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, VentError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    within(limit, call).await?.map_err(VentError::from)
}

/// Run a storage call under `limit`, keeping its store error for inspection.
///
/// Used where a constraint violation is an expected race to be resolved in place.
///
/// # Errors
///
/// Returns `VentError::Unavailable` on timeout.
pub async fn within<T, F>(limit: Duration, call: F) -> Result<Result<T, StoreError>, VentError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        VentError::Unavailable(format!("storage call exceeded {}ms", limit.as_millis()))
    })
}
