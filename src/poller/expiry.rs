//! Background expiry of old ledger records.
//!
//! Runs as a background task removing records whose `processedAt` is
//! older than the configured TTL.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::SharedPoller;
use crate::{AppError, Result};

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the ledger expiry background task.
///
/// The task runs hourly, starting immediately.
#[must_use]
pub fn spawn_expiry_task(
    ledger: SharedPoller,
    ttl_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("ledger expiry task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&ledger, ttl_days) {
                        error!(%err, "ledger expiry failed");
                    }
                }
            }
        }
    })
}

/// Run one expiry pass.
///
/// # Errors
///
/// Returns `AppError::Ledger` if the ledger lock is poisoned or the
/// ledger cannot be persisted.
pub fn purge(ledger: &SharedPoller, ttl_days: u32) -> Result<usize> {
    let mut guard = ledger
        .lock()
        .map_err(|_| AppError::Ledger("ledger mutex poisoned".into()))?;
    guard.cleanup_expired(ttl_days)
}
