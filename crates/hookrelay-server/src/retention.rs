//! Background task for enforcing the optional event retention cap.

use hookrelay_db::DbPool;
use std::time::Duration;
use tokio::time::sleep;

/// Starts a background task that periodically prunes the oldest
/// envelopes beyond `max_events`.
///
/// This task runs indefinitely. Without a configured cap the caller
/// should not spawn it at all; the store is append-only by default.
///
/// # Arguments
///
/// * `pool` - Database connection pool.
/// * `max_events` - Keep at most this many envelopes.
/// * `interval_seconds` - Time in seconds to wait between sweeps.
pub async fn start_retention_task(pool: DbPool, max_events: u64, interval_seconds: u64) {
    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(max_events, interval_seconds, "starting retention task");

    loop {
        // Sleep first so startup settles before the first sweep.
        sleep(interval).await;

        let pool_clone = pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool_clone.get().map_err(|e| e.to_string())?;
            hookrelay_store::prune_oldest(&conn, max_events).map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    tracing::info!(count, "pruned envelopes beyond retention cap");
                } else {
                    tracing::debug!("no envelopes beyond retention cap");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "retention sweep failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "retention task panicked or was cancelled");
            }
        }
    }
}
