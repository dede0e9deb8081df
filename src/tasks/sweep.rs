//! Expired Entry Sweeper
//!
//! Background task that periodically drops expired cache entries so stale
//! versions do not pile up in long-lived backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{sweep_expired, Clock, Storage};

/// Spawns a task that sweeps every storage once per interval.
///
/// An interval of 0 is treated as 1 second. A failing backend is logged and
/// retried on the next tick.
///
/// # Example
/// ```ignore
/// let host = Host::headless();
/// let handle = spawn_sweep_task(host.storages(), host.clock(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(
    storages: Vec<Arc<dyn Storage>>,
    clock: Arc<dyn Clock>,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    let interval_secs = sweep_interval_secs.max(1);
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting expired entry sweeper for {} backend(s) every {} seconds",
            storages.len(),
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let now = clock.now_ms();
            let mut removed = 0;
            for storage in &storages {
                match sweep_expired(storage.as_ref(), now) {
                    Ok(count) => removed += count,
                    Err(err) => warn!("Sweep failed on {:?}: {}", storage, err),
                }
            }

            if removed > 0 {
                info!("Sweep: removed {} expired entries", removed);
            } else {
                debug!("Sweep: no expired entries found");
            }
        }
    })
}
