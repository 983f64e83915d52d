//! Purge Task
//!
//! Background task that periodically drops cache entries which can no longer
//! be served, neither fresh nor stale.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::AppState;
use crate::cache::ReadThroughCache;

/// A cache whose unservable entries can be swept.
#[async_trait]
pub trait ExpiringCache: Send + Sync {
    /// Removes unservable entries and returns how many were dropped.
    async fn purge_expired(&self) -> usize;
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> ExpiringCache for ReadThroughCache<V> {
    async fn purge_expired(&self) -> usize {
        ReadThroughCache::purge_expired(self).await
    }
}

/// Every cache of the gateway, labelled for logs.
pub fn gateway_caches(state: &AppState) -> Vec<(&'static str, Box<dyn ExpiringCache>)> {
    vec![
        ("eas", Box::new(state.eas.cache().clone()) as Box<dyn ExpiringCache>),
        ("ens", Box::new(state.ens.cache().clone()) as Box<dyn ExpiringCache>),
        ("talent_profile", Box::new(state.talent.profile_cache().clone()) as Box<dyn ExpiringCache>),
        ("talent_score", Box::new(state.talent.score_cache().clone()) as Box<dyn ExpiringCache>),
    ]
}

/// Spawns a background task that periodically purges expired cache entries.
///
/// The task sleeps for the interval between sweeps and exits once `shutdown`
/// is cancelled.
///
/// # Arguments
/// * `caches` - Labelled caches to sweep
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
/// * `shutdown` - Stops the task
///
/// # Returns
/// A JoinHandle for the spawned task.
pub fn spawn_cleanup_task(
    caches: Vec<(&'static str, Box<dyn ExpiringCache>)>,
    cleanup_interval_secs: u64,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting cache purge task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    info!("Cache purge task stopped");
                    return;
                }
            }

            for (name, cache) in &caches {
                let name = *name;
                let removed = cache.purge_expired().await;
                if removed > 0 {
                    info!(cache = name, removed, "purged expired entries");
                } else {
                    debug!(cache = name, "no expired entries");
                }
            }
        }
    })
}
