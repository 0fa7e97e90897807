use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::TrafficCache;

/// Refresh the cache every `period`, starting immediately. Shares the
/// coordinator's in-flight marker with read-triggered refreshes.
pub fn spawn_refresh_loop(cache: Arc<TrafficCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Background refresh every {}s", period.as_secs());

        loop {
            ticker.tick().await;
            match cache.refresh().await {
                Ok(results) => {
                    let failed = results.iter().filter(|r| r.error.is_some()).count();
                    if failed > 0 {
                        tracing::warn!("Scheduled refresh: {} locations failed", failed);
                    } else {
                        tracing::debug!("Scheduled refresh succeeded");
                    }
                }
                Err(e) => tracing::error!("Scheduled refresh failed: {}", e),
            }
        }
    })
}
