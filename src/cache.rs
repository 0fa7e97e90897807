//! Single shared cache of current wait times for all crossings.
//!
//! Reads inside the TTL are served from memory. Once stale, the first caller
//! starts a refresh and every caller that arrives before it finishes awaits
//! the same shared future, so one fetch batch serves all of them.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::database::ReadingStore;
use crate::directions::types::WaitTimeResult;
use crate::directions::{fetch_all, TravelTimeSource};
use crate::locations::LOCATIONS;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

pub type WaitTimes = Arc<Vec<WaitTimeResult>>;

type RefreshFuture = Shared<BoxFuture<'static, Result<WaitTimes, RefreshError>>>;

/// Cloned to every caller waiting on a failed refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Directions source is not configured")]
    NotConfigured,
    #[error("Failed to persist readings: {0}")]
    Store(String),
    #[error("Refresh task did not complete: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
    pub refreshing: bool,
}

#[derive(Default)]
struct CacheState {
    results: Option<WaitTimes>,
    refreshed_at: Option<Instant>,
    in_flight: Option<RefreshFuture>,
}

pub struct TrafficCache {
    source: Arc<dyn TravelTimeSource>,
    store: Arc<ReadingStore>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl TrafficCache {
    pub fn new(source: Arc<dyn TravelTimeSource>, store: Arc<ReadingStore>, ttl: Duration) -> Self {
        Self {
            source,
            store,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cached wait times if fresh, otherwise the result of the current (or
    /// a newly started) refresh.
    pub async fn get_current_data(self: &Arc<Self>) -> Result<WaitTimes, RefreshError> {
        let pending = {
            let mut state = self.lock_state();
            if let (Some(results), Some(at)) = (&state.results, state.refreshed_at) {
                if at.elapsed() < self.ttl {
                    return Ok(Arc::clone(results));
                }
            }
            self.join_or_start(&mut state)
        };

        pending.await
    }

    /// Refresh regardless of age. Joins the in-flight refresh if there is one.
    pub async fn refresh(self: &Arc<Self>) -> Result<WaitTimes, RefreshError> {
        let pending = {
            let mut state = self.lock_state();
            self.join_or_start(&mut state)
        };

        pending.await
    }

    /// Last successful results, however old.
    pub fn stale_data(&self) -> Option<WaitTimes> {
        self.lock_state().results.clone()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock_state();
        CacheStats {
            age_secs: state.refreshed_at.map(|at| at.elapsed().as_secs()),
            ttl_secs: self.ttl.as_secs(),
            refreshing: state.in_flight.is_some(),
        }
    }

    fn join_or_start(self: &Arc<Self>, state: &mut CacheState) -> RefreshFuture {
        if let Some(pending) = &state.in_flight {
            tracing::debug!("Joining in-flight refresh");
            return pending.clone();
        }

        // The batch runs on its own task so it completes even if every
        // waiting caller goes away.
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_refresh().await });
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(pending.clone());
        pending
    }

    async fn run_refresh(&self) -> Result<WaitTimes, RefreshError> {
        let _clear = ClearInFlight(self);
        tracing::info!("Refreshing wait times for {} locations", LOCATIONS.len());

        let results = Arc::new(self.fetch_and_persist().await?);

        let mut state = self.lock_state();
        state.results = Some(Arc::clone(&results));
        state.refreshed_at = Some(Instant::now());
        Ok(results)
    }

    async fn fetch_and_persist(&self) -> Result<Vec<WaitTimeResult>, RefreshError> {
        if !self.source.is_configured() {
            return Err(RefreshError::NotConfigured);
        }

        let results = fetch_all(self.source.as_ref(), &LOCATIONS).await;

        let readings: Vec<(&str, u32)> = results
            .iter()
            .filter_map(|r| r.wait_time.map(|wait_time| (r.location_id.as_str(), wait_time)))
            .collect();

        // One transaction, so a failed refresh leaves no partial batch behind.
        let persisted = self
            .store
            .append_batch(&readings)
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?;

        tracing::info!(
            "Refresh complete: {} of {} locations recorded",
            persisted,
            results.len()
        );
        Ok(results)
    }

    #[cfg(test)]
    fn refreshed_at(&self) -> Option<Instant> {
        self.lock_state().refreshed_at
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-flight marker when a refresh ends, including by panic.
struct ClearInFlight<'a>(&'a TrafficCache);

impl Drop for ClearInFlight<'_> {
    fn drop(&mut self) {
        self.0.lock_state().in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{memory_store, reject_inserts_for};
    use crate::directions::testing::FakeSource;
    use futures::future::join_all;

    async fn cache_with(
        source: Arc<FakeSource>,
        ttl: Duration,
    ) -> (Arc<TrafficCache>, Arc<ReadingStore>) {
        let store = Arc::new(memory_store().await);
        let cache = Arc::new(TrafficCache::new(source, Arc::clone(&store), ttl));
        (cache, store)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch_batch() {
        let source = Arc::new(FakeSource::new().with_delay(Duration::from_millis(100)));
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let results = join_all((0..10).map(|_| cache.get_current_data())).await;

        assert_eq!(source.calls(), LOCATIONS.len());
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert!(!cache.stats().refreshing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_from_separate_tasks() {
        let source = Arc::new(FakeSource::new().with_delay(Duration::from_millis(200)));
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_current_data().await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(source.calls(), LOCATIONS.len());
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[tokio::test]
    async fn test_fresh_cache_does_not_fetch() {
        let source = Arc::new(FakeSource::new());
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let first = cache.get_current_data().await.unwrap();

        // A fresh hit completes on first poll.
        let second = cache
            .get_current_data()
            .now_or_never()
            .expect("fresh read should not suspend")
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls(), LOCATIONS.len());
    }

    #[tokio::test]
    async fn test_stale_cache_refreshes_and_resets_age() {
        let source = Arc::new(FakeSource::new());
        let (cache, _store) = cache_with(Arc::clone(&source), Duration::from_millis(50)).await;

        let first = cache.get_current_data().await.unwrap();
        let first_at = cache.refreshed_at().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let second = cache.get_current_data().await.unwrap();

        assert_eq!(source.calls(), 2 * LOCATIONS.len());
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.refreshed_at().unwrap() > first_at);
        assert_eq!(cache.stats().age_secs, Some(0));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_data_and_clears_marker() {
        let source = Arc::new(FakeSource::new());
        let (cache, _store) = cache_with(Arc::clone(&source), Duration::from_millis(50)).await;

        let original = cache.get_current_data().await.unwrap();
        let original_at = cache.refreshed_at().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        source.set_configured(false);
        let err = cache.get_current_data().await.unwrap_err();
        assert_eq!(err, RefreshError::NotConfigured);

        assert!(!cache.stats().refreshing);
        assert_eq!(cache.refreshed_at(), Some(original_at));
        assert!(Arc::ptr_eq(&original, &cache.stale_data().unwrap()));

        source.set_configured(true);
        let retried = cache.get_current_data().await.unwrap();
        assert!(!Arc::ptr_eq(&original, &retried));
        assert!(cache.refreshed_at().unwrap() > original_at);
    }

    #[tokio::test]
    async fn test_failed_first_refresh_leaves_cache_empty() {
        let source = Arc::new(FakeSource::new());
        source.set_configured(false);
        let (cache, store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        assert!(cache.get_current_data().await.is_err());
        assert!(cache.stale_data().is_none());
        assert_eq!(cache.stats().age_secs, None);
        assert!(!cache.stats().refreshing);
        assert_eq!(store.count("gwb-nj-ny").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_waiters_all_receive_the_failure() {
        let source = Arc::new(FakeSource::new());
        source.set_configured(false);
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let results = join_all((0..5).map(|_| cache.get_current_data())).await;
        assert!(results
            .iter()
            .all(|r| r.as_ref().unwrap_err() == &RefreshError::NotConfigured));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_persists_only_successes() {
        let source = Arc::new(
            FakeSource::new()
                .failing("lincoln-nj-ny", "OVER_QUERY_LIMIT")
                .with_wait("holland-nj-ny", 12),
        );
        let (cache, store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let results = cache.get_current_data().await.unwrap();

        assert_eq!(results.len(), LOCATIONS.len());
        let lincoln = results.iter().find(|r| r.location_id == "lincoln-nj-ny").unwrap();
        assert_eq!(lincoln.wait_time, None);
        assert_eq!(lincoln.error.as_deref(), Some("API error: OVER_QUERY_LIMIT"));
        let holland = results.iter().find(|r| r.location_id == "holland-nj-ny").unwrap();
        assert_eq!(holland.wait_time, Some(12));

        assert_eq!(store.count("lincoln-nj-ny").await.unwrap(), 0);
        assert_eq!(store.count("holland-nj-ny").await.unwrap(), 1);
        assert_eq!(store.latest("holland-nj-ny").await.unwrap().unwrap().wait_time, 12);
    }

    #[tokio::test]
    async fn test_forced_refresh_ignores_ttl() {
        let source = Arc::new(FakeSource::new());
        let (cache, store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        cache.get_current_data().await.unwrap();
        cache.refresh().await.unwrap();

        assert_eq!(source.calls(), 2 * LOCATIONS.len());
        assert_eq!(store.count("gwb-ny-nj").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_joins_in_flight_refresh() {
        let source = Arc::new(FakeSource::new().with_delay(Duration::from_millis(100)));
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        let (read, forced) = tokio::join!(cache.get_current_data(), cache.refresh());

        assert!(Arc::ptr_eq(&read.unwrap(), &forced.unwrap()));
        assert_eq!(source.calls(), LOCATIONS.len());
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_stall_refresh() {
        let source = Arc::new(FakeSource::new().with_delay(Duration::from_millis(50)));
        let (cache, _store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;

        // Start a refresh and abandon it after the first poll.
        assert!(cache.get_current_data().now_or_never().is_none());
        assert!(cache.stats().refreshing);

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!cache.stats().refreshing);
        assert!(cache.stale_data().is_some());
        assert_eq!(source.calls(), LOCATIONS.len());
    }

    #[tokio::test]
    async fn test_store_failure_fails_refresh() {
        let source = Arc::new(FakeSource::new());
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // No tables, so every insert fails.
        let store = Arc::new(ReadingStore::new(pool, chrono_tz::America::New_York));
        let cache = Arc::new(TrafficCache::new(source, store, DEFAULT_TTL));

        let err = cache.get_current_data().await.unwrap_err();
        assert!(matches!(err, RefreshError::Store(_)));
        assert!(cache.stale_data().is_none());
        assert!(!cache.stats().refreshing);
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_no_partial_batch() {
        let source = Arc::new(FakeSource::new());
        let (cache, store) = cache_with(Arc::clone(&source), DEFAULT_TTL).await;
        // Last location in the batch, so earlier rows would already be written.
        reject_inserts_for(&store, "gwb-ny-nj").await;

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::Store(_)));
        for location in &LOCATIONS {
            assert_eq!(store.count(location.id).await.unwrap(), 0, "{}", location.id);
        }
        assert!(cache.stale_data().is_none());
    }
}
