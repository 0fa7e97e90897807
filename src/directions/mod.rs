pub mod google;
pub mod placeholder;
pub mod types;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

use crate::locations::Location;
use types::{TravelTime, WaitTimeResult};

#[derive(Error, Debug)]
pub enum DirectionsError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("No route found")]
    NoRoute,
    #[error("Directions API key not configured")]
    NotConfigured,
}

/// Source of live travel times for a single crossing.
#[async_trait]
pub trait TravelTimeSource: Send + Sync {
    /// False when no credential is present; callers fall back to
    /// placeholder data instead of fetching.
    fn is_configured(&self) -> bool;

    async fn fetch_wait_time(&self, location: &Location) -> Result<TravelTime, DirectionsError>;
}

/// Look up every location concurrently. Failures are kept per location.
pub async fn fetch_all(
    source: &dyn TravelTimeSource,
    locations: &[Location],
) -> Vec<WaitTimeResult> {
    let lookups = locations.iter().map(|location| async move {
        match source.fetch_wait_time(location).await {
            Ok(travel) => WaitTimeResult::live(location.id, travel),
            Err(e) => {
                tracing::warn!("Wait time lookup failed for {}: {}", location.id, e);
                WaitTimeResult::failed(location.id, e.to_string())
            }
        }
    });

    join_all(lookups).await
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;
    use crate::locations::LOCATIONS;

    #[tokio::test]
    async fn test_fetch_all_keeps_failures_per_location() {
        let source = FakeSource::new()
            .failing("lincoln-nj-ny", "OVER_QUERY_LIMIT")
            .with_wait("holland-nj-ny", 12);

        let results = fetch_all(&source, &LOCATIONS).await;

        assert_eq!(results.len(), 6);
        assert_eq!(source.calls(), 6);
        let ids: Vec<_> = results.iter().map(|r| r.location_id.as_str()).collect();
        let expected: Vec<_> = LOCATIONS.iter().map(|l| l.id).collect();
        assert_eq!(ids, expected);

        let lincoln = &results[0];
        assert_eq!(lincoln.wait_time, None);
        assert_eq!(lincoln.error.as_deref(), Some("API error: OVER_QUERY_LIMIT"));

        let holland = results.iter().find(|r| r.location_id == "holland-nj-ny").unwrap();
        assert_eq!(holland.wait_time, Some(12));
        assert!(holland.error.is_none());
    }
}
