use super::types::{DirectionsResponse, TravelTime};
use super::{DirectionsError, TravelTimeSource};
use crate::config::Config;
use crate::locations::Location;
use crate::utils::seconds_to_minutes;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

pub struct GoogleDirectionsClient {
    client: Client,
    api_key: Option<String>,
    url: String,
}

impl GoogleDirectionsClient {
    pub fn new(config: &Config) -> Result<Self, DirectionsError> {
        let client = Client::builder()
            .user_agent("HudsonWaitTimes/1.0")
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.google_maps_api_key.clone(),
            url: format!(
                "{}{}",
                config.google_maps_base_url, config.google_directions_path
            ),
        })
    }
}

#[async_trait]
impl TravelTimeSource for GoogleDirectionsClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_wait_time(&self, location: &Location) -> Result<TravelTime, DirectionsError> {
        let api_key = self.api_key.as_deref().ok_or(DirectionsError::NotConfigured)?;

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("origin", location.origin),
                ("destination", location.destination),
                ("departure_time", "now"),
                ("traffic_model", "best_guess"),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(|e| e.without_url())?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectionsError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| e.without_url())?;
        let directions: DirectionsResponse = serde_json::from_str(&body)?;
        travel_time_from_response(directions)
    }
}

/// Prefer the traffic-aware duration; fall back to the free-flow one.
pub fn travel_time_from_response(
    response: DirectionsResponse,
) -> Result<TravelTime, DirectionsError> {
    if response.status != "OK" {
        if let Some(message) = &response.error_message {
            tracing::debug!("Directions API {}: {}", response.status, message);
        }
        return Err(DirectionsError::ApiError(response.status));
    }

    let leg = response
        .routes
        .into_iter()
        .next()
        .and_then(|route| route.legs.into_iter().next())
        .ok_or(DirectionsError::NoRoute)?;

    let duration = leg.duration_in_traffic.unwrap_or(leg.duration);

    Ok(TravelTime {
        wait_time: seconds_to_minutes(duration.value),
        distance: leg.distance.text,
        duration: duration.text,
        timestamp: Utc::now(),
    })
}
