use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Placeholder,
}

/// A successful lookup for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelTime {
    pub wait_time: u32,
    pub distance: String,
    pub duration: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-location outcome of a refresh. A failed lookup keeps its slot with
/// `wait_time: None` and the failure message in `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitTimeResult {
    pub location_id: String,
    pub wait_time: Option<u32>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
}

impl WaitTimeResult {
    pub fn live(location_id: &str, travel: TravelTime) -> Self {
        Self {
            location_id: location_id.to_string(),
            wait_time: Some(travel.wait_time),
            distance: Some(travel.distance),
            duration: Some(travel.duration),
            error: None,
            timestamp: travel.timestamp,
            source: DataSource::Live,
        }
    }

    pub fn failed(location_id: &str, error: String) -> Self {
        Self {
            location_id: location_id.to_string(),
            wait_time: None,
            distance: None,
            duration: None,
            error: Some(error),
            timestamp: Utc::now(),
            source: DataSource::Live,
        }
    }
}

// Google Directions API response, trimmed to the fields we read.

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsRoute {
    #[serde(default)]
    pub legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsLeg {
    pub distance: TextValue,
    pub duration: TextValue,
    #[serde(default)]
    pub duration_in_traffic: Option<TextValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub text: String,
    pub value: i64,
}
