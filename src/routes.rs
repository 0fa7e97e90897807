use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    cache::{TrafficCache, WaitTimes},
    config::Config,
    database::{Reading, ReadingStore},
    directions::{placeholder::placeholder_wait_times, types::WaitTimeResult, TravelTimeSource},
    heatmap::{build_heatmap, HeatmapCell},
    locations::{find_location, Location, LOCATIONS},
    utils::{local_now, validate_reading},
};

const ADMIN_KEY_HEADER: &str = "x-admin-key";

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ReadingStore>,
    pub cache: Arc<TrafficCache>,
    pub source: Arc<dyn TravelTimeSource>,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ManualReadingRequest {
    pub location_id: String,
    pub wait_time: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct LocationInfo {
    #[serde(flatten)]
    pub location: &'static Location,
    pub direction_label: &'static str,
}

impl From<&'static Location> for LocationInfo {
    fn from(location: &'static Location) -> Self {
        Self {
            location,
            direction_label: location.direction.label(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CrossingWaitTime {
    #[serde(flatten)]
    pub location: LocationInfo,
    #[serde(flatten)]
    pub result: WaitTimeResult,
}

#[derive(Debug, Serialize)]
pub struct WaitTimesResponse {
    pub crossings: Vec<CrossingWaitTime>,
    pub placeholder: bool,
    pub stale: bool,
    pub cache_age_secs: Option<u64>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct HeatmapResponse {
    pub location: LocationInfo,
    pub cells: Vec<HeatmapCell>,
    pub total_readings: i64,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub location: LocationInfo,
    pub latest: Option<Reading>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub location: LocationInfo,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub configured: bool,
    pub cache_age_secs: Option<u64>,
    pub cache_ttl_secs: u64,
    pub refreshing: bool,
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    if let Err(e) = state.store.health_check().await {
        tracing::error!("Health check failed: {}", e);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

pub async fn list_locations() -> Json<Vec<LocationInfo>> {
    Json(LOCATIONS.iter().map(LocationInfo::from).collect())
}

pub async fn get_wait_times(
    State(state): State<AppState>,
) -> Result<Json<WaitTimesResponse>, StatusCode> {
    if !state.source.is_configured() {
        return Ok(Json(WaitTimesResponse {
            crossings: with_locations(placeholder_wait_times(&LOCATIONS)),
            placeholder: true,
            stale: false,
            cache_age_secs: None,
            generated_at: chrono::Utc::now(),
        }));
    }

    let (results, stale) = match state.cache.get_current_data().await {
        Ok(results) => (results, false),
        Err(e) => match state.cache.stale_data() {
            Some(results) => {
                tracing::warn!("Refresh failed, serving stale wait times: {}", e);
                (results, true)
            }
            None => {
                tracing::error!("Refresh failed with nothing cached: {}", e);
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
        },
    };

    Ok(Json(WaitTimesResponse {
        crossings: with_locations(unshare(results)),
        placeholder: false,
        stale,
        cache_age_secs: state.cache.stats().age_secs,
        generated_at: chrono::Utc::now(),
    }))
}

pub async fn get_heatmap(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
) -> Result<Json<HeatmapResponse>, StatusCode> {
    let location = find_location(&location_id).ok_or(StatusCode::NOT_FOUND)?;

    let aggregates = state
        .store
        .aggregate_by_day_hour(location.id)
        .await
        .map_err(|e| {
            tracing::error!("Heatmap query failed for {}: {}", location.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let cells = build_heatmap(&aggregates);
    let total_readings = cells.iter().map(|c| c.count).sum();

    Ok(Json(HeatmapResponse {
        location: location.into(),
        cells,
        total_readings,
        generated_at: chrono::Utc::now(),
    }))
}

pub async fn get_latest(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
) -> Result<Json<LatestResponse>, StatusCode> {
    let location = find_location(&location_id).ok_or(StatusCode::NOT_FOUND)?;

    let lookup = async {
        let latest = state.store.latest(location.id).await?;
        let count = state.store.count(location.id).await?;
        Ok::<_, crate::database::DatabaseError>((latest, count))
    };

    match lookup.await {
        Ok((latest, count)) => Ok(Json(LatestResponse {
            location: location.into(),
            latest,
            count,
        })),
        Err(e) => {
            tracing::error!("Latest reading query failed for {}: {}", location.id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let location = find_location(&location_id).ok_or(StatusCode::NOT_FOUND)?;
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 30);
    let since = local_now(state.config.app_timezone) - chrono::Duration::hours(hours);

    match state.store.history(location.id, since, params.limit).await {
        Ok(readings) => Ok(Json(HistoryResponse {
            location: location.into(),
            readings,
        })),
        Err(e) => {
            tracing::error!("History query failed for {}: {}", location.id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn submit_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ManualReadingRequest>,
) -> Result<Json<ReadingResponse>, StatusCode> {
    let Some(admin_key) = state.config.admin_key.as_deref() else {
        return Err(StatusCode::FORBIDDEN);
    };
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(admin_key) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let wait_time = validate_reading(&request.location_id, request.wait_time).map_err(|e| {
        tracing::warn!("Rejected manual reading: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    match state.store.append(&request.location_id, wait_time).await {
        Ok(id) => {
            tracing::info!(
                "Manual reading recorded for {}: {} min",
                request.location_id,
                wait_time
            );
            Ok(Json(ReadingResponse {
                id,
                message: "Reading recorded".to_string(),
            }))
        }
        Err(e) => {
            tracing::error!("Failed to save manual reading: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.cache.stats();
    Json(StatusResponse {
        configured: state.source.is_configured(),
        cache_age_secs: stats.age_secs,
        cache_ttl_secs: stats.ttl_secs,
        refreshing: stats.refreshing,
    })
}

fn unshare(results: WaitTimes) -> Vec<WaitTimeResult> {
    Arc::try_unwrap(results).unwrap_or_else(|shared| shared.as_ref().clone())
}

/// Pair each result with its location metadata. Results for unknown ids
/// are dropped.
fn with_locations(results: Vec<WaitTimeResult>) -> Vec<CrossingWaitTime> {
    results
        .into_iter()
        .filter_map(|result| {
            find_location(&result.location_id).map(|location| CrossingWaitTime {
                location: location.into(),
                result,
            })
        })
        .collect()
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/locations", get(list_locations))
        .route("/api/locations/:location_id/latest", get(get_latest))
        .route("/api/locations/:location_id/history", get(get_history))
        .route("/api/wait-times", get(get_wait_times))
        .route("/api/heatmap/:location_id", get(get_heatmap))
        .route("/api/readings", post(submit_reading))
        .route("/api/status", get(get_status))
        .with_state(state)
}
