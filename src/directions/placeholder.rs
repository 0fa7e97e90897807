use super::types::{DataSource, WaitTimeResult};
use crate::locations::Location;
use chrono::Utc;

pub const PLACEHOLDER_MIN_MINUTES: u32 = 10;
pub const PLACEHOLDER_MAX_MINUTES: u32 = 40;

/// Synthesized wait times for when no directions credential is configured.
/// Never persisted.
pub fn placeholder_wait_times(locations: &[Location]) -> Vec<WaitTimeResult> {
    let now = Utc::now();

    locations
        .iter()
        .map(|location| {
            let wait_time = fastrand::u32(PLACEHOLDER_MIN_MINUTES..=PLACEHOLDER_MAX_MINUTES);
            WaitTimeResult {
                location_id: location.id.to_string(),
                wait_time: Some(wait_time),
                distance: None,
                duration: Some(format!("{} mins", wait_time)),
                error: None,
                timestamp: now,
                source: DataSource::Placeholder,
            }
        })
        .collect()
}
