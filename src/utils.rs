use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::locations::is_known_location;

pub const MAX_WAIT_TIME_MINUTES: i64 = 300;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown location: {0}")]
    UnknownLocation(String),
    #[error("Invalid wait time: {0}. Must be an integer between 0 and 300")]
    WaitTimeOutOfRange(i64),
}

/// Validate a manually submitted reading before it reaches the store.
pub fn validate_reading(location_id: &str, wait_time: i64) -> Result<u32, ValidationError> {
    if !is_known_location(location_id) {
        return Err(ValidationError::UnknownLocation(location_id.to_string()));
    }
    validate_wait_time(wait_time)
}

pub fn validate_wait_time(wait_time: i64) -> Result<u32, ValidationError> {
    if !(0..=MAX_WAIT_TIME_MINUTES).contains(&wait_time) {
        return Err(ValidationError::WaitTimeOutOfRange(wait_time));
    }
    Ok(wait_time as u32)
}

pub fn parse_timezone(tz_str: &str) -> Result<Tz, String> {
    tz_str
        .parse::<Tz>()
        .map_err(|_| format!("Invalid timezone: {}", tz_str))
}

/// Current wall-clock time in the deployment timezone, without offset.
pub fn local_now(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

/// Seconds to whole minutes, rounded to nearest.
pub fn seconds_to_minutes(seconds: i64) -> u32 {
    (seconds.max(0) as f64 / 60.0).round() as u32
}

/// 12-hour clock label for an hour of the day: `12am`, `1am`, ..., `12pm`, `11pm`.
pub fn hour_label(hour: u32) -> String {
    let suffix = if hour < 12 { "am" } else { "pm" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}{}", display, suffix)
}
