use chrono_tz::Tz;
use std::env;
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::utils::parse_timezone;

#[derive(Clone, Debug)]
pub struct Config {
    pub google_maps_api_key: Option<String>,
    pub google_maps_base_url: String,
    pub google_directions_path: String,
    pub database_url: String,
    pub bind_addr: String,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub admin_key: Option<String>,
    pub app_timezone: Tz,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_timezone = env::var("APP_TIMEZONE")
            .unwrap_or_else(|_| "America/New_York".to_string());

        Ok(Config {
            google_maps_api_key: non_empty_var("GOOGLE_MAPS_API_KEY"),
            google_maps_base_url: env::var("GOOGLE_MAPS_BASE_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
            google_directions_path: env::var("GOOGLE_DIRECTIONS_PATH")
                .unwrap_or_else(|_| "/maps/api/directions/json".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./wait_times.db?mode=rwc".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cache_ttl: secs_var("CACHE_TTL_SECS", DEFAULT_TTL.as_secs())?,
            refresh_interval: secs_var("REFRESH_INTERVAL_SECS", 15 * 60)?,
            request_timeout: secs_var("REQUEST_TIMEOUT_SECS", 15)?,
            admin_key: non_empty_var("ADMIN_KEY"),
            app_timezone: parse_timezone(&app_timezone).map_err(|e| anyhow::anyhow!(e))?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs_var(name: &str, default: u64) -> anyhow::Result<Duration> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("{} must be a whole number of seconds, got {:?}", name, raw)
                })?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            google_maps_api_key: Some("test-key".to_string()),
            google_maps_base_url: "http://127.0.0.1:9".to_string(),
            google_directions_path: "/maps/api/directions/json".to_string(),
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            cache_ttl: DEFAULT_TTL,
            refresh_interval: Duration::from_secs(900),
            request_timeout: Duration::from_secs(5),
            admin_key: Some("letmein".to_string()),
            app_timezone: chrono_tz::America::New_York,
        }
    }
}
