//! Application configuration loaded from environment variables.
//!
//! The Garmin access token is obtained out of band; this service only
//! presents it as a bearer token.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Remote platform ---
    /// Garmin Connect API base URL
    pub garmin_api_base_url: String,
    /// Bearer token for Garmin Connect
    pub garmin_access_token: String,
    /// Server port
    pub port: u16,

    // --- Training load ---
    pub acute_window_days: u32,
    pub chronic_window_days: u32,
    /// Ramp ratio above which overtraining risk is flagged
    pub ramp_ratio_threshold: f64,
    /// Used when the athlete profile has no measured value
    pub resting_heart_rate: Option<f64>,
    /// Used when the athlete profile has no measured value; takes precedence
    /// over the age estimate
    pub max_heart_rate: Option<f64>,

    // --- Gateway / sync tuning ---
    /// Per-request timeout for remote calls
    pub gateway_timeout: Duration,
    /// Attempts (including the first) for idempotent remote calls
    pub gateway_max_attempts: u32,
    /// First retry delay; doubles on every attempt
    pub gateway_initial_backoff: Duration,
    /// Remote writes in flight at once during one reconciliation
    pub sync_max_concurrency: usize,
    /// Page size when listing the remote workout inventory
    pub workout_page_size: u32,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            garmin_api_base_url: "http://localhost:9999".to_string(),
            garmin_access_token: "test_access_token".to_string(),
            port: 8080,
            acute_window_days: 7,
            chronic_window_days: 28,
            ramp_ratio_threshold: 1.5,
            resting_heart_rate: Some(60.0),
            max_heart_rate: Some(190.0),
            gateway_timeout: Duration::from_secs(2),
            gateway_max_attempts: 3,
            gateway_initial_backoff: Duration::from_millis(1),
            sync_max_concurrency: 8,
            workout_page_size: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            garmin_api_base_url: env::var("GARMIN_API_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://connectapi.garmin.com".to_string()),
            garmin_access_token: env::var("GARMIN_ACCESS_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GARMIN_ACCESS_TOKEN"))?,
            port: env_or("PORT", 8080),

            acute_window_days: env_or("ACUTE_WINDOW_DAYS", 7),
            chronic_window_days: env_or("CHRONIC_WINDOW_DAYS", 28),
            ramp_ratio_threshold: env_or("RAMP_RATIO_THRESHOLD", 1.5),
            resting_heart_rate: env_opt("RESTING_HEART_RATE"),
            max_heart_rate: env_opt("MAX_HEART_RATE"),

            gateway_timeout: Duration::from_secs(env_or("GATEWAY_TIMEOUT_SECS", 10)),
            gateway_max_attempts: env_or::<u32>("GATEWAY_MAX_ATTEMPTS", 3).max(1),
            gateway_initial_backoff: Duration::from_millis(env_or(
                "GATEWAY_INITIAL_BACKOFF_MS",
                500,
            )),
            sync_max_concurrency: env_or::<usize>("SYNC_MAX_CONCURRENCY", 8).max(1),
            workout_page_size: env_or::<u32>("WORKOUT_PAGE_SIZE", 100).max(1),
        })
    }
}

/// Read and parse an optional variable, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name).unwrap_or(default)
}

/// Read and parse an optional variable; unset or unparseable is `None`.
fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
