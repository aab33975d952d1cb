use std::env;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Runtime configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between scheduler ticks.
    pub tick_interval: Duration,
    /// Upper bound on any single remote API call.
    pub request_timeout: Duration,
    /// Connection whose credentials are used for every remote call.
    pub connection_name: String,
    /// REST API version segment, e.g. `54.0`.
    pub api_version: String,
    /// How long a closed interactive run stays available for replay.
    pub run_retention: Duration,
    pub scheduler_enabled: bool,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            tick_interval: env_duration_secs("SYNC_TICK_INTERVAL_SECS", 30),
            request_timeout: env_duration_millis("SYNC_REQUEST_TIMEOUT_MS", 30_000),
            connection_name: env_string("SYNC_CONNECTION_NAME", "default"),
            api_version: env_string("SFDC_API_VERSION", "54.0"),
            run_retention: env_duration_secs("SYNC_RUN_RETENTION_SECS", 600),
            scheduler_enabled: env_bool("SYNC_SCHEDULER_ENABLED", true),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
