use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // External providers
    pub places_api_key: String,
    pub search_api_key: String,

    // Enrichment worker tunables
    pub max_in_flight: usize,
    pub poll_interval_secs: u64,
    pub lease_secs: i64,
    pub dispatch_delay_ms: u64,
    pub verify_timeout_secs: u64,
    pub max_attempts: u32,

    // Discovery tunables
    pub query_delay_ms: u64,
    pub verify_delay_ms: u64,
    pub cache_ttl_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            places_api_key: required_env("PLACES_API_KEY"),
            search_api_key: required_env("SEARCH_API_KEY"),
            max_in_flight: parsed_env("ENRICHMENT_MAX_IN_FLIGHT", 5),
            poll_interval_secs: parsed_env("ENRICHMENT_POLL_INTERVAL_SECS", 1),
            lease_secs: parsed_env("ENRICHMENT_LEASE_SECS", 300),
            dispatch_delay_ms: parsed_env("ENRICHMENT_DISPATCH_DELAY_MS", 200),
            verify_timeout_secs: parsed_env("VERIFY_TIMEOUT_SECS", 30),
            max_attempts: parsed_env("ENRICHMENT_MAX_ATTEMPTS", 3),
            query_delay_ms: parsed_env("DISCOVERY_QUERY_DELAY_MS", 1000),
            verify_delay_ms: parsed_env("DISCOVERY_VERIFY_DELAY_MS", 500),
            cache_ttl_days: parsed_env("SEARCH_CACHE_TTL_DAYS", 30),
        }
    }

    /// Log the non-secret parts of the config at startup.
    pub fn log_redacted(&self) {
        info!(
            max_in_flight = self.max_in_flight,
            poll_interval_secs = self.poll_interval_secs,
            lease_secs = self.lease_secs,
            max_attempts = self.max_attempts,
            cache_ttl_days = self.cache_ttl_days,
            "Config loaded (api keys redacted)"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {raw}")),
        Err(_) => default,
    }
}
