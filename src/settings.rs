//! Env-var-driven configuration. Every knob has a documented default so the
//! service runs out of the box against a local Postgres; production
//! deployments override via environment.

use std::time::Duration;

use battlescope_core::ClusterParams;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,

    pub cluster_params: ClusterParams,
    /// How long a killmail must sit before the clusterer will consider it,
    /// giving slow feed arrivals a chance to land in the same batch.
    pub processing_delay: Duration,
    pub clusterer_batch_size: i64,
    pub clusterer_tick_interval: Duration,

    pub enrichment_batch_size: i64,
    pub enrichment_min_call_interval: Duration,
    pub enrichment_tick_interval: Duration,

    pub feed_url: String,
    pub feed_min_poll_interval: Duration,
    pub enrichment_source_url: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql:///battlescope".to_string()),
            max_connections: env_or("BATTLESCOPE_DB_MAX_CONNECTIONS", 10),

            cluster_params: ClusterParams {
                window_minutes: env_or("BATTLESCOPE_WINDOW_MINUTES", 30),
                gap_max_minutes: env_or("BATTLESCOPE_GAP_MAX_MINUTES", 15),
                min_kills: env_or("BATTLESCOPE_MIN_KILLS", 2usize),
            },
            processing_delay: Duration::from_secs(env_or("BATTLESCOPE_PROCESSING_DELAY_SECS", 300)),
            clusterer_batch_size: env_or("BATTLESCOPE_CLUSTERER_BATCH_SIZE", 200),
            clusterer_tick_interval: Duration::from_secs(env_or(
                "BATTLESCOPE_CLUSTERER_TICK_SECS",
                30,
            )),

            enrichment_batch_size: env_or("BATTLESCOPE_ENRICHMENT_BATCH_SIZE", 50),
            enrichment_min_call_interval: Duration::from_millis(env_or(
                "BATTLESCOPE_ENRICHMENT_MIN_INTERVAL_MS",
                250,
            )),
            enrichment_tick_interval: Duration::from_secs(env_or(
                "BATTLESCOPE_ENRICHMENT_TICK_SECS",
                5,
            )),

            feed_url: std::env::var("BATTLESCOPE_FEED_URL")
                .unwrap_or_else(|_| "https://feed.example.invalid/killmails/poll".to_string()),
            feed_min_poll_interval: Duration::from_millis(env_or(
                "BATTLESCOPE_FEED_MIN_POLL_MS",
                1000,
            )),
            enrichment_source_url: std::env::var("BATTLESCOPE_ENRICHMENT_SOURCE_URL")
                .unwrap_or_else(|_| "https://enrichment.example.invalid/killmails".to_string()),
        }
    }
}
