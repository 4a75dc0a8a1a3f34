use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

/// Batch composition and cache tuning. Defaults match the documented
/// production values; every field can be overridden through the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Items per composed batch
    pub batch_size: usize,
    /// Fetch multiplier absorbing de-duplication losses
    pub buffer_factor: f64,
    /// Strategy ratios, applied to batch_size
    pub collaborative_ratio: f64,
    pub popular_ratio: f64,
    pub recent_ratio: f64,
    pub random_ratio: f64,
    /// Batch TTL in seconds (lazy expiry, checked on read)
    pub batch_ttl_secs: u64,
    /// Consumed-count threshold that schedules next-batch prefetch
    pub prefetch_threshold: usize,
    /// Recently-viewed window used for duplicate suppression
    pub history_window: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            batch_size: 250,
            buffer_factor: 1.2,
            collaborative_ratio: 0.4,
            popular_ratio: 0.3,
            recent_ratio: 0.1,
            random_ratio: 0.2,
            batch_ttl_secs: 30 * 60,
            prefetch_threshold: 125,
            history_window: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = FeedConfig::default();

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            feed: FeedConfig {
                batch_size: env_or("FEED_BATCH_SIZE", defaults.batch_size)?,
                buffer_factor: env_or("FEED_BUFFER_FACTOR", defaults.buffer_factor)?,
                collaborative_ratio: env_or(
                    "FEED_COLLABORATIVE_RATIO",
                    defaults.collaborative_ratio,
                )?,
                popular_ratio: env_or("FEED_POPULAR_RATIO", defaults.popular_ratio)?,
                recent_ratio: env_or("FEED_RECENT_RATIO", defaults.recent_ratio)?,
                random_ratio: env_or("FEED_RANDOM_RATIO", defaults.random_ratio)?,
                batch_ttl_secs: env_or("FEED_BATCH_TTL_SECS", defaults.batch_ttl_secs)?,
                prefetch_threshold: env_or(
                    "FEED_PREFETCH_THRESHOLD",
                    defaults.prefetch_threshold,
                )?,
                history_window: env_or("FEED_HISTORY_WINDOW", defaults.history_window)?,
            },
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + 'static,
{
    match std::env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
