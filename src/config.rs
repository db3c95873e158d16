use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::models::GeoPoint;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub sweeper: SweeperSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    /// Without a URL the in-process store is used (development only)
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Shared tier; the cache runs in-process only when unset
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_cache_ttl_secs(),
            l1_cache_size: default_l1_cache_size(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 { 300 }
fn default_l1_cache_size() -> u64 { 10_000 }

/// Deployment mode; synthetic fallbacks only exist outside production
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    pub fn allows_fallback(&self) -> bool {
        matches!(self, RuntimeMode::Development)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default)]
    pub environment: RuntimeMode,
    #[serde(default = "default_radius_meters")]
    pub default_radius_meters: f64,
    /// Size of the unfiltered scan used when the radius search finds nothing
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_synthetic_candidates")]
    pub synthetic_candidates: usize,
    /// `[lat, lng]` used for synthetic entities
    #[serde(default = "default_location")]
    pub default_location: [f64; 2],
    #[serde(default = "default_match_ttl_hours")]
    pub match_ttl_hours: i64,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            environment: RuntimeMode::default(),
            default_radius_meters: default_radius_meters(),
            candidate_limit: default_candidate_limit(),
            synthetic_candidates: default_synthetic_candidates(),
            default_location: default_location(),
            match_ttl_hours: default_match_ttl_hours(),
            processing_timeout_secs: default_processing_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl MatchingSettings {
    pub fn default_point(&self) -> GeoPoint {
        GeoPoint::new(self.default_location[0], self.default_location[1])
    }

    pub fn match_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.match_ttl_hours)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

fn default_radius_meters() -> f64 { 5_000.0 }
fn default_candidate_limit() -> usize { 50 }
fn default_synthetic_candidates() -> usize { 5 }
fn default_location() -> [f64; 2] { [37.5665, 126.9780] }
fn default_match_ttl_hours() -> i64 { 24 }
fn default_processing_timeout_secs() -> u64 { 30 }
fn default_max_concurrent_jobs() -> usize { 16 }

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_sweeper_schedule")]
    pub schedule: String,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            schedule: default_sweeper_schedule(),
        }
    }
}

fn default_sweeper_enabled() -> bool { true }
fn default_sweeper_schedule() -> String { "0 0 * * * *".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with MATCHING_)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Local overrides for development
            .add_source(File::with_name("config/local").required(false))
            // e.g., MATCHING__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("MATCHING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_url_overrides(settings)?.try_deserialize()
    }
}

/// Conventional connection variables win over file values
fn apply_url_overrides(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("cache.redis_url", redis_url)?;
    }

    builder.build()
}
