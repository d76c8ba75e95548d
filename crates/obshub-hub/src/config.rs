//! Hub configuration loading from file and environment variables.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Top-level hub configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Live ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// External id encoding.
    #[serde(default)]
    pub ids: IdsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Scope of every id this database hands out.
    #[serde(default = "default_database_num")]
    pub database_num: i32,
}

/// Ingestion pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestConfig {
    /// Minimum time between two durable commits.
    #[serde(default = "default_min_commit_period_ms")]
    pub min_commit_period_ms: u64,

    /// Unique ids of the producers to persist; a trailing `*` matches a
    /// prefix. Empty persists every producer.
    #[serde(default)]
    pub handled_systems: Vec<String>,

    #[serde(default)]
    pub auto_purge: AutoPurgeConfig,
}

/// Periodic trimming of old records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AutoPurgeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between purge runs.
    #[serde(default = "default_purge_interval_secs")]
    pub interval_secs: u64,

    /// Observations older than this before the latest one of their
    /// datastream are removed.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

/// External id configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdsConfig {
    /// TOML file holding the id encoder keys. Without it, keys are random
    /// per process and external ids change on restart.
    #[serde(default)]
    pub keys_path: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "obshub_ingest=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "obshub.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_database_num() -> i32 {
    1
}

fn default_min_commit_period_ms() -> u64 {
    1_000
}

fn default_purge_interval_secs() -> u64 {
    3_600
}

fn default_max_age_secs() -> u64 {
    7 * 24 * 3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            database_num: default_database_num(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_commit_period_ms: default_min_commit_period_ms(),
            handled_systems: Vec::new(),
            auto_purge: AutoPurgeConfig::default(),
        }
    }
}

impl Default for AutoPurgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_purge_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl IngestConfig {
    pub fn min_commit_period(&self) -> Duration {
        Duration::from_millis(self.min_commit_period_ms)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `OBSHUB_DB_PATH` overrides `database.path`
/// - `OBSHUB_DATABASE_NUM` overrides `database.database_num`
/// - `OBSHUB_MIN_COMMIT_PERIOD_MS` overrides `ingest.min_commit_period_ms`
/// - `OBSHUB_HANDLED_SYSTEMS` overrides `ingest.handled_systems` (comma separated)
/// - `OBSHUB_AUTO_PURGE` overrides `ingest.auto_purge.enabled` (set to "true" to enable)
/// - `OBSHUB_KEYS_PATH` overrides `ids.keys_path`
/// - `OBSHUB_LOG_LEVEL` overrides `logging.level`
/// - `OBSHUB_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn is_true(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Applies `OBSHUB_*` overrides read through `var`.
fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("OBSHUB_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(num) = var("OBSHUB_DATABASE_NUM") {
        if let Ok(parsed) = num.parse() {
            config.database.database_num = parsed;
        }
    }
    if let Some(period) = var("OBSHUB_MIN_COMMIT_PERIOD_MS") {
        if let Ok(parsed) = period.parse() {
            config.ingest.min_commit_period_ms = parsed;
        }
    }
    if let Some(systems) = var("OBSHUB_HANDLED_SYSTEMS") {
        config.ingest.handled_systems = systems
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(purge) = var("OBSHUB_AUTO_PURGE") {
        config.ingest.auto_purge.enabled = is_true(&purge);
    }
    if let Some(keys_path) = var("OBSHUB_KEYS_PATH") {
        config.ids.keys_path = Some(keys_path).filter(|p| !p.trim().is_empty());
    }
    if let Some(level) = var("OBSHUB_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("OBSHUB_LOG_JSON") {
        config.logging.json = is_true(&json);
    }
}
