//! Configuration management for BusTrack
//!
//! Defaults, TOML files and `BUSTRACK_<SECTION>_<KEY>` environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location channel store
    pub store: StoreConfig,

    /// Fix delivery requested by publishers
    pub publisher: PublisherConfig,

    /// Subscriber behaviour
    pub tracker: TrackerConfig,

    /// Session guard storage
    pub session: SessionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Positions buffered per listener before the oldest are skipped
    pub listener_buffer: usize,
}

/// Publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Minimum time between delivered fixes
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,

    /// Minimum movement between delivered fixes
    pub min_distance_meters: f64,

    /// Keep sharing while the app is in the background
    pub allow_background: bool,
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How long `track` waits for a first position before reporting no data
    #[serde(with = "humantime_serde")]
    pub first_fix_timeout: Duration,

    /// Keep at most this many path points (unbounded when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_path_len: Option<usize>,
}

/// Session guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// File holding the active share session
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            listener_buffer: 256,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            min_distance_meters: 10.0,
            allow_background: true,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            first_fix_timeout: Duration::from_secs(5),
            max_path_len: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/session.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_env<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env {
                var: var.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from defaults plus environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BUSTRACK_*` overrides on top of the current values
    ///
    /// Durations are given in milliseconds, e.g.
    /// `BUSTRACK_PUBLISHER_MIN_INTERVAL_MS=2000`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = parse_env("BUSTRACK_STORE_LISTENER_BUFFER")? {
            self.store.listener_buffer = v;
        }

        if let Some(ms) = parse_env::<u64>("BUSTRACK_PUBLISHER_MIN_INTERVAL_MS")? {
            self.publisher.min_interval = Duration::from_millis(ms);
        }
        if let Some(v) = parse_env("BUSTRACK_PUBLISHER_MIN_DISTANCE_METERS")? {
            self.publisher.min_distance_meters = v;
        }
        if let Some(v) = parse_env("BUSTRACK_PUBLISHER_ALLOW_BACKGROUND")? {
            self.publisher.allow_background = v;
        }

        if let Some(ms) = parse_env::<u64>("BUSTRACK_TRACKER_FIRST_FIX_TIMEOUT_MS")? {
            self.tracker.first_fix_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = parse_env("BUSTRACK_TRACKER_MAX_PATH_LEN")? {
            self.tracker.max_path_len = Some(v);
        }

        if let Ok(path) = env::var("BUSTRACK_SESSION_PATH") {
            self.session.path = PathBuf::from(path);
        }

        if let Ok(level) = env::var("BUSTRACK_LOGGING_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = parse_env("BUSTRACK_LOGGING_JSON_FORMAT")? {
            self.logging.json_format = v;
        }
        if let Some(v) = parse_env("BUSTRACK_LOGGING_WITH_TIMESTAMP")? {
            self.logging.with_timestamp = v;
        }
        if let Some(v) = parse_env("BUSTRACK_LOGGING_WITH_TARGET")? {
            self.logging.with_target = v;
        }

        Ok(())
    }

    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.listener_buffer == 0 {
            return Err(ConfigError::Invalid(
                "store.listener_buffer must be greater than 0".to_string(),
            ));
        }

        if !self.publisher.min_distance_meters.is_finite()
            || self.publisher.min_distance_meters < 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "publisher.min_distance_meters must be a non-negative number, got {}",
                self.publisher.min_distance_meters
            )));
        }

        if self.tracker.max_path_len == Some(0) {
            return Err(ConfigError::Invalid(
                "tracker.max_path_len must be greater than 0 when set".to_string(),
            ));
        }

        if self.session.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "session.path must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
