//! Configuration management
//!
//! Configuration can be loaded from:
//! - a YAML file (`sessionward.yml` by default)
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session lifetime configuration
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/sessions.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session lifetime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Soft expiry given to new sessions, in seconds
    #[serde(default = "default_expiry_seconds")]
    pub expiry_seconds: u64,
    /// Hard ceiling given to new sessions, in seconds
    #[serde(default = "default_max_expiry_seconds")]
    pub max_expiry_seconds: u64,
    /// If set, sessions close to expiring are extended by this amount on access
    #[serde(default)]
    pub renewal_window_seconds: Option<u64>,
    /// How often the sweeper removes expired sessions, in seconds
    #[serde(default = "default_clean_interval_seconds")]
    pub clean_interval_seconds: u64,
    /// Name of the cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: default_expiry_seconds(),
            max_expiry_seconds: default_max_expiry_seconds(),
            renewal_window_seconds: None,
            clean_interval_seconds: default_clean_interval_seconds(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl SessionConfig {
    pub fn expiry(&self) -> Duration {
        seconds(self.expiry_seconds)
    }

    pub fn max_expiry(&self) -> Duration {
        seconds(self.max_expiry_seconds)
    }

    pub fn renewal_window(&self) -> Option<Duration> {
        self.renewal_window_seconds.map(seconds)
    }
}

fn default_expiry_seconds() -> u64 {
    60 * 60 // 1 hour
}

fn default_max_expiry_seconds() -> u64 {
    7 * 24 * 60 * 60 // 7 days
}

fn default_clean_interval_seconds() -> u64 {
    60 * 60
}

fn default_cookie_name() -> String {
    "id".to_string()
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Seconds between resets of every client's request count
    #[serde(default = "default_timespan_seconds")]
    pub timespan_seconds: u64,
    /// Requests allowed per timespan before a client is blocked
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Seconds a block lasts. Blocks are permanent until restart when unset.
    #[serde(default)]
    pub block_duration_seconds: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            timespan_seconds: default_timespan_seconds(),
            limit: default_limit(),
            block_duration_seconds: None,
        }
    }
}

impl RateLimitConfig {
    pub fn timespan(&self) -> Duration {
        seconds(self.timespan_seconds)
    }

    pub fn block_duration(&self) -> Option<Duration> {
        self.block_duration_seconds.map(seconds)
    }
}

fn default_timespan_seconds() -> u64 {
    300
}

fn default_limit() -> u64 {
    1000
}

/// Longest duration accepted from configuration (about a thousand years)
const MAX_CONFIGURED_SECONDS: i64 = 1000 * 365 * 24 * 60 * 60;

/// Converts a configured number of seconds, saturating instead of overflowing.
pub(crate) fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(MAX_CONFIGURED_SECONDS))
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SESSIONWARD_DATABASE_DRIVER
    /// - SESSIONWARD_DATABASE_URL
    /// - SESSIONWARD_SESSIONS_EXPIRY_SECONDS
    /// - SESSIONWARD_SESSIONS_MAX_EXPIRY_SECONDS
    /// - SESSIONWARD_SESSIONS_RENEWAL_WINDOW_SECONDS
    /// - SESSIONWARD_SESSIONS_CLEAN_INTERVAL_SECONDS
    /// - SESSIONWARD_SESSIONS_COOKIE_NAME
    /// - SESSIONWARD_RATE_LIMIT_TIMESPAN_SECONDS
    /// - SESSIONWARD_RATE_LIMIT_LIMIT
    /// - SESSIONWARD_RATE_LIMIT_BLOCK_DURATION_SECONDS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would break the session invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.expiry_seconds > self.sessions.max_expiry_seconds {
            return Err(ConfigError::ValidationError(format!(
                "sessions.expiry_seconds ({}) exceeds sessions.max_expiry_seconds ({})",
                self.sessions.expiry_seconds, self.sessions.max_expiry_seconds
            )));
        }
        if self.sessions.clean_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.clean_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.sessions.cookie_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sessions.cookie_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(driver) = std::env::var("SESSIONWARD_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SESSIONWARD_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(value) = env_u64("SESSIONWARD_SESSIONS_EXPIRY_SECONDS") {
            self.sessions.expiry_seconds = value;
        }
        if let Some(value) = env_u64("SESSIONWARD_SESSIONS_MAX_EXPIRY_SECONDS") {
            self.sessions.max_expiry_seconds = value;
        }
        if let Some(value) = env_u64("SESSIONWARD_SESSIONS_RENEWAL_WINDOW_SECONDS") {
            self.sessions.renewal_window_seconds = Some(value);
        }
        if let Some(value) = env_u64("SESSIONWARD_SESSIONS_CLEAN_INTERVAL_SECONDS") {
            self.sessions.clean_interval_seconds = value;
        }
        if let Ok(name) = std::env::var("SESSIONWARD_SESSIONS_COOKIE_NAME") {
            self.sessions.cookie_name = name;
        }

        if let Some(value) = env_u64("SESSIONWARD_RATE_LIMIT_TIMESPAN_SECONDS") {
            self.rate_limit.timespan_seconds = value;
        }
        if let Some(value) = env_u64("SESSIONWARD_RATE_LIMIT_LIMIT") {
            self.rate_limit.limit = value;
        }
        if let Some(value) = env_u64("SESSIONWARD_RATE_LIMIT_BLOCK_DURATION_SECONDS") {
            self.rate_limit.block_duration_seconds = Some(value);
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
