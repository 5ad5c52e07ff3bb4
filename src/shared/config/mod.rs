//! Sync configuration module
//!
//! Provides configuration types for the offline sync layer. Configuration can
//! be assembled with [`SyncConfig::builder`], read from a TOML file, and
//! overridden from the environment:
//!
//! - `XFSYNC_ENDPOINT` - GraphQL endpoint URL
//! - `XFSYNC_DB_PATH` - path of the SQLite offline store
//! - `XFSYNC_OFFLINE` - `0` disables offline support

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/graphql";

/// Retries allowed for a transiently failing mutation before it is discarded
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Sync layer configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,
    /// Queue mutations locally instead of sending them straight to the network
    pub offline_enabled: bool,
    /// Retries before a transiently failing mutation is discarded
    pub max_retries: u32,
    /// SQLite database path; `None` selects the platform data directory
    pub database_path: Option<PathBuf>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// First retry delay in milliseconds
    pub backoff_base_ms: u64,
    /// Upper bound on the retry delay in milliseconds
    pub backoff_max_ms: u64,
    /// Capacity of the queue event channel
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            offline_enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            database_path: None,
            request_timeout_secs: 30,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Read configuration from a TOML file
    ///
    /// Missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `XFSYNC_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(endpoint) = std::env::var("XFSYNC_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(path) = std::env::var("XFSYNC_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(flag) = std::env::var("XFSYNC_OFFLINE") {
            self.offline_enabled = flag != "0";
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.endpoint.clone()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("request_timeout_secs must be positive"));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::InvalidValue("backoff_base_ms exceeds backoff_max_ms"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue("event_capacity must be positive"));
        }
        Ok(())
    }

    /// Database path, falling back to the platform data directory
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
            path.push("xfsync");
            path.push("offline.db");
            path
        })
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the endpoint URL
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    /// Enable or disable offline queuing
    pub fn offline_enabled(mut self, enabled: bool) -> Self {
        self.config.offline_enabled = enabled;
        self
    }

    /// Set the retry ceiling
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the SQLite database path
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    /// Set the request timeout
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the retry backoff bounds
    pub fn backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.config.backoff_base_ms = base;
        self.config.backoff_max_ms = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}
