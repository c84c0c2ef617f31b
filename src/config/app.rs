//! Application configuration structures.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::server::DEFAULT_MAX_BODY_BYTES;
use crate::storage::{DEFAULT_BUSY_TIMEOUT, DEFAULT_CHANNEL_CAPACITY, SyncMode, WritePolicy};

use super::validation::{ConfigError, parse_duration};

// =============================================================================
// Constants
// =============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5678;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "measurements.db";

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 5678).
    pub port: u16,

    /// Largest accepted ingest body in bytes (default: 16 MiB).
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: String,

    /// SQLite busy timeout (default: "5s").
    pub busy_timeout: String,

    /// SQLite synchronous mode (default: normal).
    pub synchronous: SyncMode,

    /// Writer command channel capacity (default: 1024).
    pub channel_capacity: usize,

    /// How measurement properties are written (default: atomic).
    pub write_policy: WritePolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            busy_timeout: humantime::format_duration(DEFAULT_BUSY_TIMEOUT).to_string(),
            synchronous: SyncMode::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            write_policy: WritePolicy::default(),
        }
    }
}

impl DatabaseConfig {
    /// Parsed busy timeout.
    pub fn busy_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.busy_timeout)
            .map_err(|e| ConfigError::ValidationError(format!("database busy_timeout: {}", e)))
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server max_body_bytes must be positive".to_string(),
            ));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database path must not be empty".to_string(),
            ));
        }

        if self.database.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        self.database.busy_timeout()?;

        Ok(())
    }

    /// Socket address the server listens on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
