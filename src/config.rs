//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (bind address, port, body limit)
//! - Database settings (path, busy timeout, synchronous mode, channel capacity, write policy)

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_DB_PATH, DEFAULT_PORT, DatabaseConfig, ServerConfig};
pub use validation::{ConfigError, parse_duration};
