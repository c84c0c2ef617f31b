//! Checks applied to `ingestd.yaml` after it is loaded.

use std::time::Duration;

use thiserror::Error;

/// Why a configuration could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be opened or read.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid YAML for [`AppConfig`](super::AppConfig).
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A value was read but is out of range, e.g. port 0 or an unknown duration.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Turn a `database.busy_timeout` value into the wait SQLite gets for a lock.
///
/// Surrounding whitespace is ignored. An empty value is an error, not a zero
/// timeout.
///
/// ```
/// use std::time::Duration;
/// use ingestd::config::parse_duration;
///
/// // `_busy_timeout=5000` in a SQLite DSN
/// assert_eq!(parse_duration("5s"), Ok(Duration::from_millis(5000)));
/// assert_eq!(parse_duration(" 1500ms "), Ok(Duration::from_millis(1500)));
/// assert!(parse_duration("").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration(" 750ms ").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("5000").is_err());
    }
}
