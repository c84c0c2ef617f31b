//! SQLite backend implementation using sqlx.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, SqliteConnection};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::StorageError;

/// Default busy timeout, matching `_busy_timeout=5000` of older deployments.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite `synchronous` pragma setting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SyncMode {
    Off,
    #[default]
    Normal,
    Full,
    Extra,
}

impl From<SyncMode> for SqliteSynchronous {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Off => SqliteSynchronous::Off,
            SyncMode::Normal => SqliteSynchronous::Normal,
            SyncMode::Full => SqliteSynchronous::Full,
            SyncMode::Extra => SqliteSynchronous::Extra,
        }
    }
}

/// Per-connection settings applied when the store is opened.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// How long SQLite waits on a locked database before failing the statement.
    pub busy_timeout: Duration,
    pub synchronous: SyncMode,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            synchronous: SyncMode::default(),
        }
    }
}

/// Open (creating if missing) the SQLite database at `path`.
///
/// # Configuration
///
/// - WAL journal mode
/// - Configured synchronous mode and busy timeout
/// - Foreign key enforcement on
pub async fn open_connection(
    path: &Path,
    settings: &ConnectionSettings,
) -> Result<SqliteConnection, StorageError> {
    let conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(settings.synchronous.into())
        .busy_timeout(settings.busy_timeout)
        .foreign_keys(true)
        .connect()
        .await?;

    tracing::debug!(path = %path.display(), "SQLite connection opened");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_connection_applies_pragmas() {
        let dir = tempdir().unwrap();
        let settings = ConnectionSettings {
            busy_timeout: Duration::from_millis(1500),
            synchronous: SyncMode::Full,
        };
        let mut conn = open_connection(&dir.path().join("pragmas.db"), &settings)
            .await
            .unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(mode, "wal");

        let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(timeout, 1500);

        // FULL = 2
        let sync: i64 = sqlx::query_scalar("PRAGMA synchronous")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(sync, 2);
    }

    #[tokio::test]
    async fn test_open_connection_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        assert!(!path.exists());

        open_connection(&path, &ConnectionSettings::default())
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!(SyncMode::from_str("FULL").unwrap(), SyncMode::Full);
        assert_eq!(SyncMode::Normal.as_ref(), "normal");
        assert!(SyncMode::from_str("fast").is_err());
    }
}
