//! SQLite connection setup.
//!
//! The writer actor owns exactly one connection, so this layer opens a single
//! connection with the configured pragmas rather than a pool.
//!
//! # Example
//!
//! ```ignore
//! let settings = ConnectionSettings::default();
//! let mut conn = open_connection(Path::new("data/measurements.db"), &settings).await?;
//! sqlx::query("SELECT 1").execute(&mut conn).await?;
//! ```

mod sqlite;

pub use sqlite::{ConnectionSettings, DEFAULT_BUSY_TIMEOUT, SyncMode, open_connection};
