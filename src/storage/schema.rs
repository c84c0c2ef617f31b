//! Database schema definitions and write statements.

use sqlx::SqliteConnection;

use crate::storage::StorageError;

/// SQL statement for creating the measurement table.
///
/// `id` aliases the SQLite rowid, so it is the id returned by `last_insert_rowid`.
pub const MEASUREMENT_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS measurement (
    id                 INTEGER PRIMARY KEY,
    measured_unix_time REAL,
    received_unix_time REAL,
    ip                 TEXT
)
"#;

/// SQL statement for creating the measurement_property table.
///
/// Stores all four wire fields of a property; `type` and `units` are kept verbatim.
pub const MEASUREMENT_PROPERTY_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS measurement_property (
    measurement_id INTEGER REFERENCES measurement (id),
    key            TEXT,
    value          TEXT,
    type           TEXT,
    units          TEXT
)
"#;

/// Lookup index on the property foreign key.
pub const MEASUREMENT_PROPERTY_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS measurement_id_index ON measurement_property (measurement_id)
"#;

pub const INSERT_MEASUREMENT_SQL: &str = r#"
INSERT INTO measurement (measured_unix_time, received_unix_time, ip)
VALUES (?, ?, ?)
"#;

pub const INSERT_PROPERTY_SQL: &str = r#"
INSERT INTO measurement_property (measurement_id, key, value, type, units)
VALUES (?, ?, ?, ?, ?)
"#;

/// Initialize the database schema.
///
/// Creates both tables and the property index if they don't exist, so it is
/// safe to run on every startup.
pub async fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    for ddl in [
        MEASUREMENT_TABLE_DDL,
        MEASUREMENT_PROPERTY_TABLE_DDL,
        MEASUREMENT_PROPERTY_INDEX_DDL,
    ] {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}
