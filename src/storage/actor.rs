//! Writer actor with a dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one task owns the only connection to the store and
//! processes commands one at a time, in the order they were queued. Every
//! write in the process goes through here, so no two statements ever run
//! against the store concurrently.

use std::path::Path;

use sqlx::{Connection, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::db::{ConnectionSettings, open_connection};
use crate::storage::schema::{INSERT_MEASUREMENT_SQL, INSERT_PROPERTY_SQL, init_schema};
use crate::storage::types::{MeasurementRecord, SqlValue, WriteOutcome};

/// Reply channel for a single command.
pub type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Run one parameterized statement.
    Execute {
        sql: String,
        params: Vec<SqlValue>,
        reply: Reply<WriteOutcome>,
    },
    /// Insert a measurement and its properties in one transaction.
    InsertMeasurement {
        record: MeasurementRecord,
        reply: Reply<i64>,
    },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    conn: SqliteConnection,
    rx: mpsc::Receiver<Command>,
}

impl DbActor {
    /// Open the store, initialize the schema and spawn the writer task.
    ///
    /// The schema is created before the task starts, so no command can reach
    /// a store with missing tables. Any failure here is returned and nothing
    /// is spawned.
    pub async fn spawn(
        db_path: &Path,
        settings: &ConnectionSettings,
        channel_capacity: usize,
    ) -> Result<(JoinHandle<()>, mpsc::Sender<Command>), StorageError> {
        let mut conn = open_connection(db_path, settings).await?;
        init_schema(&mut conn).await?;

        let (tx, rx) = mpsc::channel(channel_capacity);
        let actor = DbActor { conn, rx };
        let handle = tokio::spawn(actor.run());

        Ok((handle, tx))
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        loop {
            match self.rx.recv().await {
                Some(cmd) => {
                    if self.handle_command(cmd).await {
                        break; // Shutdown requested
                    }
                }
                None => {
                    tracing::debug!("All writer handles dropped, shutting down");
                    break;
                }
            }
        }

        if let Err(e) = self.conn.close().await {
            tracing::warn!(error = %e, "Failed to close store connection");
        }
        tracing::info!("DbActor stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Execute { sql, params, reply } => {
                let result = self.execute(&sql, &params).await;
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "Statement failed");
                }
                if reply.send(result).is_err() {
                    tracing::debug!("Caller went away before statement result was delivered");
                }
            }
            Command::InsertMeasurement { record, reply } => {
                let result = self.insert_measurement(&record).await;
                if reply.send(result).is_err() {
                    tracing::debug!("Caller went away before insert result was delivered");
                }
            }
            Command::Shutdown => {
                tracing::info!("DbActor shutting down");
                return true;
            }
        }
        false
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteOutcome, StorageError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
            };
        }

        let result = query.execute(&mut self.conn).await?;
        Ok(WriteOutcome {
            last_insert_id: result.last_insert_rowid(),
            rows_affected: result.rows_affected(),
        })
    }

    /// Measurement row then property rows, committed together.
    ///
    /// Dropping the transaction on any error rolls the whole measurement back.
    async fn insert_measurement(&mut self, record: &MeasurementRecord) -> Result<i64, StorageError> {
        let mut tx = self.conn.begin().await?;

        let measurement_id = sqlx::query(INSERT_MEASUREMENT_SQL)
            .bind(record.measured_unix_time)
            .bind(record.received_unix_time)
            .bind(record.source_address.as_str())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for property in &record.properties {
            sqlx::query(INSERT_PROPERTY_SQL)
                .bind(measurement_id)
                .bind(property.key.as_str())
                .bind(property.value.as_str())
                .bind(property.kind.as_str())
                .bind(property.units.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            measurement_id,
            properties = record.properties.len(),
            "Measurement inserted"
        );
        Ok(measurement_id)
    }
}
