//! User-facing write facade over the writer actor.
//!
//! [`StorageGateway`] is cheap to clone and is the only way the rest of the
//! service touches the store. Each call queues one command and waits for the
//! actor's reply, so callers are served in the order they enqueue.

use tokio::sync::{mpsc, oneshot};

use crate::storage::StorageError;
use crate::storage::actor::{Command, Reply};
use crate::storage::schema::{INSERT_MEASUREMENT_SQL, INSERT_PROPERTY_SQL};
use crate::storage::types::{MeasurementRecord, Property, SqlValue, WriteOutcome};

/// Serialized write path into the store.
#[derive(Clone)]
pub struct StorageGateway {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGateway").finish_non_exhaustive()
    }
}

impl StorageGateway {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Execute a single parameterized statement exclusively.
    ///
    /// Returns the generated row id (meaningful for `INSERT`) and the number
    /// of affected rows. Errors are returned as-is; nothing is retried.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<WriteOutcome, StorageError> {
        let sql = sql.into();
        self.request(|reply| Command::Execute { sql, params, reply })
            .await
    }

    /// Insert a measurement and all of its properties as one transaction.
    ///
    /// Returns the generated measurement id. On error nothing of this
    /// measurement is persisted.
    pub async fn insert_measurement(&self, record: MeasurementRecord) -> Result<i64, StorageError> {
        self.request(|reply| Command::InsertMeasurement { record, reply })
            .await
    }

    /// Insert only the measurement row, returning its generated id.
    pub async fn insert_measurement_row(
        &self,
        record: &MeasurementRecord,
    ) -> Result<i64, StorageError> {
        let outcome = self
            .execute(
                INSERT_MEASUREMENT_SQL,
                vec![
                    record.measured_unix_time.into(),
                    record.received_unix_time.into(),
                    record.source_address.as_str().into(),
                ],
            )
            .await?;
        Ok(outcome.last_insert_id)
    }

    /// Insert one property row for an existing measurement.
    pub async fn insert_property_row(
        &self,
        measurement_id: i64,
        property: &Property,
    ) -> Result<(), StorageError> {
        self.execute(
            INSERT_PROPERTY_SQL,
            vec![
                measurement_id.into(),
                property.key.as_str().into(),
                property.value.as_str().into(),
                property.kind.as_str().into(),
                property.units.as_str().into(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Ask the actor to stop after the commands already queued.
    pub(crate) async fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ActorGone)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBuilder;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_gateway_rejects_after_shutdown() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("closed.db"))
            .build()
            .await
            .unwrap();
        let gateway = handles.gateway.clone();
        handles.shutdown().await.unwrap();

        let err = gateway
            .execute("DELETE FROM measurement", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ChannelSend));
    }

    #[tokio::test]
    async fn test_gateway_reports_statement_errors() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("errors.db"))
            .build()
            .await
            .unwrap();

        let err = handles
            .gateway
            .execute("INSERT INTO no_such_table VALUES (?)", vec![1_i64.into()])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));

        // The actor keeps serving after a failed statement.
        let outcome = handles
            .gateway
            .insert_measurement_row(&MeasurementRecord {
                measured_unix_time: 1.0,
                received_unix_time: 2.0,
                source_address: "::1".to_string(),
                properties: Vec::new(),
            })
            .await;
        assert!(outcome.is_ok());

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_property_row_requires_existing_measurement() {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("fk.db"))
            .build()
            .await
            .unwrap();

        let result = handles
            .gateway
            .insert_property_row(9_999, &Property::new("k", "v", "string", ""))
            .await;
        assert!(matches!(result, Err(StorageError::Database(_))));

        handles.shutdown().await.unwrap();
    }
}
