//! Measurement ingestion pipeline.
//!
//! Turns a raw request body into persisted rows:
//! decode the batch, take one enrichment snapshot (receipt time and peer
//! host), then write each measurement in order through the
//! [`StorageGateway`]. Processing stops at the first measurement that fails
//! to persist; measurements written before it stay in the store.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use serde::Serialize;
use thiserror::Error;

use crate::clock::unix_time_now;
use crate::storage::{
    Measurement, MeasurementRecord, StorageError, StorageGateway, WritePolicy, nullable_items,
};

/// Errors that end an ingest request.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The body is not a JSON array of measurements.
    #[error("malformed measurement batch: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The detached write task panicked or was cancelled.
    #[error("ingest task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A measurement could not be persisted; `committed` earlier ones were.
    #[error("failed to store measurement {index} ({committed} already committed): {source}")]
    Storage {
        index: usize,
        committed: usize,
        #[source]
        source: StorageError,
    },
}

impl IngestError {
    /// Classify a body collection error as oversize or plain read failure.
    pub fn from_body_error(err: axum::Error, limit: usize) -> Self {
        let mut cause: Option<&(dyn StdError + 'static)> = Some(&err);
        while let Some(e) = cause {
            if e.is::<LengthLimitError>() {
                return Self::BodyTooLarge { limit };
            }
            cause = e.source();
        }
        Self::BodyRead(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyRead(_) | Self::Task(_) | Self::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or_default();
        let body = match self {
            Self::Malformed(_) => format!("{reason}, error parsing json"),
            _ => reason.to_string(),
        };
        (status, body).into_response()
    }
}

/// Server-side metadata shared by every measurement of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub received_unix_time: f64,
    pub source_address: String,
}

impl Enrichment {
    /// Snapshot the clock and the peer host for a batch.
    pub fn capture(remote_addr: Option<&str>) -> Self {
        Self {
            received_unix_time: unix_time_now(),
            source_address: remote_addr.map(host_only).unwrap_or_default().to_string(),
        }
    }
}

/// Strip the port from a `host:port` peer address.
///
/// Bracketed IPv6 (`[::1]:80`) yields the bare address. Values without a
/// port delimiter, including bare IPv6 addresses, are returned unchanged.
pub fn host_only(remote: &str) -> &str {
    if let Some(rest) = remote.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host;
        }
    }
    match remote.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => remote,
    }
}

/// Decode a request body into a batch.
///
/// A JSON `null` is accepted as an empty batch and a `null` entry as a
/// measurement with default fields.
pub fn decode_batch(body: &[u8]) -> Result<Vec<Measurement>, IngestError> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let batch = nullable_items(&mut deserializer)?;
    deserializer.end()?;
    Ok(batch)
}

/// Outcome of a fully processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub measurements: usize,
    #[serde(skip)]
    pub properties: usize,
    pub property_failures: usize,
}

/// Writes decoded batches through the storage gateway.
#[derive(Debug, Clone)]
pub struct Ingestor {
    gateway: StorageGateway,
    policy: WritePolicy,
}

impl Ingestor {
    pub fn new(gateway: StorageGateway, policy: WritePolicy) -> Self {
        Self { gateway, policy }
    }

    /// Persist `batch` in order, stamping each item from `enrichment`.
    ///
    /// # Errors
    /// Returns `IngestError::Storage` for the first measurement that could not
    /// be written; the remaining items are not attempted.
    pub async fn ingest(
        &self,
        batch: Vec<Measurement>,
        enrichment: &Enrichment,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        for (index, measurement) in batch.into_iter().enumerate() {
            let record = MeasurementRecord::stamp(
                measurement,
                enrichment.received_unix_time,
                &enrichment.source_address,
            );

            let stored = match self.policy {
                WritePolicy::Atomic => self.write_atomic(record, &mut report).await,
                WritePolicy::BestEffort => self.write_best_effort(record, &mut report).await,
            };

            if let Err(source) = stored {
                tracing::error!(
                    index,
                    committed = report.measurements,
                    error = %source,
                    "Measurement write failed, aborting batch"
                );
                return Err(IngestError::Storage {
                    index,
                    committed: report.measurements,
                    source,
                });
            }
            report.measurements += 1;
        }

        Ok(report)
    }

    async fn write_atomic(
        &self,
        record: MeasurementRecord,
        report: &mut IngestReport,
    ) -> Result<(), StorageError> {
        let properties = record.properties.len();
        self.gateway.insert_measurement(record).await?;
        report.properties += properties;
        Ok(())
    }

    async fn write_best_effort(
        &self,
        record: MeasurementRecord,
        report: &mut IngestReport,
    ) -> Result<(), StorageError> {
        let measurement_id = self.gateway.insert_measurement_row(&record).await?;

        for property in &record.properties {
            match self.gateway.insert_property_row(measurement_id, property).await {
                Ok(()) => report.properties += 1,
                Err(e) => {
                    tracing::warn!(
                        measurement_id,
                        key = %property.key,
                        error = %e,
                        "Property write failed"
                    );
                    report.property_failures += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{ConnectionSettings, open_connection};
    use crate::storage::{Property, StorageBuilder, StorageHandles};
    use std::path::Path;
    use tempfile::tempdir;

    async fn build(path: &Path) -> StorageHandles {
        StorageBuilder::new(path).build().await.unwrap()
    }

    async fn counts(path: &Path) -> (i64, i64) {
        let mut conn = open_connection(path, &ConnectionSettings::default())
            .await
            .unwrap();
        let m: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurement")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        let p: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurement_property")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        (m, p)
    }

    fn measurement(unixtime: f64, keys: &[&str]) -> Measurement {
        Measurement {
            measured_unix_time: unixtime,
            properties: keys
                .iter()
                .map(|k| Property::new(*k, "1", "int", "count"))
                .collect(),
        }
    }

    #[test]
    fn test_host_only() {
        assert_eq!(host_only("192.168.0.10:5678"), "192.168.0.10");
        assert_eq!(host_only("[::1]:5678"), "::1");
        assert_eq!(host_only("[fe80::1%eth0]:80"), "fe80::1%eth0");
        assert_eq!(host_only("::1"), "::1");
        assert_eq!(host_only("sensor-gw"), "sensor-gw");
        assert_eq!(host_only(""), "");
    }

    #[test]
    fn test_enrichment_capture() {
        let before = unix_time_now();
        let e = Enrichment::capture(Some("10.1.2.3:40000"));
        assert!(e.received_unix_time >= before);
        assert_eq!(e.source_address, "10.1.2.3");
        assert_eq!(Enrichment::capture(None).source_address, "");
    }

    #[test]
    fn test_decode_batch() {
        assert!(decode_batch(b"[]").unwrap().is_empty());
        assert!(decode_batch(b"null").unwrap().is_empty());
        assert_eq!(decode_batch(br#"[{"unixtime": 1}, {}]"#).unwrap().len(), 2);
        assert!(matches!(
            decode_batch(b"{not an array}"),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(decode_batch(b""), Err(IngestError::Malformed(_))));
        assert!(matches!(
            decode_batch(br#"{"unixtime": 1}"#),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(decode_batch(b"[] []"), Err(IngestError::Malformed(_))));
    }

    #[test]
    fn test_decode_batch_nulls() {
        let batch = decode_batch(br#"[{"unixtime": null}, {"unixtime": 1, "properties": null}, null]"#)
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], Measurement::default());
        assert_eq!(batch[1].measured_unix_time, 1.0);
        assert!(batch[1].properties.is_empty());
        assert_eq!(batch[2], Measurement::default());
    }

    #[test]
    fn test_error_status_mapping() {
        let malformed = decode_batch(b"[").unwrap_err();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            IngestError::BodyTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            IngestError::Storage {
                index: 0,
                committed: 0,
                source: StorageError::ChannelSend,
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_aborted_task_is_server_error() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let err = IngestError::from(handle.await.unwrap_err());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_ingest_atomic_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("atomic.db");
        let handles = build(&path).await;
        let ingestor = Ingestor::new(handles.gateway.clone(), WritePolicy::Atomic);

        let report = ingestor
            .ingest(
                vec![measurement(1.0, &["a", "b"]), measurement(2.0, &[]), measurement(3.0, &["c"])],
                &Enrichment::capture(Some("127.0.0.1:1")),
            )
            .await
            .unwrap();

        assert_eq!(report.measurements, 3);
        assert_eq!(report.properties, 3);
        assert_eq!(report.property_failures, 0);
        handles.shutdown().await.unwrap();
        assert_eq!(counts(&path).await, (3, 3));
    }

    #[tokio::test]
    async fn test_ingest_aborts_on_measurement_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abort.db");
        let handles = build(&path).await;
        handles
            .gateway
            .execute(
                "CREATE TRIGGER fail_second BEFORE INSERT ON measurement \
                 WHEN NEW.measured_unix_time = 2.0 BEGIN SELECT RAISE(ABORT, 'simulated fault'); END",
                Vec::new(),
            )
            .await
            .unwrap();
        let ingestor = Ingestor::new(handles.gateway.clone(), WritePolicy::Atomic);

        let err = ingestor
            .ingest(
                vec![measurement(1.0, &["a"]), measurement(2.0, &["b"]), measurement(3.0, &["c"])],
                &Enrichment::capture(None),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Storage {
                index: 1,
                committed: 1,
                ..
            }
        ));
        handles.shutdown().await.unwrap();
        assert_eq!(counts(&path).await, (1, 1));
    }

    #[tokio::test]
    async fn test_ingest_best_effort_reports_property_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("best_effort.db");
        let handles = build(&path).await;
        handles
            .gateway
            .execute(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON measurement_property \
                 WHEN NEW.key = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                Vec::new(),
            )
            .await
            .unwrap();
        let ingestor = Ingestor::new(handles.gateway.clone(), WritePolicy::BestEffort);

        let report = ingestor
            .ingest(
                vec![measurement(1.0, &["good", "bad", "fine"]), measurement(2.0, &["bad"])],
                &Enrichment::capture(None),
            )
            .await
            .unwrap();

        assert_eq!(report.measurements, 2);
        assert_eq!(report.properties, 2);
        assert_eq!(report.property_failures, 2);
        handles.shutdown().await.unwrap();
        assert_eq!(counts(&path).await, (2, 2));
    }

    #[tokio::test]
    async fn test_ingest_atomic_rolls_back_item_with_bad_property() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("atomic_bad.db");
        let handles = build(&path).await;
        handles
            .gateway
            .execute(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON measurement_property \
                 WHEN NEW.key = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                Vec::new(),
            )
            .await
            .unwrap();
        let ingestor = Ingestor::new(handles.gateway.clone(), WritePolicy::Atomic);

        let err = ingestor
            .ingest(
                vec![measurement(1.0, &["ok"]), measurement(2.0, &["ok", "bad"])],
                &Enrichment::capture(None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Storage { index: 1, .. }));
        handles.shutdown().await.unwrap();
        assert_eq!(counts(&path).await, (1, 1));
    }
}
