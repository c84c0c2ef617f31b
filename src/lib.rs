//! ingestd - Measurement Ingestion Service
//!
//! Accepts batches of timestamped sensor readings over HTTP, stamps them with
//! server receipt time and client address, and appends them to SQLite. It can
//! be embedded as a library or run with the `ingestd` executable.
//!
//! # Architecture
//!
//! - **Storage**: single-writer actor over one SQLite connection ([`StorageGateway`])
//! - **Ingest**: batch decoding, enrichment and ordered persistence ([`Ingestor`])
//! - **Server**: axum routes for `/measurements`, `/time` and `/healthz`
//!
//! # Example
//!
//! ```rust,ignore
//! use ingestd::{AppState, Ingestor, StorageBuilder, WritePolicy, create_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = StorageBuilder::new("measurements.db").build().await?;
//!     let ingestor = Ingestor::new(handles.gateway.clone(), WritePolicy::Atomic);
//!     let app = create_router(AppState::new(ingestor));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5678").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod ingest;
pub mod server;
pub mod storage;

pub use ingest::{Enrichment, IngestError, IngestReport, Ingestor};
pub use server::{AppState, create_router};
pub use storage::{
    Measurement, MeasurementRecord, Property, StorageBuilder, StorageError, StorageGateway,
    StorageHandles, WritePolicy,
};
