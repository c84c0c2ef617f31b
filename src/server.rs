//! Web server module.
//!
//! Routes:
//! - `POST /measurements`: ingest a JSON batch of measurements
//! - `GET /time`: current server time as decimal Unix seconds
//! - `GET /healthz`: liveness probe
//!
//! The router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()` so that ingested
//! measurements carry the peer address.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::to_bytes,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::clock::{format_unix_time, unix_time_now};
use crate::ingest::{Enrichment, IngestError, Ingestor, decode_batch};

/// Default maximum accepted ingest body (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(ingestor: Ingestor) -> Self {
        Self {
            ingestor,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route(
            "/measurements",
            post(ingest_handler).fallback(post_only_handler),
        )
        .route("/time", get(time_handler).fallback(get_only_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Ingest a batch of measurements.
async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, IngestError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let limit = state.max_body_bytes;
    let body = to_bytes(request.into_body(), limit)
        .await
        .map_err(|e| IngestError::from_body_error(e, limit))
        .inspect_err(|e| tracing::error!(error = %e, "Error reading request body"))?;

    let batch =
        decode_batch(&body).inspect_err(|e| tracing::warn!(error = %e, "Error parsing request body"))?;

    let enrichment = Enrichment::capture(peer.as_deref());
    tracing::info!(
        count = batch.len(),
        source = %enrichment.source_address,
        "Saving measurements"
    );

    // The write loop runs on its own task so a client disconnect, which drops
    // this handler future, cannot stop a batch partway through.
    let ingestor = state.ingestor.clone();
    let report = tokio::spawn(async move { ingestor.ingest(batch, &enrichment).await })
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Ingest task failed"))??;

    if report.property_failures > 0 {
        tracing::warn!(
            measurements = report.measurements,
            property_failures = report.property_failures,
            "Batch stored with property failures"
        );
        return Ok((StatusCode::OK, Json(report)).into_response());
    }

    tracing::debug!(
        measurements = report.measurements,
        properties = report.properties,
        "Batch stored"
    );
    Ok(StatusCode::OK.into_response())
}

/// Current server time in decimal seconds.
async fn time_handler() -> String {
    let now = unix_time_now();
    tracing::debug!(now, "Sending time");
    format_unix_time(now)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn post_only_handler() -> Response {
    method_not_allowed("POST", ", use POST")
}

async fn get_only_handler() -> Response {
    method_not_allowed("GET, HEAD", "")
}

fn method_not_allowed(allow: &'static str, hint: &str) -> Response {
    let status = StatusCode::METHOD_NOT_ALLOWED;
    let reason = status.canonical_reason().unwrap_or_default();
    (status, [(header::ALLOW, allow)], format!("{reason}{hint}")).into_response()
}
