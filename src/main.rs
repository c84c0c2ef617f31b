//! ingestd Binary Entry Point
//!
//! Loads configuration, prepares the store and serves the HTTP API.
//! Core functionality is provided by the `ingestd` library crate.

use std::net::SocketAddr;

use clap::Parser;
use ingestd::{
    AppState, Ingestor, StorageBuilder, StorageHandles, config::AppConfig, create_router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ingestd - Measurement Ingestion Service
#[derive(Parser, Debug)]
#[command(name = "ingestd", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "INGESTD_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "INGESTD_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "INGESTD_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "INGESTD_DB_PATH")]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ingestd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ingestd - Measurement Ingestion Service");

    // Parse CLI arguments
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {} (write policy: {})",
        config.server.bind,
        config.server.port,
        config.database.path,
        config.database.write_policy,
    );

    // Build storage layer; the process must not serve against an unprepared store
    let handles = match StorageBuilder::new(&config.database.path)
        .channel_capacity(config.database.channel_capacity)
        .busy_timeout(config.database.busy_timeout()?)
        .synchronous(config.database.synchronous)
        .build()
        .await
    {
        Ok(handles) => handles,
        Err(e) => {
            tracing::error!(error = %e, "Storage initialization failed");
            return Err(e.into());
        }
    };

    let ingestor = Ingestor::new(handles.gateway.clone(), config.database.write_policy);
    let app_state = AppState::new(ingestor).with_max_body_bytes(config.server.max_body_bytes);
    let app = create_router(app_state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Started on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown_storage(handles).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

/// Drain queued writes and close the store.
async fn shutdown_storage(handles: StorageHandles) {
    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!(error = %e, "Failed to shutdown storage");
    }
}
