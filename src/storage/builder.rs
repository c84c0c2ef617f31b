//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the gateway and shutting it down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::StorageGateway;
use crate::storage::actor::DbActor;
use crate::storage::db::{ConnectionSettings, SyncMode};

/// Default channel capacity for writer commands.
///
/// Each in-flight ingest request holds at most one queued command, so this
/// bounds the number of requests waiting on the writer at once.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    channel_capacity: usize,
    settings: ConnectionSettings,
}

impl StorageBuilder {
    /// Create a new storage builder for the database file at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            settings: ConnectionSettings::default(),
        }
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set how long a statement waits on a locked database before failing.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.settings.busy_timeout = timeout;
        self
    }

    /// Set the SQLite synchronous mode.
    pub fn synchronous(mut self, mode: SyncMode) -> Self {
        self.settings.synchronous = mode;
        self
    }

    /// Open the store, create the schema and start the writer actor.
    ///
    /// # Errors
    /// Returns `StorageError` if the directory, the database or the schema
    /// cannot be prepared. Callers must not serve requests in that case.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Internal(format!(
                        "Failed to create database directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let (actor_handle, tx) =
            DbActor::spawn(&self.db_path, &self.settings, self.channel_capacity.max(1)).await?;

        tracing::info!(path = %self.db_path.display(), "Storage ready");

        Ok(StorageHandles {
            gateway: StorageGateway::new(tx),
            actor_handle: Some(actor_handle),
        })
    }
}

/// Handles to the storage layer.
pub struct StorageHandles {
    /// Serialized write facade.
    pub gateway: StorageGateway,
    /// Internal actor handle for graceful shutdown.
    actor_handle: Option<JoinHandle<()>>,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Commands queued before this call are still processed; the call returns
    /// once the writer has closed its connection.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.gateway.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join actor task: {e}")))?;
        }

        Ok(())
    }
}
