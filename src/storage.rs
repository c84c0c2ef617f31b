//! Storage Layer
//!
//! SQLite persistence behind a single writer:
//! - **Actor**: one task owns the only connection and runs commands one at a time
//! - **Gateway**: cloneable async facade that queues commands and awaits replies
//!
//! # Components
//!
//! - [`StorageGateway`]: serialized write path (generic statements and measurement inserts)
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle management
//! - [`Measurement`] / [`Property`] / [`MeasurementRecord`]: data types

mod actor;
mod builder;
pub mod db;
mod error;
mod gateway;
pub mod schema;
mod types;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, StorageBuilder, StorageHandles};
pub use db::{DEFAULT_BUSY_TIMEOUT, SyncMode};
pub use error::StorageError;
pub use gateway::StorageGateway;
pub use types::{Measurement, MeasurementRecord, Property, SqlValue, WriteOutcome, WritePolicy};
pub(crate) use types::nullable_items;
