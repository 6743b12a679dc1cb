//! Core connection types and traits
//!
//! This module provides the connection handle, its dependent resources, the driver
//! interface they talk to, and the parameter/result buffers exchanged with it.

pub mod array;
pub mod attributes;
pub mod blob;
pub mod client;
pub mod config;
pub mod database;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod events;
pub mod info;
pub mod resource;
pub mod sql;
pub mod statement;
pub mod status;
pub mod transaction;

// Re-export commonly used types
pub use array::{Array, ArrayDescriptor};
pub use attributes::AttributeBuffer;
pub use blob::Blob;
pub use client::{Client, ConnectionRegistry};
pub use config::ConnectionConfig;
pub use database::{ConnectionId, Database};
pub use dialect::Dialect;
pub use driver::{Driver, RawHandle};
pub use error::{DatabaseError, Result};
pub use events::Events;
pub use info::{DatabaseCounts, DatabaseInfo, DatabaseStatistics, InfoBuilder, ResultBuffer};
pub use resource::{ResourceId, ResourceKind};
pub use sql::escape;
pub use statement::Statement;
pub use status::{Status, StatusDetail};
pub use transaction::Transaction;
