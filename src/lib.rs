//! # Rust Firebird Client
//!
//! Connection-level resource management for Firebird/InterBase servers. A [`Database`]
//! handle owns one native attachment and tracks every transaction, statement, blob, array
//! and event subscription created against it, so that tearing the connection down rolls
//! back and releases all of them exactly once.
//!
//! ## Features
//!
//! - **Shared handles**: cloning a [`Database`] hands out another reference to the same
//!   connection; the last release disconnects it
//! - **Ordered teardown**: started transactions are rolled back, then blobs, arrays,
//!   statements, transactions and events are detached in that order
//! - **Pluggable driver**: every server call goes through the [`Driver`] trait
//! - **In-memory driver**: [`MemoryDriver`] models a server for tests and tooling
//! - **Thread Safety**: handles are `Send + Sync`, guarded with `parking_lot`
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_fbclient::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let driver = Arc::new(MemoryDriver::new());
//!     let client = Client::new(driver);
//!
//!     let db = client.database(
//!         ConnectionConfig::new("/data/employee.fdb")
//!             .user("SYSDBA")
//!             .password("masterkey"),
//!     );
//!     db.create(3)?;
//!     db.connect()?;
//!
//!     let tr = Transaction::new(&db)?;
//!     tr.start()?;
//!     tr.commit()?;
//!
//!     db.disconnect()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! rust_fbclient/
//! ├── src/
//! │   ├── core/              # Connection, dependents, buffers and the driver trait
//! │   ├── backends/          # Driver implementations
//! │   └── lib.rs
//! ├── tests/                 # Integration and property tests
//! ├── benches/               # Criterion benchmarks
//! ├── demos/                # Runnable examples
//! └── Cargo.toml
//! ```

/// Connection handle, dependent resources and driver interface
pub mod core;

/// Driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_fbclient::prelude::*;
/// use std::sync::Arc;
///
/// let client = Client::new(Arc::new(MemoryDriver::new()));
/// let db = client.database(ConnectionConfig::new("test.fdb").user("SYSDBA"));
/// assert!(!db.is_connected());
/// ```
pub mod prelude {
    pub use crate::core::{
        Array, Blob, Client, ConnectionConfig, Database, DatabaseError, Dialect, Driver, Events,
        Result, Statement, Transaction,
    };

    #[cfg(feature = "memory")]
    pub use crate::backends::MemoryDriver;
}

// Re-export at root level for convenience
pub use core::{
    Array, Blob, Client, ConnectionConfig, ConnectionId, Database, DatabaseError, Dialect,
    Driver, Events, RawHandle, ResourceKind, Result, Statement, Transaction,
};

#[cfg(feature = "memory")]
pub use backends::MemoryDriver;
