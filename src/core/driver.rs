//! Native driver entry points
//!
//! The connection layer talks to the client library exclusively through the [`Driver`]
//! trait. Every entry point mirrors the C API: it receives a [`Status`] to report into and
//! raw handles passed in/out. A driver nulls a handle it has released.

use super::status::Status;
use std::fmt;

/// Minimum client library version able to talk to an ODS 10+ server
pub const MIN_CLIENT_VERSION: i32 = 60;

/// Entry point names, used in diagnostics and call accounting
pub mod calls {
    pub const ATTACH_DATABASE: &str = "isc_attach_database";
    pub const DETACH_DATABASE: &str = "isc_detach_database";
    pub const DROP_DATABASE: &str = "isc_drop_database";
    pub const EXECUTE_IMMEDIATE: &str = "isc_dsql_execute_immediate";
    pub const DATABASE_INFO: &str = "isc_database_info";
    pub const START_TRANSACTION: &str = "isc_start_multiple";
    pub const COMMIT_TRANSACTION: &str = "isc_commit_transaction";
    pub const ROLLBACK_TRANSACTION: &str = "isc_rollback_transaction";
    pub const ALLOCATE_STATEMENT: &str = "isc_dsql_allocate_statement";
    pub const FREE_STATEMENT: &str = "isc_dsql_free_statement";
    pub const CREATE_BLOB: &str = "isc_create_blob2";
    pub const OPEN_BLOB: &str = "isc_open_blob2";
    pub const CLOSE_BLOB: &str = "isc_close_blob";
    pub const CANCEL_BLOB: &str = "isc_cancel_blob";
    pub const QUEUE_EVENTS: &str = "isc_que_events";
    pub const CANCEL_EVENTS: &str = "isc_cancel_events";
}

/// Opaque native handle; zero means "no object"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u32);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Entry points of a native client library
///
/// Calls are blocking. Implementations report failures through `status` and leave
/// in/out handles untouched when a call fails.
pub trait Driver: Send + Sync {
    /// Version of the local client library (60 for 6.0)
    fn client_version(&self) -> i32;

    /// Attach to `path`, storing the new attachment in `db`
    fn attach_database(&self, status: &mut Status, path: &str, db: &mut RawHandle, dpb: &[u8]);

    fn detach_database(&self, status: &mut Status, db: &mut RawHandle);

    /// Delete the attached database and release the attachment
    fn drop_database(&self, status: &mut Status, db: &mut RawHandle);

    /// Execute a statement without preparing it; `CREATE DATABASE` attaches `db`
    fn execute_immediate(
        &self,
        status: &mut Status,
        db: &mut RawHandle,
        tr: &mut RawHandle,
        sql: &str,
        dialect: u16,
    );

    /// Fill `buffer` with the facts requested by `items`
    fn database_info(&self, status: &mut Status, db: RawHandle, items: &[u8], buffer: &mut [u8]);

    fn start_transaction(&self, status: &mut Status, tr: &mut RawHandle, db: RawHandle);

    fn commit_transaction(&self, status: &mut Status, tr: &mut RawHandle);

    fn rollback_transaction(&self, status: &mut Status, tr: &mut RawHandle);

    fn allocate_statement(&self, status: &mut Status, db: RawHandle, stmt: &mut RawHandle);

    fn free_statement(&self, status: &mut Status, stmt: &mut RawHandle);

    fn create_blob(
        &self,
        status: &mut Status,
        db: RawHandle,
        tr: RawHandle,
        blob: &mut RawHandle,
        blob_id: &mut u64,
    );

    fn open_blob(
        &self,
        status: &mut Status,
        db: RawHandle,
        tr: RawHandle,
        blob: &mut RawHandle,
        blob_id: u64,
    );

    fn close_blob(&self, status: &mut Status, blob: &mut RawHandle);

    fn cancel_blob(&self, status: &mut Status, blob: &mut RawHandle);

    /// Queue a wait on `names`; `event_id` receives the wait identifier
    fn queue_events(&self, status: &mut Status, db: RawHandle, event_id: &mut i32, names: &[String]);

    fn cancel_events(&self, status: &mut Status, db: RawHandle, event_id: &mut i32);
}
