//! Connection handle
//!
//! A [`Database`] owns one native attachment and the registry of every resource that
//! depends on it. Handles are shared: cloning (or [`Database::add_ref`]) hands out another
//! reference to the same connection, and the connection is torn down when the last one is
//! released.

use super::attributes::{
    AttributeBuffer, DPB_LC_CTYPE, DPB_PASSWORD, DPB_SQL_ROLE_NAME, DPB_USER_NAME,
};
use super::array::ArrayInner;
use super::blob::BlobInner;
use super::client::ConnectionRegistry;
use super::config::ConnectionConfig;
use super::dialect::Dialect;
use super::driver::{calls, Driver, RawHandle, MIN_CLIENT_VERSION};
use super::error::{DatabaseError, Result};
use super::events::EventsInner;
use super::info::{
    DatabaseCounts, DatabaseInfo, DatabaseStatistics, ResultBuffer, INFO_DB_SQL_DIALECT,
    INFO_END, INFO_ODS_VERSION, INFO_USER_NAMES,
};
use super::resource::{Dependent, ResourceId, ResourceKind, ResourceList};
use super::sql::{connection_string, create_database_statement};
use super::statement::StatementInner;
use super::status::Status;
use super::transaction::TransactionInner;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Buffer size for the post-attach ODS/dialect query
const CONNECT_INFO_SIZE: usize = 100;
/// Buffer size for the attached-users query
const USERS_INFO_SIZE: usize = 8000;

/// Order in which teardown force-detaches dependents
///
/// Blobs, arrays and statements may reference transactions, so they go first.
pub(crate) const TEARDOWN_ORDER: [ResourceKind; 5] = [
    ResourceKind::Blob,
    ResourceKind::Array,
    ResourceKind::Statement,
    ResourceKind::Transaction,
    ResourceKind::Events,
];

struct ConnectionState {
    handle: RawHandle,
    dialect: Dialect,
}

struct Dependents {
    transactions: ResourceList<TransactionInner>,
    statements: ResourceList<StatementInner>,
    blobs: ResourceList<BlobInner>,
    arrays: ResourceList<ArrayInner>,
    events: ResourceList<EventsInner>,
}

impl Dependents {
    fn new() -> Self {
        Self {
            transactions: ResourceList::new(),
            statements: ResourceList::new(),
            blobs: ResourceList::new(),
            arrays: ResourceList::new(),
            events: ResourceList::new(),
        }
    }
}

/// Shared state behind every [`Database`] handle
pub(crate) struct DatabaseInner {
    id: ConnectionId,
    driver: Arc<dyn Driver>,
    registry: Option<Arc<dyn ConnectionRegistry>>,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    dependents: Mutex<Dependents>,
}

impl DatabaseInner {
    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub(crate) fn raw_handle(&self) -> RawHandle {
        self.state.lock().handle
    }

    fn create(&self, dialect: i32) -> Result<()> {
        const CONTEXT: &str = "Database::Create";
        {
            let mut state = self.state.lock();
            if !state.handle.is_null() {
                return Err(DatabaseError::invalid_usage(
                    CONTEXT,
                    "Database is already connected.",
                ));
            }
            self.config.require_identity(CONTEXT)?;
            let dialect = Dialect::from_code(dialect).ok_or_else(|| {
                DatabaseError::invalid_usage(CONTEXT, "Only dialects 1 and 3 are supported.")
            })?;

            let create = create_database_statement(&self.config);
            let mut handle = RawHandle::NULL;
            let mut tr = RawHandle::NULL;
            let mut status = Status::new();
            self.driver.execute_immediate(
                &mut status,
                &mut handle,
                &mut tr,
                &create,
                dialect.code(),
            );
            if status.errors() {
                return Err(DatabaseError::driver(
                    CONTEXT,
                    calls::EXECUTE_IMMEDIATE,
                    &status,
                ));
            }
            state.handle = handle;
            tracing::debug!(connection = %self.id, database = %self.config.database, "database created");
        }

        // Creation leaves the new database attached; callers connect explicitly.
        self.disconnect()
    }

    fn connect(&self) -> Result<()> {
        const CONTEXT: &str = "Database::Connect";
        let mut state = self.state.lock();
        if !state.handle.is_null() {
            return Ok(());
        }
        self.config.require_identity(CONTEXT)?;

        let mut dpb = AttributeBuffer::new();
        dpb.insert(DPB_USER_NAME, &self.config.user)?;
        dpb.insert(DPB_PASSWORD, &self.config.password)?;
        if !self.config.role.is_empty() {
            dpb.insert(DPB_SQL_ROLE_NAME, &self.config.role)?;
        }
        if !self.config.charset.is_empty() {
            dpb.insert(DPB_LC_CTYPE, &self.config.charset)?;
        }

        let path = connection_string(&self.config.server, &self.config.database);
        let mut handle = RawHandle::NULL;
        let mut status = Status::new();
        self.driver
            .attach_database(&mut status, &path, &mut handle, dpb.as_bytes());
        if status.errors() {
            return Err(DatabaseError::driver(
                CONTEXT,
                calls::ATTACH_DATABASE,
                &status,
            ));
        }

        let items = [INFO_ODS_VERSION, INFO_DB_SQL_DIALECT, INFO_END];
        let mut result = ResultBuffer::new(CONNECT_INFO_SIZE);
        status.reset();
        self.driver
            .database_info(&mut status, handle, &items, result.as_mut_slice());
        if status.errors() {
            let err = DatabaseError::driver(CONTEXT, calls::DATABASE_INFO, &status);
            self.abandon_attachment(handle);
            return Err(err);
        }

        let ods = result.get_value(INFO_ODS_VERSION);
        if ods <= 9 {
            self.abandon_attachment(handle);
            return Err(DatabaseError::unsupported_server(
                CONTEXT,
                format!("wrong ODS version ({}), at least '10' required.", ods),
            ));
        }

        let dialect = match Dialect::from_code(result.get_value(INFO_DB_SQL_DIALECT)) {
            Some(dialect) => dialect,
            None => {
                self.abandon_attachment(handle);
                return Err(DatabaseError::unsupported_server(
                    CONTEXT,
                    "Dialect 1 or 3 required",
                ));
            }
        };

        let client_version = self.driver.client_version();
        if client_version < MIN_CLIENT_VERSION {
            self.abandon_attachment(handle);
            return Err(DatabaseError::incompatible_client(
                CONTEXT,
                format!(
                    "client library version {} cannot attach to an ODS {} server",
                    client_version, ods
                ),
            ));
        }

        state.handle = handle;
        state.dialect = dialect;
        tracing::debug!(connection = %self.id, %path, ods, %dialect, "attached");
        Ok(())
    }

    // Detach an attachment that failed a post-attach check; the error being raised wins.
    fn abandon_attachment(&self, mut handle: RawHandle) {
        let mut status = Status::new();
        self.driver.detach_database(&mut status, &mut handle);
        if status.errors() {
            tracing::warn!(connection = %self.id, detail = %status.detail(), "detach after failed connect");
        }
    }

    fn inactivate(&self) -> Result<()> {
        let handle = self.raw_handle();
        if handle.is_null() {
            return Ok(());
        }
        let mut first_error = None;

        let transactions = self.dependents.lock().transactions.upgrade_all();
        for transaction in transactions.iter().filter(|tr| tr.is_started()) {
            if let Err(err) = transaction.rollback() {
                tracing::warn!(connection = %self.id, error = %err, "rollback during inactivate");
                first_error.get_or_insert(err);
            }
        }
        drop(transactions);

        let events = self.dependents.lock().events.upgrade_all();
        for subscription in &events {
            if let Err(err) = subscription.clear_with(handle) {
                tracing::warn!(connection = %self.id, error = %err, "event cancel during inactivate");
                first_error.get_or_insert(err);
            }
        }
        drop(events);

        self.detach_all(handle);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Force-detach every dependent, kind by kind in [`TEARDOWN_ORDER`]
    fn detach_all(&self, handle: RawHandle) {
        for kind in TEARDOWN_ORDER {
            match kind {
                ResourceKind::Blob => self.drain(|d| &mut d.blobs, handle),
                ResourceKind::Array => self.drain(|d| &mut d.arrays, handle),
                ResourceKind::Statement => self.drain(|d| &mut d.statements, handle),
                ResourceKind::Transaction => self.drain(|d| &mut d.transactions, handle),
                ResourceKind::Events => self.drain(|d| &mut d.events, handle),
            }
        }
    }

    fn drain<T: Dependent>(
        &self,
        select: fn(&mut Dependents) -> &mut ResourceList<T>,
        handle: RawHandle,
    ) {
        loop {
            let last = select(&mut self.dependents.lock()).pop();
            let Some((_, resource)) = last else {
                break;
            };
            if let Some(resource) = resource.upgrade() {
                resource.connection_detached(handle);
            }
        }
    }

    fn disconnect(&self) -> Result<()> {
        if self.raw_handle().is_null() {
            return Ok(());
        }
        let inactivated = self.inactivate();

        let mut status = Status::new();
        {
            let mut state = self.state.lock();
            let mut handle = state.handle;
            self.driver.detach_database(&mut status, &mut handle);
            state.handle = RawHandle::NULL;
        }
        if status.errors() {
            return Err(DatabaseError::driver(
                "Database::Disconnect",
                calls::DETACH_DATABASE,
                &status,
            ));
        }
        tracing::debug!(connection = %self.id, "detached");
        inactivated
    }

    fn drop_database(&self) -> Result<()> {
        const CONTEXT: &str = "Database::Drop";
        if self.raw_handle().is_null() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "Database must be connected.",
            ));
        }
        self.inactivate()?;

        let mut state = self.state.lock();
        let mut handle = state.handle;
        let mut status = Status::new();
        self.driver.drop_database(&mut status, &mut handle);
        if status.errors() {
            state.handle = handle;
            return Err(DatabaseError::driver(CONTEXT, calls::DROP_DATABASE, &status));
        }
        state.handle = RawHandle::NULL;
        tracing::debug!(connection = %self.id, database = %self.config.database, "database dropped");
        Ok(())
    }

    fn database_info(
        &self,
        context: &'static str,
        items: &[u8],
        capacity: usize,
    ) -> Result<ResultBuffer> {
        let handle = self.raw_handle();
        if handle.is_null() {
            return Err(DatabaseError::invalid_usage(
                context,
                "Database is not connected.",
            ));
        }
        let mut result = ResultBuffer::new(capacity);
        let mut status = Status::new();
        self.driver
            .database_info(&mut status, handle, items, result.as_mut_slice());
        if status.errors() {
            return Err(DatabaseError::driver(context, calls::DATABASE_INFO, &status));
        }
        Ok(result)
    }

    fn attach<T>(
        &self,
        kind: ResourceKind,
        select: fn(&mut Dependents) -> &mut ResourceList<T>,
        id: ResourceId,
        resource: Weak<T>,
    ) -> Result<()> {
        if id.is_null() || resource.strong_count() == 0 {
            return Err(DatabaseError::invalid_usage(
                kind.attach_context(),
                format!("Can't attach a null {} object.", kind),
            ));
        }
        select(&mut self.dependents.lock()).push(id, resource);
        Ok(())
    }

    fn detach<T>(
        &self,
        kind: ResourceKind,
        select: fn(&mut Dependents) -> &mut ResourceList<T>,
        id: ResourceId,
    ) -> Result<()> {
        if id.is_null() {
            return Err(DatabaseError::invalid_usage(
                kind.detach_context(),
                format!("Can't detach a null {} object.", kind),
            ));
        }
        if !select(&mut self.dependents.lock()).remove(id) {
            return Err(DatabaseError::invalid_usage(
                kind.detach_context(),
                format!("{} {} is not attached to this database.", kind, id),
            ));
        }
        Ok(())
    }

    pub(crate) fn attach_transaction(
        &self,
        id: ResourceId,
        transaction: Weak<TransactionInner>,
    ) -> Result<()> {
        self.attach(ResourceKind::Transaction, |d| &mut d.transactions, id, transaction)
    }

    pub(crate) fn detach_transaction(&self, id: ResourceId) -> Result<()> {
        self.detach(ResourceKind::Transaction, |d| &mut d.transactions, id)
    }

    pub(crate) fn attach_statement(
        &self,
        id: ResourceId,
        statement: Weak<StatementInner>,
    ) -> Result<()> {
        self.attach(ResourceKind::Statement, |d| &mut d.statements, id, statement)
    }

    pub(crate) fn detach_statement(&self, id: ResourceId) -> Result<()> {
        self.detach(ResourceKind::Statement, |d| &mut d.statements, id)
    }

    pub(crate) fn attach_blob(&self, id: ResourceId, blob: Weak<BlobInner>) -> Result<()> {
        self.attach(ResourceKind::Blob, |d| &mut d.blobs, id, blob)
    }

    pub(crate) fn detach_blob(&self, id: ResourceId) -> Result<()> {
        self.detach(ResourceKind::Blob, |d| &mut d.blobs, id)
    }

    pub(crate) fn attach_array(&self, id: ResourceId, array: Weak<ArrayInner>) -> Result<()> {
        self.attach(ResourceKind::Array, |d| &mut d.arrays, id, array)
    }

    pub(crate) fn detach_array(&self, id: ResourceId) -> Result<()> {
        self.detach(ResourceKind::Array, |d| &mut d.arrays, id)
    }

    pub(crate) fn attach_events(&self, id: ResourceId, events: Weak<EventsInner>) -> Result<()> {
        self.attach(ResourceKind::Events, |d| &mut d.events, id, events)
    }

    pub(crate) fn detach_events(&self, id: ResourceId) -> Result<()> {
        self.detach(ResourceKind::Events, |d| &mut d.events, id)
    }

    fn dependent_count(&self, kind: ResourceKind) -> usize {
        let dependents = self.dependents.lock();
        match kind {
            ResourceKind::Transaction => dependents.transactions.len(),
            ResourceKind::Statement => dependents.statements.len(),
            ResourceKind::Blob => dependents.blobs.len(),
            ResourceKind::Array => dependents.arrays.len(),
            ResourceKind::Events => dependents.events.len(),
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if let Some(registry) = &self.registry {
            registry.connection_released(self.id);
        }
        if let Err(err) = self.disconnect() {
            tracing::warn!(connection = %self.id, error = %err, "disconnect on final release failed");
        }
        // A disconnected connection may still have registered dependents.
        self.detach_all(RawHandle::NULL);
    }
}

/// Shared handle to one database connection
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "memory")] {
/// use rust_fbclient::prelude::*;
/// use std::sync::Arc;
///
/// let driver = Arc::new(MemoryDriver::new());
/// let client = Client::new(driver);
/// let db = client.database(
///     ConnectionConfig::new("/data/app.fdb").user("SYSDBA").password("masterkey"),
/// );
///
/// db.create(3)?;
/// db.connect()?;
/// let tr = Transaction::new(&db)?;
/// tr.start()?;
///
/// // Rolls the transaction back and releases every dependent resource.
/// db.disconnect()?;
/// assert!(!tr.is_attached());
/// # }
/// # Ok::<(), rust_fbclient::DatabaseError>(())
/// ```
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<DatabaseInner>,
}

impl Database {
    /// Create a disconnected handle with no registry to notify on release
    pub fn new(driver: Arc<dyn Driver>, config: ConnectionConfig) -> Self {
        Self::build(driver, None, config)
    }

    /// Create a disconnected handle whose final release is reported to `registry`
    pub fn with_registry(
        driver: Arc<dyn Driver>,
        registry: Arc<dyn ConnectionRegistry>,
        config: ConnectionConfig,
    ) -> Self {
        Self::build(driver, Some(registry), config)
    }

    fn build(
        driver: Arc<dyn Driver>,
        registry: Option<Arc<dyn ConnectionRegistry>>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                id: ConnectionId::next(),
                driver,
                registry,
                config,
                state: Mutex::new(ConnectionState {
                    handle: RawHandle::NULL,
                    dialect: Dialect::default(),
                }),
                dependents: Mutex::new(Dependents::new()),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Create the database on the server
    ///
    /// The connection is left disconnected; call [`Database::connect`] afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if already connected, the database or user name is empty, or
    ///   `dialect` is neither 1 nor 3
    /// - `Driver` if the server rejects the creation
    pub fn create(&self, dialect: i32) -> Result<()> {
        self.inner.create(dialect)
    }

    /// Attach to the database; a no-op when already connected
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if the database or user name is empty
    /// - `Driver` if the attach or the version query fails
    /// - `UnsupportedServer` if the ODS version is below 10 or the dialect is not 1/3
    /// - `IncompatibleClient` if the local client library is too old
    ///
    /// The handle is always disconnected after a failure.
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// Roll back started transactions and detach every dependent resource
    ///
    /// The native attachment stays open. Teardown continues past a failing rollback or
    /// event cancel; the first such error is returned at the end.
    pub fn inactivate(&self) -> Result<()> {
        self.inner.inactivate()
    }

    /// Inactivate and detach; a no-op when already disconnected
    ///
    /// The handle is cleared before the driver result is inspected, so the connection is
    /// disconnected even when this returns an error.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.disconnect()
    }

    /// Inactivate and delete the database on the server
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if not connected
    /// - `Driver` if the server refuses; the connection then stays attached
    pub fn drop_database(&self) -> Result<()> {
        self.inner.drop_database()
    }

    /// Physical facts about the database
    pub fn info(&self) -> Result<DatabaseInfo> {
        let result = self.inner.database_info(
            "Database::Info",
            &DatabaseInfo::ITEMS,
            DatabaseInfo::BUFFER_SIZE,
        )?;
        Ok(DatabaseInfo::parse(&result))
    }

    /// Page I/O statistics of this attachment
    pub fn statistics(&self) -> Result<DatabaseStatistics> {
        let result = self.inner.database_info(
            "Database::Statistics",
            &DatabaseStatistics::ITEMS,
            DatabaseStatistics::BUFFER_SIZE,
        )?;
        Ok(DatabaseStatistics::parse(&result))
    }

    /// Row operation counts summed across tables
    pub fn counts(&self) -> Result<DatabaseCounts> {
        let result = self.inner.database_info(
            "Database::Counts",
            &DatabaseCounts::ITEMS,
            DatabaseCounts::BUFFER_SIZE,
        )?;
        Ok(DatabaseCounts::parse(&result))
    }

    /// Names of the users currently attached to the database
    pub fn users(&self) -> Result<Vec<String>> {
        let result = self.inner.database_info(
            "Database::Users",
            &[INFO_USER_NAMES, INFO_END],
            USERS_INFO_SIZE,
        )?;
        Ok(result.user_names())
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.raw_handle().is_null()
    }

    /// Native attachment handle; null when disconnected
    pub fn raw_handle(&self) -> RawHandle {
        self.inner.raw_handle()
    }

    /// SQL dialect negotiated by the last successful connect
    pub fn dialect(&self) -> Dialect {
        self.inner.state.lock().dialect
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn server_name(&self) -> &str {
        &self.inner.config.server
    }

    pub fn database_name(&self) -> &str {
        &self.inner.config.database
    }

    pub fn user_name(&self) -> &str {
        &self.inner.config.user
    }

    pub fn role_name(&self) -> &str {
        &self.inner.config.role
    }

    pub fn charset(&self) -> &str {
        &self.inner.config.charset
    }

    /// Another handle to the same connection
    pub fn add_ref(&self) -> Database {
        self.clone()
    }

    /// Give up this handle; the last release tears the connection down
    ///
    /// Never fails: errors from the implicit disconnect are logged and discarded.
    pub fn release(self) {
        drop(self)
    }

    /// Number of live handles to this connection
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Number of attached dependents of `kind`
    pub fn dependent_count(&self, kind: ResourceKind) -> usize {
        self.inner.dependent_count(kind)
    }

    pub fn transaction_count(&self) -> usize {
        self.dependent_count(ResourceKind::Transaction)
    }

    pub fn statement_count(&self) -> usize {
        self.dependent_count(ResourceKind::Statement)
    }

    pub fn blob_count(&self) -> usize {
        self.dependent_count(ResourceKind::Blob)
    }

    pub fn array_count(&self) -> usize {
        self.dependent_count(ResourceKind::Array)
    }

    pub fn events_count(&self) -> usize {
        self.dependent_count(ResourceKind::Events)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("server", &self.inner.config.server)
            .field("database", &self.inner.config.database)
            .field("handle", &self.inner.raw_handle())
            .finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use crate::core::info::{InfoBuilder, INFO_INSERT_COUNT, INFO_READ_SEQ_COUNT};
    use crate::core::{Array, Blob, Events, Statement, Transaction};

    const PATH: &str = "/data/test.fdb";

    fn setup() -> (Arc<MemoryDriver>, Database) {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_database(PATH);
        let db = Database::new(
            driver.clone(),
            ConnectionConfig::new(PATH).user("SYSDBA").password("masterkey"),
        );
        (driver, db)
    }

    #[test]
    fn test_connect_negotiates_dialect() {
        let (driver, db) = setup();
        driver.set_dialect(1);
        assert!(!db.is_connected());

        db.connect().unwrap();
        assert!(db.is_connected());
        assert!(!db.raw_handle().is_null());
        assert_eq!(db.dialect(), Dialect::V1);
    }

    #[test]
    fn test_connect_twice_is_noop() {
        let (driver, db) = setup();
        db.connect().unwrap();
        let handle = db.raw_handle();

        db.connect().unwrap();
        assert_eq!(db.raw_handle(), handle);
        assert_eq!(driver.call_count(calls::ATTACH_DATABASE), 1);
        assert_eq!(driver.call_count(calls::DATABASE_INFO), 1);
    }

    #[test]
    fn test_connect_requires_identity() {
        let driver = Arc::new(MemoryDriver::new());
        let db = Database::new(driver.clone(), ConnectionConfig::new(PATH));
        assert!(matches!(
            db.connect(),
            Err(DatabaseError::InvalidUsage { .. })
        ));
        assert_eq!(driver.call_count(calls::ATTACH_DATABASE), 0);
    }

    #[test]
    fn test_connect_attach_failure() {
        let (driver, db) = setup();
        driver.fail_on(calls::ATTACH_DATABASE);

        let err = db.connect().unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Driver { call: calls::ATTACH_DATABASE, .. }
        ));
        assert!(!db.is_connected());
        assert_eq!(driver.open_attachments(), 0);
    }

    #[test]
    fn test_connect_rejects_old_ods() {
        let (driver, db) = setup();
        driver.set_ods_version(9, 1);

        let err = db.connect().unwrap_err();
        assert!(matches!(err, DatabaseError::UnsupportedServer { .. }));
        assert!(err.to_string().contains("wrong ODS version (9)"));
        assert_eq!(db.raw_handle(), RawHandle::NULL);
        assert_eq!(driver.open_attachments(), 0);
    }

    #[test]
    fn test_connect_rejects_bad_dialect() {
        let (driver, db) = setup();
        driver.set_dialect(2);

        let err = db.connect().unwrap_err();
        assert!(matches!(err, DatabaseError::UnsupportedServer { .. }));
        assert!(!db.is_connected());
        assert_eq!(driver.call_count(calls::DETACH_DATABASE), 1);
        assert_eq!(driver.open_attachments(), 0);
    }

    #[test]
    fn test_connect_rejects_old_client() {
        let (driver, db) = setup();
        driver.set_client_version(50);

        let err = db.connect().unwrap_err();
        assert!(matches!(err, DatabaseError::IncompatibleClient { .. }));
        assert!(!db.is_connected());
        assert_eq!(driver.open_attachments(), 0);
    }

    #[test]
    fn test_connect_info_failure_detaches() {
        let (driver, db) = setup();
        driver.fail_on(calls::DATABASE_INFO);

        let err = db.connect().unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Driver { call: calls::DATABASE_INFO, .. }
        ));
        assert!(!db.is_connected());
        assert_eq!(driver.open_attachments(), 0);
    }

    #[test]
    fn test_create_then_connect() {
        let driver = Arc::new(MemoryDriver::new());
        let db = Database::new(
            driver.clone(),
            ConnectionConfig::new("/data/new.fdb").user("SYSDBA"),
        );

        db.create(3).unwrap();
        assert!(!db.is_connected());
        assert!(driver.database_exists("/data/new.fdb"));
        assert_eq!(driver.open_attachments(), 0);

        db.connect().unwrap();
        assert!(db.is_connected());
    }

    #[test]
    fn test_create_preconditions() {
        let (_driver, db) = setup();
        assert!(matches!(
            db.create(2),
            Err(DatabaseError::InvalidUsage { .. })
        ));

        db.connect().unwrap();
        let err = db.create(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Database::Create: Database is already connected."
        );
    }

    #[test]
    fn test_create_driver_failure() {
        let driver = Arc::new(MemoryDriver::new());
        driver.fail_on(calls::EXECUTE_IMMEDIATE);
        let db = Database::new(driver.clone(), ConnectionConfig::new("x.fdb").user("u"));

        assert!(matches!(db.create(1), Err(DatabaseError::Driver { .. })));
        assert!(!db.is_connected());
        assert!(!driver.database_exists("x.fdb"));
    }

    #[test]
    fn test_disconnect_is_idempotent_after_failure() {
        let (driver, db) = setup();
        db.connect().unwrap();
        driver.fail_on(calls::DETACH_DATABASE);

        let err = db.disconnect().unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Driver { call: calls::DETACH_DATABASE, .. }
        ));
        assert!(!db.is_connected());

        db.disconnect().unwrap();
        assert_eq!(driver.call_count(calls::DETACH_DATABASE), 1);
    }

    #[test]
    fn test_drop_database() {
        let (driver, db) = setup();
        assert!(matches!(
            db.drop_database(),
            Err(DatabaseError::InvalidUsage { .. })
        ));

        db.connect().unwrap();
        let tr = Transaction::new(&db).unwrap();
        tr.start().unwrap();

        db.drop_database().unwrap();
        assert!(!db.is_connected());
        assert!(!driver.database_exists(PATH));
        assert!(!tr.is_attached());
        assert_eq!(driver.call_count(calls::ROLLBACK_TRANSACTION), 1);
    }

    #[test]
    fn test_drop_database_failure_keeps_attachment() {
        let (driver, db) = setup();
        db.connect().unwrap();
        driver.fail_on(calls::DROP_DATABASE);

        assert!(matches!(db.drop_database(), Err(DatabaseError::Driver { .. })));
        assert!(db.is_connected());
        assert!(driver.database_exists(PATH));
    }

    #[test]
    fn test_inactivate_order_and_rollback() {
        let (driver, db) = setup();
        db.connect().unwrap();

        let started = Transaction::new(&db).unwrap();
        started.start().unwrap();
        let idle = Transaction::new(&db).unwrap();
        let blob = Blob::new(&db, &started).unwrap();
        blob.create().unwrap();
        let statement = Statement::new(&db).unwrap();
        statement.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();
        let events = Events::new(&db).unwrap();
        events.add("ORDER_PLACED").unwrap();
        events.queue().unwrap();

        db.inactivate().unwrap();

        assert!(db.is_connected());
        assert_eq!(db.transaction_count(), 0);
        assert_eq!(db.statement_count(), 0);
        assert_eq!(db.blob_count(), 0);
        assert_eq!(db.events_count(), 0);
        assert_eq!(driver.call_count(calls::ROLLBACK_TRANSACTION), 1);
        assert_eq!(driver.call_count(calls::CANCEL_BLOB), 1);
        assert_eq!(driver.call_count(calls::FREE_STATEMENT), 1);
        assert_eq!(driver.call_count(calls::CANCEL_EVENTS), 1);
        assert!(!started.is_started());
        assert!(!idle.is_attached());
        assert!(!blob.is_attached());
        assert!(!statement.is_attached());
        assert!(events.names().is_empty());
    }

    #[test]
    fn test_teardown_order() {
        assert_eq!(
            TEARDOWN_ORDER,
            [
                ResourceKind::Blob,
                ResourceKind::Array,
                ResourceKind::Statement,
                ResourceKind::Transaction,
                ResourceKind::Events,
            ]
        );

        let (driver, db) = setup();
        db.connect().unwrap();
        let tr = Transaction::new(&db).unwrap();
        tr.start().unwrap();
        let events = Events::new(&db).unwrap();
        events.add("ORDER_PLACED").unwrap();
        events.queue().unwrap();
        // Registered in the reverse of teardown order.
        let statement = Statement::new(&db).unwrap();
        statement.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();
        let blob = Blob::new(&db, &tr).unwrap();
        blob.create().unwrap();

        let before = driver.call_sequence().len();
        db.inactivate().unwrap();
        assert_eq!(
            driver.call_sequence()[before..],
            [
                calls::ROLLBACK_TRANSACTION,
                calls::CANCEL_EVENTS,
                calls::CANCEL_BLOB,
                calls::FREE_STATEMENT,
            ]
        );

        let before = driver.call_sequence().len();
        db.disconnect().unwrap();
        assert_eq!(driver.call_sequence()[before..], [calls::DETACH_DATABASE]);
    }

    #[test]
    fn test_release_while_disconnected_clears_back_refs() {
        let (driver, db) = setup();
        let tr = Transaction::new(&db).unwrap();
        let statement = Statement::new(&db).unwrap();
        let blob = Blob::new(&db, &tr).unwrap();
        let array = Array::new(&db, &tr).unwrap();
        let events = Events::new(&db).unwrap();

        drop(db);
        assert!(!tr.is_attached());
        assert!(!statement.is_attached());
        assert!(!blob.is_attached());
        assert!(!array.is_attached());
        assert!(!events.is_attached());
        assert!(driver.call_sequence().is_empty());
    }

    #[test]
    fn test_inactivate_when_disconnected_is_noop() {
        let (_driver, db) = setup();
        db.inactivate().unwrap();
        let _tr = Transaction::new(&db).unwrap();
        db.inactivate().unwrap();
        assert_eq!(db.transaction_count(), 1);
    }

    #[test]
    fn test_disconnect_continues_after_rollback_failure() {
        let (driver, db) = setup();
        db.connect().unwrap();
        let tr = Transaction::new(&db).unwrap();
        tr.start().unwrap();
        driver.fail_on(calls::ROLLBACK_TRANSACTION);

        let err = db.disconnect().unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Driver { call: calls::ROLLBACK_TRANSACTION, .. }
        ));
        assert!(!db.is_connected());
        assert!(!tr.is_attached());
        assert_eq!(db.transaction_count(), 0);
    }

    #[test]
    fn test_info_requires_connection() {
        let (_driver, db) = setup();
        for err in [
            db.info().unwrap_err(),
            db.statistics().unwrap_err(),
            db.counts().unwrap_err(),
            db.users().unwrap_err(),
        ] {
            assert!(matches!(err, DatabaseError::InvalidUsage { .. }));
            assert!(err.to_string().ends_with("Database is not connected."));
        }
    }

    #[test]
    fn test_info_statistics_counts_users() {
        let (driver, db) = setup();
        driver.set_ods_version(11, 2);
        driver.set_users(vec!["SYSDBA".into(), "".into(), "APP".into()]);
        driver.set_statistics(DatabaseStatistics {
            fetches: 100,
            marks: 5,
            reads: 40,
            writes: 2,
        });
        driver.set_table_counts(
            128,
            DatabaseCounts {
                inserts: 3,
                updates: 1,
                deletes: 0,
                indexed_reads: 7,
                sequential_reads: 9,
            },
        );
        driver.set_table_counts(
            131,
            DatabaseCounts {
                inserts: 2,
                updates: 0,
                deletes: 4,
                indexed_reads: 1,
                sequential_reads: 0,
            },
        );
        db.connect().unwrap();

        let info = db.info().unwrap();
        assert_eq!(info.ods_major, 11);
        assert_eq!(info.ods_minor, 2);
        assert_eq!(info.page_size, 8192);
        assert!(info.sync_writes);
        assert!(info.reserve);
        assert!(!info.read_only);

        let stats = db.statistics().unwrap();
        assert_eq!(stats.fetches, 100);
        assert_eq!(stats.writes, 2);

        let counts = db.counts().unwrap();
        assert_eq!(counts.inserts, 5);
        assert_eq!(counts.deletes, 4);
        assert_eq!(counts.indexed_reads, 8);
        assert_eq!(counts.sequential_reads, 9);

        assert_eq!(db.users().unwrap(), vec!["SYSDBA", "APP"]);
    }

    #[test]
    fn test_counts_parse_directly() {
        let bytes = InfoBuilder::new()
            .counts(INFO_INSERT_COUNT, &[(1, 2), (2, 3)])
            .counts(INFO_READ_SEQ_COUNT, &[(1, 10)])
            .end()
            .into_bytes();
        let counts = DatabaseCounts::parse(&ResultBuffer::from_bytes(bytes));
        assert_eq!(counts.inserts, 5);
        assert_eq!(counts.sequential_reads, 10);
        assert_eq!(counts.updates, 0);
    }

    #[test]
    fn test_attach_rejects_null_resources() {
        let (_driver, db) = setup();
        let err = db
            .inner
            .attach_transaction(ResourceId::next(), Weak::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Database::AttachTransaction: Can't attach a null transaction object."
        );

        let err = db.inner.detach_blob(ResourceId::NULL).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidUsage { .. }));
    }

    #[test]
    fn test_detach_unknown_resource_is_reported() {
        let (_driver, db) = setup();
        let statement = Statement::new(&db).unwrap();
        let err = db.inner.detach_statement(ResourceId::next()).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidUsage { .. }));
        assert_eq!(db.statement_count(), 1);
        drop(statement);
        assert_eq!(db.statement_count(), 0);
    }

    #[test]
    fn test_final_release_disconnects() {
        let (driver, db) = setup();
        db.connect().unwrap();
        let tr = Transaction::new(&db).unwrap();
        tr.start().unwrap();

        let other = db.add_ref();
        assert_eq!(db.ref_count(), 2);
        db.release();
        assert_eq!(driver.open_attachments(), 1);

        other.release();
        assert_eq!(driver.open_attachments(), 0);
        assert!(!tr.is_attached());
        assert!(!tr.is_started());
    }

    #[test]
    fn test_final_release_swallows_errors() {
        let (driver, db) = setup();
        db.connect().unwrap();
        driver.fail_on(calls::DETACH_DATABASE);
        db.release();
        assert_eq!(driver.call_count(calls::DETACH_DATABASE), 1);
    }
}
