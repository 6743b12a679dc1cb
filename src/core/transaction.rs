//! Transactions
//!
//! A [`Transaction`] is created against a connection, registers itself there and can be
//! started, committed or rolled back. Dropping the last handle of a started transaction
//! rolls it back.

use super::database::{Database, DatabaseInner};
use super::driver::{calls, Driver, RawHandle};
use super::error::{DatabaseError, Result};
use super::resource::{BackRef, Dependent, ResourceId};
use super::status::Status;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) struct TransactionInner {
    id: ResourceId,
    driver: Arc<dyn Driver>,
    database: BackRef,
    handle: Mutex<RawHandle>,
}

impl TransactionInner {
    pub(crate) fn is_started(&self) -> bool {
        !self.handle.lock().is_null()
    }

    pub(crate) fn raw_handle(&self) -> RawHandle {
        *self.handle.lock()
    }

    fn start(&self) -> Result<()> {
        const CONTEXT: &str = "Transaction::Start";
        if self.is_started() {
            return Ok(());
        }
        // Resolve the connection before locking: its teardown takes this lock.
        let database = self.database.get().ok_or_else(|| {
            DatabaseError::invalid_usage(CONTEXT, "No Database is attached.")
        })?;
        let db = database.raw_handle();
        if db.is_null() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "Database is not connected.",
            ));
        }

        let mut handle = self.handle.lock();
        if !handle.is_null() {
            return Ok(());
        }
        let mut status = Status::new();
        self.driver.start_transaction(&mut status, &mut handle, db);
        if status.errors() {
            return Err(DatabaseError::driver(
                CONTEXT,
                calls::START_TRANSACTION,
                &status,
            ));
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        const CONTEXT: &str = "Transaction::Commit";
        let mut handle = self.handle.lock();
        if handle.is_null() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "Transaction is not started.",
            ));
        }
        let mut status = Status::new();
        self.driver.commit_transaction(&mut status, &mut handle);
        if status.errors() {
            return Err(DatabaseError::driver(
                CONTEXT,
                calls::COMMIT_TRANSACTION,
                &status,
            ));
        }
        *handle = RawHandle::NULL;
        Ok(())
    }

    /// Roll back if started; a no-op otherwise
    pub(crate) fn rollback(&self) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_null() {
            return Ok(());
        }
        let mut status = Status::new();
        self.driver.rollback_transaction(&mut status, &mut handle);
        if status.errors() {
            return Err(DatabaseError::driver(
                "Transaction::Rollback",
                calls::ROLLBACK_TRANSACTION,
                &status,
            ));
        }
        *handle = RawHandle::NULL;
        Ok(())
    }
}

impl Dependent for TransactionInner {
    fn connection_detached(&self, _db: RawHandle) {
        // Started transactions were rolled back by the connection; a handle still held
        // here belongs to a failed rollback and dies with the attachment.
        let stale = std::mem::take(&mut *self.handle.lock());
        if !stale.is_null() {
            tracing::warn!(transaction = %self.id, handle = %stale, "forgetting transaction handle");
        }
        self.database.clear();
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        if let Err(err) = self.rollback() {
            tracing::warn!(transaction = %self.id, error = %err, "rollback on drop failed");
        }
        if let Err(err) = self
            .database
            .detach(self.id, DatabaseInner::detach_transaction)
        {
            tracing::warn!(transaction = %self.id, error = %err, "detach on drop failed");
        }
    }
}

/// Transaction bound to one connection
///
/// Clones share the same transaction.
#[derive(Clone)]
pub struct Transaction {
    pub(crate) inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Create a not-started transaction registered with `database`
    pub fn new(database: &Database) -> Result<Self> {
        let inner = Arc::new(TransactionInner {
            id: ResourceId::next(),
            driver: Arc::clone(database.inner.driver()),
            database: BackRef::new(),
            handle: Mutex::new(RawHandle::NULL),
        });
        database
            .inner
            .attach_transaction(inner.id, Arc::downgrade(&inner))?;
        inner.database.set(&database.inner);
        Ok(Self { inner })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Start the transaction; a no-op when already started
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if detached from its database or the database is not connected
    /// - `Driver` if the server refuses to start it
    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    /// Commit the work done in this transaction
    ///
    /// # Errors
    ///
    /// Returns `InvalidUsage` if not started, `Driver` if the commit fails (the
    /// transaction then stays started).
    pub fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    /// Roll back the transaction; a no-op when not started
    pub fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    /// Whether the transaction is still registered with a connection
    pub fn is_attached(&self) -> bool {
        self.inner.database.is_attached()
    }

    /// Roll back if started, then leave the connection
    ///
    /// The transaction is detached even if the rollback fails; the rollback error is
    /// returned.
    pub fn detach(&self) -> Result<()> {
        let rolled_back = self.inner.rollback();
        if let Err(err) = &rolled_back {
            tracing::warn!(transaction = %self.inner.id, error = %err, "rollback before detach failed");
            *self.inner.handle.lock() = RawHandle::NULL;
        }
        self.inner
            .database
            .detach(self.inner.id, DatabaseInner::detach_transaction)?;
        rolled_back
    }
}
