//! Blobs
//!
//! A [`Blob`] works inside a transaction of its connection. An open native blob handle is
//! closed or cancelled exactly once, including when the connection tears it down.

use super::database::{Database, DatabaseInner};
use super::driver::{calls, Driver, RawHandle};
use super::error::{DatabaseError, Result};
use super::resource::{BackRef, Dependent, ResourceId};
use super::status::Status;
use super::transaction::{Transaction, TransactionInner};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) struct BlobInner {
    id: ResourceId,
    driver: Arc<dyn Driver>,
    database: BackRef,
    transaction: Weak<TransactionInner>,
    handle: Mutex<RawHandle>,
    blob_id: Mutex<u64>,
}

impl BlobInner {
    // Connection and transaction handles, both required to be live.
    fn handles(&self, context: &'static str) -> Result<(RawHandle, RawHandle)> {
        let database = self.database.get().ok_or_else(|| {
            DatabaseError::invalid_usage(context, "No Database is attached.")
        })?;
        let db = database.raw_handle();
        if db.is_null() {
            return Err(DatabaseError::invalid_usage(
                context,
                "Database is not connected.",
            ));
        }
        let tr = self
            .transaction
            .upgrade()
            .map(|tr| tr.raw_handle())
            .unwrap_or_default();
        if tr.is_null() {
            return Err(DatabaseError::invalid_usage(
                context,
                "Transaction is not started.",
            ));
        }
        Ok((db, tr))
    }

    fn cancel(&self) -> Result<()> {
        let mut handle = std::mem::take(&mut *self.handle.lock());
        if handle.is_null() {
            return Ok(());
        }
        let mut status = Status::new();
        self.driver.cancel_blob(&mut status, &mut handle);
        if status.errors() {
            return Err(DatabaseError::driver(
                "Blob::Cancel",
                calls::CANCEL_BLOB,
                &status,
            ));
        }
        Ok(())
    }
}

impl Dependent for BlobInner {
    fn connection_detached(&self, _db: RawHandle) {
        if let Err(err) = self.cancel() {
            tracing::warn!(blob = %self.id, error = %err, "cancel during connection teardown");
        }
        self.database.clear();
    }
}

impl Drop for BlobInner {
    fn drop(&mut self) {
        if let Err(err) = self.cancel() {
            tracing::warn!(blob = %self.id, error = %err, "cancel on drop failed");
        }
        if let Err(err) = self.database.detach(self.id, DatabaseInner::detach_blob) {
            tracing::warn!(blob = %self.id, error = %err, "detach on drop failed");
        }
    }
}

/// Large object bound to a connection and one of its transactions
#[derive(Clone)]
pub struct Blob {
    inner: Arc<BlobInner>,
}

impl Blob {
    /// Create a blob registered with `database`, working in `transaction`
    pub fn new(database: &Database, transaction: &Transaction) -> Result<Self> {
        let inner = Arc::new(BlobInner {
            id: ResourceId::next(),
            driver: Arc::clone(database.inner.driver()),
            database: BackRef::new(),
            transaction: Arc::downgrade(&transaction.inner),
            handle: Mutex::new(RawHandle::NULL),
            blob_id: Mutex::new(0),
        });
        database
            .inner
            .attach_blob(inner.id, Arc::downgrade(&inner))?;
        inner.database.set(&database.inner);
        Ok(Self { inner })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Create a new blob on the server and open it for writing
    pub fn create(&self) -> Result<()> {
        const CONTEXT: &str = "Blob::Create";
        let (db, tr) = self.inner.handles(CONTEXT)?;
        let mut handle = self.inner.handle.lock();
        if !handle.is_null() {
            return Err(DatabaseError::invalid_usage(CONTEXT, "Blob already opened."));
        }
        let mut blob_id = 0;
        let mut status = Status::new();
        self.inner
            .driver
            .create_blob(&mut status, db, tr, &mut handle, &mut blob_id);
        if status.errors() {
            return Err(DatabaseError::driver(CONTEXT, calls::CREATE_BLOB, &status));
        }
        *self.inner.blob_id.lock() = blob_id;
        Ok(())
    }

    /// Open an existing blob for reading
    pub fn open(&self, blob_id: u64) -> Result<()> {
        const CONTEXT: &str = "Blob::Open";
        if blob_id == 0 {
            return Err(DatabaseError::invalid_usage(CONTEXT, "Blob Id is null."));
        }
        let (db, tr) = self.inner.handles(CONTEXT)?;
        let mut handle = self.inner.handle.lock();
        if !handle.is_null() {
            return Err(DatabaseError::invalid_usage(CONTEXT, "Blob already opened."));
        }
        let mut status = Status::new();
        self.inner
            .driver
            .open_blob(&mut status, db, tr, &mut handle, blob_id);
        if status.errors() {
            return Err(DatabaseError::driver(CONTEXT, calls::OPEN_BLOB, &status));
        }
        *self.inner.blob_id.lock() = blob_id;
        Ok(())
    }

    /// Close the open blob, keeping what was written
    pub fn close(&self) -> Result<()> {
        const CONTEXT: &str = "Blob::Close";
        let mut handle = std::mem::take(&mut *self.inner.handle.lock());
        if handle.is_null() {
            return Err(DatabaseError::invalid_usage(CONTEXT, "Blob is not opened."));
        }
        let mut status = Status::new();
        self.inner.driver.close_blob(&mut status, &mut handle);
        if status.errors() {
            return Err(DatabaseError::driver(CONTEXT, calls::CLOSE_BLOB, &status));
        }
        Ok(())
    }

    /// Discard the open blob; a no-op when nothing is open
    pub fn cancel(&self) -> Result<()> {
        self.inner.cancel()
    }

    /// Server id of the blob last created or opened; 0 if none
    pub fn blob_id(&self) -> u64 {
        *self.inner.blob_id.lock()
    }

    pub fn is_open(&self) -> bool {
        !self.inner.handle.lock().is_null()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.database.is_attached()
    }

    /// Cancel any open blob and leave the connection
    pub fn detach(&self) -> Result<()> {
        let cancelled = self.inner.cancel();
        self.inner
            .database
            .detach(self.inner.id, DatabaseInner::detach_blob)?;
        cancelled
    }
}
