//! Statements
//!
//! A [`Statement`] owns one native statement handle, allocated on first prepare and freed
//! exactly once: on [`Statement::detach`], on drop, or when its connection is torn down.

use super::database::{Database, DatabaseInner};
use super::driver::{calls, Driver, RawHandle};
use super::error::{DatabaseError, Result};
use super::resource::{BackRef, Dependent, ResourceId};
use super::status::Status;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) struct StatementInner {
    id: ResourceId,
    driver: Arc<dyn Driver>,
    database: BackRef,
    handle: Mutex<RawHandle>,
    sql: Mutex<Option<String>>,
}

impl StatementInner {
    // Taking the handle before the call guarantees it is never freed twice.
    fn free(&self) -> Result<()> {
        let mut handle = std::mem::take(&mut *self.handle.lock());
        self.sql.lock().take();
        if handle.is_null() {
            return Ok(());
        }
        let mut status = Status::new();
        self.driver.free_statement(&mut status, &mut handle);
        if status.errors() {
            return Err(DatabaseError::driver(
                "Statement::Close",
                calls::FREE_STATEMENT,
                &status,
            ));
        }
        Ok(())
    }
}

impl Dependent for StatementInner {
    fn connection_detached(&self, _db: RawHandle) {
        if let Err(err) = self.free() {
            tracing::warn!(statement = %self.id, error = %err, "free during connection teardown");
        }
        self.database.clear();
    }
}

impl Drop for StatementInner {
    fn drop(&mut self) {
        if let Err(err) = self.free() {
            tracing::warn!(statement = %self.id, error = %err, "free on drop failed");
        }
        if let Err(err) = self.database.detach(self.id, DatabaseInner::detach_statement) {
            tracing::warn!(statement = %self.id, error = %err, "detach on drop failed");
        }
    }
}

/// Statement bound to one connection
#[derive(Clone)]
pub struct Statement {
    inner: Arc<StatementInner>,
}

impl Statement {
    /// Create a statement registered with `database`
    pub fn new(database: &Database) -> Result<Self> {
        let inner = Arc::new(StatementInner {
            id: ResourceId::next(),
            driver: Arc::clone(database.inner.driver()),
            database: BackRef::new(),
            handle: Mutex::new(RawHandle::NULL),
            sql: Mutex::new(None),
        });
        database
            .inner
            .attach_statement(inner.id, Arc::downgrade(&inner))?;
        inner.database.set(&database.inner);
        Ok(Self { inner })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Allocate the native handle if needed and remember `sql` as the current text
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if `sql` is blank, the statement is detached or the database is
    ///   not connected
    /// - `Driver` if the handle cannot be allocated
    pub fn prepare(&self, sql: &str) -> Result<()> {
        const CONTEXT: &str = "Statement::Prepare";
        if sql.trim().is_empty() {
            return Err(DatabaseError::invalid_usage(CONTEXT, "Empty SQL statement."));
        }
        let database = self.inner.database.get().ok_or_else(|| {
            DatabaseError::invalid_usage(CONTEXT, "No Database is attached.")
        })?;
        let db = database.raw_handle();
        if db.is_null() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "Database is not connected.",
            ));
        }

        let mut handle = self.inner.handle.lock();
        if handle.is_null() {
            let mut status = Status::new();
            self.inner
                .driver
                .allocate_statement(&mut status, db, &mut handle);
            if status.errors() {
                return Err(DatabaseError::driver(
                    CONTEXT,
                    calls::ALLOCATE_STATEMENT,
                    &status,
                ));
            }
        }
        *self.inner.sql.lock() = Some(sql.to_string());
        Ok(())
    }

    /// Text of the last prepared statement
    pub fn sql(&self) -> Option<String> {
        self.inner.sql.lock().clone()
    }

    /// Whether a native handle is currently allocated
    pub fn is_allocated(&self) -> bool {
        !self.inner.handle.lock().is_null()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.database.is_attached()
    }

    /// Free the native handle and leave the connection
    pub fn detach(&self) -> Result<()> {
        let freed = self.inner.free();
        self.inner
            .database
            .detach(self.inner.id, DatabaseInner::detach_statement)?;
        freed
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use crate::core::ConnectionConfig;

    fn connected() -> (Arc<MemoryDriver>, Database) {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_database("st.fdb");
        let db = Database::new(driver.clone(), ConnectionConfig::new("st.fdb").user("SYSDBA"));
        db.connect().unwrap();
        (driver, db)
    }

    #[test]
    fn test_prepare_allocates_once() {
        let (driver, db) = connected();
        let st = Statement::new(&db).unwrap();
        assert!(!st.is_allocated());

        st.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();
        st.prepare("SELECT 2 FROM RDB$DATABASE").unwrap();
        assert!(st.is_allocated());
        assert_eq!(st.sql().as_deref(), Some("SELECT 2 FROM RDB$DATABASE"));
        assert_eq!(driver.call_count(calls::ALLOCATE_STATEMENT), 1);
        assert_eq!(driver.open_statements(), 1);
    }

    #[test]
    fn test_prepare_rejects_blank_sql() {
        let (_driver, db) = connected();
        let st = Statement::new(&db).unwrap();
        assert!(matches!(st.prepare("  "), Err(DatabaseError::InvalidUsage { .. })));
    }

    #[test]
    fn test_detach_frees_handle_once() {
        let (driver, db) = connected();
        let st = Statement::new(&db).unwrap();
        st.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();

        st.detach().unwrap();
        drop(st);
        assert_eq!(driver.call_count(calls::FREE_STATEMENT), 1);
        assert_eq!(driver.open_statements(), 0);
        assert_eq!(db.statement_count(), 0);
    }

    #[test]
    fn test_disconnect_frees_handle() {
        let (driver, db) = connected();
        let st = Statement::new(&db).unwrap();
        st.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();

        db.disconnect().unwrap();
        assert!(!st.is_attached());
        assert!(!st.is_allocated());
        assert!(st.prepare("SELECT 1 FROM RDB$DATABASE").is_err());
        drop(st);
        assert_eq!(driver.call_count(calls::FREE_STATEMENT), 1);
    }
}
