//! Event subscriptions
//!
//! [`Events`] collects event names and queues a wait for them on its connection. Clearing
//! cancels a queued wait and forgets the names.

use super::database::{Database, DatabaseInner};
use super::driver::{calls, Driver, RawHandle};
use super::error::{DatabaseError, Result};
use super::resource::{BackRef, Dependent, ResourceId};
use super::status::Status;
use parking_lot::Mutex;
use std::sync::Arc;

/// Longest accepted event name, in bytes
const MAX_EVENT_NAME_LEN: usize = 127;
/// Most names one wait can cover
const MAX_EVENTS: usize = 15;

pub(crate) struct EventsInner {
    id: ResourceId,
    driver: Arc<dyn Driver>,
    database: BackRef,
    names: Mutex<Vec<String>>,
    event_id: Mutex<i32>,
}

impl EventsInner {
    /// Cancel a queued wait on `db` and forget every name
    pub(crate) fn clear_with(&self, db: RawHandle) -> Result<()> {
        self.names.lock().clear();
        let mut event_id = std::mem::take(&mut *self.event_id.lock());
        if event_id == 0 {
            return Ok(());
        }
        let mut status = Status::new();
        self.driver.cancel_events(&mut status, db, &mut event_id);
        if status.errors() {
            return Err(DatabaseError::driver(
                "Events::Clear",
                calls::CANCEL_EVENTS,
                &status,
            ));
        }
        Ok(())
    }

    fn connection_handle(&self) -> RawHandle {
        self.database
            .get()
            .map(|database| database.raw_handle())
            .unwrap_or_default()
    }
}

impl Dependent for EventsInner {
    fn connection_detached(&self, db: RawHandle) {
        if let Err(err) = self.clear_with(db) {
            tracing::warn!(events = %self.id, error = %err, "cancel during connection teardown");
        }
        self.database.clear();
    }
}

impl Drop for EventsInner {
    fn drop(&mut self) {
        let db = self.connection_handle();
        if let Err(err) = self.clear_with(db) {
            tracing::warn!(events = %self.id, error = %err, "cancel on drop failed");
        }
        if let Err(err) = self.database.detach(self.id, DatabaseInner::detach_events) {
            tracing::warn!(events = %self.id, error = %err, "detach on drop failed");
        }
    }
}

/// Event notification subscription bound to one connection
#[derive(Clone)]
pub struct Events {
    inner: Arc<EventsInner>,
}

impl Events {
    pub fn new(database: &Database) -> Result<Self> {
        let inner = Arc::new(EventsInner {
            id: ResourceId::next(),
            driver: Arc::clone(database.inner.driver()),
            database: BackRef::new(),
            names: Mutex::new(Vec::new()),
            event_id: Mutex::new(0),
        });
        database
            .inner
            .attach_events(inner.id, Arc::downgrade(&inner))?;
        inner.database.set(&database.inner);
        Ok(Self { inner })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Register interest in `name`; registering a name twice has no effect
    pub fn add(&self, name: &str) -> Result<()> {
        const CONTEXT: &str = "Events::Add";
        if name.is_empty() || name.len() > MAX_EVENT_NAME_LEN {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                format!("Event name must be 1 to {} bytes long.", MAX_EVENT_NAME_LEN),
            ));
        }
        let mut names = self.inner.names.lock();
        if names.iter().any(|existing| existing == name) {
            return Ok(());
        }
        if names.len() >= MAX_EVENTS {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                format!("Can't register more than {} events.", MAX_EVENTS),
            ));
        }
        names.push(name.to_string());
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names.lock().clone()
    }

    /// Queue a wait for the registered names; a no-op when already queued
    ///
    /// # Errors
    ///
    /// - `InvalidUsage` if no name is registered, the subscription is detached or the
    ///   database is not connected
    /// - `Driver` if the server refuses the wait
    pub fn queue(&self) -> Result<()> {
        const CONTEXT: &str = "Events::Queue";
        let names = self.names();
        if names.is_empty() {
            return Err(DatabaseError::invalid_usage(CONTEXT, "No event registered."));
        }
        if !self.inner.database.is_attached() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "No Database is attached.",
            ));
        }
        let db = self.inner.connection_handle();
        if db.is_null() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "Database is not connected.",
            ));
        }

        let mut event_id = self.inner.event_id.lock();
        if *event_id != 0 {
            return Ok(());
        }
        let mut status = Status::new();
        self.inner
            .driver
            .queue_events(&mut status, db, &mut event_id, &names);
        if status.errors() {
            return Err(DatabaseError::driver(CONTEXT, calls::QUEUE_EVENTS, &status));
        }
        Ok(())
    }

    pub fn is_queued(&self) -> bool {
        *self.inner.event_id.lock() != 0
    }

    /// Cancel a queued wait and forget every registered name
    pub fn clear(&self) -> Result<()> {
        let db = self.inner.connection_handle();
        self.inner.clear_with(db)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.database.is_attached()
    }

    /// Clear, then leave the connection
    pub fn detach(&self) -> Result<()> {
        let cleared = self.clear();
        self.inner
            .database
            .detach(self.inner.id, DatabaseInner::detach_events)?;
        cleared
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use crate::core::ConnectionConfig;

    fn connected() -> (Arc<MemoryDriver>, Database) {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_database("ev.fdb");
        let db = Database::new(driver.clone(), ConnectionConfig::new("ev.fdb").user("SYSDBA"));
        db.connect().unwrap();
        (driver, db)
    }

    #[test]
    fn test_add_validates_names() {
        let (_driver, db) = connected();
        let events = Events::new(&db).unwrap();
        assert!(events.add("").is_err());
        assert!(events.add(&"E".repeat(128)).is_err());

        events.add("A").unwrap();
        events.add("A").unwrap();
        assert_eq!(events.names(), vec!["A"]);

        for i in 1..15 {
            events.add(&format!("E{}", i)).unwrap();
        }
        assert!(matches!(events.add("ONE_TOO_MANY"), Err(DatabaseError::InvalidUsage { .. })));
    }

    #[test]
    fn test_queue_and_clear() {
        let (driver, db) = connected();
        let events = Events::new(&db).unwrap();
        assert!(events.queue().is_err());

        events.add("STOCK_LOW").unwrap();
        events.queue().unwrap();
        events.queue().unwrap();
        assert!(events.is_queued());
        assert_eq!(driver.call_count(calls::QUEUE_EVENTS), 1);
        assert_eq!(driver.queued_events(), 1);

        events.clear().unwrap();
        assert!(!events.is_queued());
        assert!(events.names().is_empty());
        assert_eq!(driver.queued_events(), 0);
    }

    #[test]
    fn test_detach_cancels() {
        let (driver, db) = connected();
        let events = Events::new(&db).unwrap();
        events.add("STOCK_LOW").unwrap();
        events.queue().unwrap();

        events.detach().unwrap();
        assert!(!events.is_attached());
        assert_eq!(db.events_count(), 0);
        assert_eq!(driver.call_count(calls::CANCEL_EVENTS), 1);
    }
}
