//! Driver registry
//!
//! A [`Client`] binds a [`Driver`] to the table of connections created through it. Each
//! connection reports its own destruction through [`ConnectionRegistry`], which tests can
//! replace with their own implementation.

use super::config::ConnectionConfig;
use super::database::{ConnectionId, Database};
use super::driver::Driver;
use super::sql::connection_string;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Notified when the last handle to a connection is released
pub trait ConnectionRegistry: Send + Sync {
    fn connection_released(&self, id: ConnectionId);
}

#[derive(Default)]
struct ConnectionTable {
    live: Mutex<HashMap<ConnectionId, String>>,
}

impl ConnectionRegistry for ConnectionTable {
    fn connection_released(&self, id: ConnectionId) {
        if let Some(path) = self.live.lock().remove(&id) {
            tracing::debug!(connection = %id, %path, "connection released");
        }
    }
}

/// Entry point for creating connections through one driver
#[derive(Clone)]
pub struct Client {
    driver: Arc<dyn Driver>,
    connections: Arc<ConnectionTable>,
}

impl Client {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            connections: Arc::new(ConnectionTable::default()),
        }
    }

    /// Create a disconnected handle tracked by this client
    pub fn database(&self, config: ConnectionConfig) -> Database {
        let path = connection_string(&config.server, &config.database);
        let registry: Arc<dyn ConnectionRegistry> = self.connections.clone();
        let database = Database::with_registry(Arc::clone(&self.driver), registry, config);
        self.connections.live.lock().insert(database.id(), path);
        database
    }

    /// Number of connections with at least one live handle
    pub fn active_connections(&self) -> usize {
        self.connections.live.lock().len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.live.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn client_version(&self) -> i32 {
        self.driver.client_version()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}
