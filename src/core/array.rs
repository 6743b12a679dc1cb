//! Array columns
//!
//! An [`Array`] describes one array column and works inside a transaction of its
//! connection. It owns no native handle.

use super::database::{Database, DatabaseInner};
use super::driver::RawHandle;
use super::error::{DatabaseError, Result};
use super::resource::{BackRef, Dependent, ResourceId};
use super::transaction::{Transaction, TransactionInner};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Maximum length of a relation or column name
const MAX_NAME_LEN: usize = 31;

/// Relation and column an array is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    pub relation: String,
    pub column: String,
}

pub(crate) struct ArrayInner {
    id: ResourceId,
    database: BackRef,
    transaction: Weak<TransactionInner>,
    descriptor: Mutex<Option<ArrayDescriptor>>,
}

impl Dependent for ArrayInner {
    fn connection_detached(&self, _db: RawHandle) {
        self.database.clear();
    }
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        if let Err(err) = self.database.detach(self.id, DatabaseInner::detach_array) {
            tracing::warn!(array = %self.id, error = %err, "detach on drop failed");
        }
    }
}

/// Array column accessor bound to a connection and one of its transactions
#[derive(Clone)]
pub struct Array {
    inner: Arc<ArrayInner>,
}

impl Array {
    pub fn new(database: &Database, transaction: &Transaction) -> Result<Self> {
        let inner = Arc::new(ArrayInner {
            id: ResourceId::next(),
            database: BackRef::new(),
            transaction: Arc::downgrade(&transaction.inner),
            descriptor: Mutex::new(None),
        });
        database
            .inner
            .attach_array(inner.id, Arc::downgrade(&inner))?;
        inner.database.set(&database.inner);
        Ok(Self { inner })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Bind the array to `relation.column`
    ///
    /// # Errors
    ///
    /// Returns `InvalidUsage` if either name is empty or too long, or the array is no
    /// longer attached to its connection or transaction.
    pub fn describe(&self, relation: &str, column: &str) -> Result<()> {
        const CONTEXT: &str = "Array::Describe";
        for name in [relation, column] {
            if name.is_empty() || name.len() > MAX_NAME_LEN {
                return Err(DatabaseError::invalid_usage(
                    CONTEXT,
                    format!("Invalid relation or column name '{}'.", name),
                ));
            }
        }
        if !self.inner.database.is_attached() {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "No Database is attached.",
            ));
        }
        if self.inner.transaction.strong_count() == 0 {
            return Err(DatabaseError::invalid_usage(
                CONTEXT,
                "No Transaction is attached.",
            ));
        }
        *self.inner.descriptor.lock() = Some(ArrayDescriptor {
            relation: relation.to_string(),
            column: column.to_string(),
        });
        Ok(())
    }

    pub fn descriptor(&self) -> Option<ArrayDescriptor> {
        self.inner.descriptor.lock().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.database.is_attached()
    }

    pub fn detach(&self) -> Result<()> {
        self.inner
            .database
            .detach(self.inner.id, DatabaseInner::detach_array)
    }
}
