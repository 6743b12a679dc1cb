//! Bookkeeping shared by the connection and its dependent resources
//!
//! A connection never owns its dependents: it keeps a [`ResourceList`] of weak entries
//! keyed by [`ResourceId`], and each dependent keeps a [`BackRef`] to the connection.
//! Detaching clears both sides.

use super::database::DatabaseInner;
use super::driver::RawHandle;
use super::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a dependent resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Never assigned to a resource
    pub const NULL: ResourceId = ResourceId(0);

    pub(crate) fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of resources that depend on an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Transaction,
    Statement,
    Blob,
    Array,
    Events,
}

impl ResourceKind {
    pub(crate) fn attach_context(&self) -> &'static str {
        match self {
            ResourceKind::Transaction => "Database::AttachTransaction",
            ResourceKind::Statement => "Database::AttachStatement",
            ResourceKind::Blob => "Database::AttachBlob",
            ResourceKind::Array => "Database::AttachArray",
            ResourceKind::Events => "Database::AttachEvents",
        }
    }

    pub(crate) fn detach_context(&self) -> &'static str {
        match self {
            ResourceKind::Transaction => "Database::DetachTransaction",
            ResourceKind::Statement => "Database::DetachStatement",
            ResourceKind::Blob => "Database::DetachBlob",
            ResourceKind::Array => "Database::DetachArray",
            ResourceKind::Events => "Database::DetachEvents",
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            ResourceKind::Transaction => "transaction",
            ResourceKind::Statement => "statement",
            ResourceKind::Blob => "blob",
            ResourceKind::Array => "array",
            ResourceKind::Events => "events",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// Implemented by every dependent resource
pub(crate) trait Dependent: Send + Sync {
    /// Called by the owning connection after it has removed this resource from its
    /// list: release native handles and clear the back-reference. Must not call back
    /// into the connection.
    fn connection_detached(&self, db: RawHandle);
}

/// Non-owning list of dependents held by a connection
pub(crate) struct ResourceList<T: ?Sized> {
    entries: Vec<(ResourceId, Weak<T>)>,
}

impl<T: ?Sized> ResourceList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn push(&mut self, id: ResourceId, resource: Weak<T>) {
        self.entries.push((id, resource));
    }

    /// Remove the first entry for `id`; false if there is none
    pub(crate) fn remove(&mut self, id: ResourceId) -> bool {
        match self.entries.iter().position(|(entry, _)| *entry == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn pop(&mut self) -> Option<(ResourceId, Weak<T>)> {
        self.entries.pop()
    }

    /// Strong references to the entries still alive
    pub(crate) fn upgrade_all(&self) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter_map(|(_, resource)| resource.upgrade())
            .collect()
    }
}

/// A dependent's nullable reference to its connection
pub(crate) struct BackRef {
    database: Mutex<Option<Weak<DatabaseInner>>>,
}

impl BackRef {
    pub(crate) fn new() -> Self {
        Self {
            database: Mutex::new(None),
        }
    }

    pub(crate) fn set(&self, database: &Arc<DatabaseInner>) {
        *self.database.lock() = Some(Arc::downgrade(database));
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.database.lock().is_some()
    }

    /// The connection, if still attached and alive
    pub(crate) fn get(&self) -> Option<Arc<DatabaseInner>> {
        self.database.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Forget the connection without telling it
    pub(crate) fn clear(&self) {
        self.database.lock().take();
    }

    /// Clear the back-reference, then remove `id` from the connection's list
    pub(crate) fn detach(
        &self,
        id: ResourceId,
        remove: fn(&DatabaseInner, ResourceId) -> Result<()>,
    ) -> Result<()> {
        let database = self.database.lock().take();
        match database.and_then(|weak| weak.upgrade()) {
            Some(database) => remove(&database, id),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(!a.is_null());
        assert!(ResourceId::NULL.is_null());
    }

    #[test]
    fn test_resource_list_remove_and_pop() {
        let first = Arc::new(1u8);
        let second = Arc::new(2u8);
        let (a, b) = (ResourceId::next(), ResourceId::next());

        let mut list: ResourceList<u8> = ResourceList::new();
        list.push(a, Arc::downgrade(&first));
        list.push(b, Arc::downgrade(&second));
        assert_eq!(list.len(), 2);
        assert_eq!(list.upgrade_all().len(), 2);

        assert!(list.remove(a));
        assert!(!list.remove(a));

        let (id, weak) = list.pop().unwrap();
        assert_eq!(id, b);
        assert_eq!(weak.upgrade().as_deref(), Some(&2));
        assert!(list.pop().is_none());
    }

    #[test]
    fn test_upgrade_all_skips_dead_entries() {
        let alive = Arc::new(7u8);
        let mut list: ResourceList<u8> = ResourceList::new();
        list.push(ResourceId::next(), Arc::downgrade(&alive));
        list.push(ResourceId::next(), Weak::new());
        assert_eq!(list.upgrade_all().len(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_back_ref_starts_detached() {
        let back_ref = BackRef::new();
        assert!(!back_ref.is_attached());
        assert!(back_ref.get().is_none());
        back_ref.clear();
        assert!(!back_ref.is_attached());
    }
}
