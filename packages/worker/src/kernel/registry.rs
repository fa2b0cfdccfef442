//! Id-keyed, insertion-ordered in-memory collections.
//!
//! Read-mostly: matching passes take cheap snapshots while the commit
//! pipeline upserts and removes entries.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::ContractId;

/// Anything the registry can key by contract id.
pub trait Keyed {
    fn key(&self) -> ContractId;
}

pub struct IdRegistry<T> {
    entries: RwLock<Vec<Arc<T>>>,
}

impl<T: Keyed> IdRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the whole collection.
    pub fn set(&self, entries: Vec<T>) {
        *self.entries.write() = entries.into_iter().map(Arc::new).collect();
    }

    /// Replaces the entry with the same id in place, or appends.
    pub fn upsert(&self, entry: T) {
        let key = entry.key();
        let entry = Arc::new(entry);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Removes the entry with `id`. Returns whether one was present.
    pub fn remove(&self, id: ContractId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.key() != id);
        entries.len() != before
    }

    /// Snapshot of the current entries, in insertion order.
    pub fn list(&self) -> Vec<Arc<T>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Keyed> Default for IdRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
