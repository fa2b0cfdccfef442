use std::sync::Arc;

use parking_lot::RwLock;

use super::models::Transformer;
use super::selection::select_latest;
use crate::common::ContractId;
use crate::kernel::registry::IdRegistry;

/// Registered transformers plus the cached latest-per-major selection.
///
/// Every structural change recomputes the selection from scratch:
/// removing the current maximum can expose a shadowed version. Writers hold
/// the selection lock across the change and the recomputation, so a stale
/// snapshot never replaces a newer one.
#[derive(Default)]
pub struct TransformerRegistry {
    inner: IdRegistry<Transformer>,
    latest: RwLock<Vec<Arc<Transformer>>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, transformers: Vec<Transformer>) {
        let mut latest = self.latest.write();
        self.inner.set(transformers);
        *latest = select_latest(&self.inner.list());
    }

    pub fn upsert(&self, transformer: Transformer) {
        let mut latest = self.latest.write();
        self.inner.upsert(transformer);
        *latest = select_latest(&self.inner.list());
    }

    pub fn remove(&self, id: ContractId) -> bool {
        let mut latest = self.latest.write();
        let removed = self.inner.remove(id);
        if removed {
            *latest = select_latest(&self.inner.list());
        }
        removed
    }

    pub fn list(&self) -> Vec<Arc<Transformer>> {
        self.inner.list()
    }

    pub fn latest(&self) -> Vec<Arc<Transformer>> {
        self.latest.read().clone()
    }
}
