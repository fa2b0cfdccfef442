use std::sync::Arc;

use super::models::TriggeredAction;
use crate::common::ContractId;
use crate::kernel::registry::{IdRegistry, Keyed};

impl Keyed for TriggeredAction {
    fn key(&self) -> ContractId {
        self.id
    }
}

/// The worker's view of registered triggers. Freshly derived type
/// triggers land here directly so they apply before the store catches up.
#[derive(Default)]
pub struct TriggerRegistry {
    inner: IdRegistry<TriggeredAction>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, triggers: Vec<TriggeredAction>) {
        self.inner.set(triggers);
    }

    pub fn upsert(&self, trigger: TriggeredAction) {
        self.inner.upsert(trigger);
    }

    pub fn remove(&self, id: ContractId) -> bool {
        self.inner.remove(id)
    }

    pub fn list(&self) -> Vec<Arc<TriggeredAction>> {
        self.inner.list()
    }

    pub fn active(&self) -> Vec<Arc<TriggeredAction>> {
        self.inner
            .list()
            .into_iter()
            .filter(|trigger| trigger.active)
            .collect()
    }

    /// Triggers generated from the type `type_ref` (`slug@version`).
    pub fn for_type(&self, type_ref: &str) -> Vec<Arc<TriggeredAction>> {
        self.inner
            .list()
            .into_iter()
            .filter(|trigger| trigger.definition.type_target.as_deref() == Some(type_ref))
            .collect()
    }
}
