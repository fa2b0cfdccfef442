//! Worker dependencies (using traits for testability)
//!
//! Every collaborator the orchestration core talks to is held behind a
//! `Base*` trait object so tests and the binary can swap implementations.

use std::sync::Arc;

use super::in_memory::{
    InMemoryQueue, InMemoryStore, NoopSubscriptions, NoopTransformers, PathFormulaEvaluator,
};
use super::traits::{
    BaseFormulaEvaluator, BaseQueue, BaseStore, BaseSubscriptionEvaluator,
    BaseTransformerEvaluator,
};

#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn BaseStore>,
    pub queue: Arc<dyn BaseQueue>,
    pub formulas: Arc<dyn BaseFormulaEvaluator>,
    pub transformers: Arc<dyn BaseTransformerEvaluator>,
    pub subscriptions: Arc<dyn BaseSubscriptionEvaluator>,
}

impl WorkerDeps {
    pub fn new(
        store: Arc<dyn BaseStore>,
        queue: Arc<dyn BaseQueue>,
        formulas: Arc<dyn BaseFormulaEvaluator>,
        transformers: Arc<dyn BaseTransformerEvaluator>,
        subscriptions: Arc<dyn BaseSubscriptionEvaluator>,
    ) -> Self {
        Self {
            store,
            queue,
            formulas,
            transformers,
            subscriptions,
        }
    }

    /// Process-local collaborators: in-memory store and queue, dotted-path
    /// formulas, no transformer or subscription reactions.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryQueue::new()),
            Arc::new(PathFormulaEvaluator),
            Arc::new(NoopTransformers),
            Arc::new(NoopSubscriptions),
        )
    }
}
