//! The worker handle.
//!
//! `Worker` is cheap to clone: every clone shares the same collaborators,
//! registries and plugin index. Domain modules add the commit pipeline,
//! execution and scheduling on top of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::deps::WorkerDeps;
use super::error::WorkerError;
use super::plugins::PluginRegistry;
use crate::common::{Contract, ContractId, Session, VersionedSlug};
use crate::config::WorkerConfig;
use crate::domains::transformers::{Transformer, TransformerRegistry};
use crate::domains::triggers::{TriggerRegistry, TriggeredAction};

/// Best-effort stages of the commit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionStage {
    Transformers,
    Subscriptions,
    Triggers,
    Markers,
    TypeTriggers,
}

impl ReactionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionStage::Transformers => "transformers",
            ReactionStage::Subscriptions => "subscriptions",
            ReactionStage::Triggers => "triggers",
            ReactionStage::Markers => "markers",
            ReactionStage::TypeTriggers => "type_triggers",
        }
    }
}

/// Counts failures swallowed by best-effort stages.
#[derive(Debug, Default)]
pub struct ReactionStats {
    transformers: AtomicU64,
    subscriptions: AtomicU64,
    triggers: AtomicU64,
    markers: AtomicU64,
    type_triggers: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReactionStatsSnapshot {
    pub transformers: u64,
    pub subscriptions: u64,
    pub triggers: u64,
    pub markers: u64,
    pub type_triggers: u64,
}

impl ReactionStats {
    fn counter(&self, stage: ReactionStage) -> &AtomicU64 {
        match stage {
            ReactionStage::Transformers => &self.transformers,
            ReactionStage::Subscriptions => &self.subscriptions,
            ReactionStage::Triggers => &self.triggers,
            ReactionStage::Markers => &self.markers,
            ReactionStage::TypeTriggers => &self.type_triggers,
        }
    }

    pub fn record_failure(&self, stage: ReactionStage) {
        self.counter(stage).fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self, stage: ReactionStage) -> u64 {
        self.counter(stage).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ReactionStatsSnapshot {
        ReactionStatsSnapshot {
            transformers: self.failures(ReactionStage::Transformers),
            subscriptions: self.failures(ReactionStage::Subscriptions),
            triggers: self.failures(ReactionStage::Triggers),
            markers: self.failures(ReactionStage::Markers),
            type_triggers: self.failures(ReactionStage::TypeTriggers),
        }
    }
}

struct WorkerInner {
    deps: WorkerDeps,
    plugins: PluginRegistry,
    config: WorkerConfig,
    session: Session,
    triggers: TriggerRegistry,
    transformers: TransformerRegistry,
    stats: ReactionStats,
}

#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    /// `session` is the privileged session handed to action handlers.
    pub fn new(
        deps: WorkerDeps,
        plugins: PluginRegistry,
        config: WorkerConfig,
        session: Session,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                deps,
                plugins,
                config,
                session,
                triggers: TriggerRegistry::new(),
                transformers: TransformerRegistry::new(),
                stats: ReactionStats::default(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.config.worker_id
    }

    pub fn deps(&self) -> &WorkerDeps {
        &self.inner.deps
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.inner.plugins
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub(crate) fn triggers(&self) -> &TriggerRegistry {
        &self.inner.triggers
    }

    pub(crate) fn stats(&self) -> &ReactionStats {
        &self.inner.stats
    }

    pub fn reaction_stats(&self) -> ReactionStatsSnapshot {
        self.inner.stats.snapshot()
    }

    // -------------------------------------------------------------------------
    // Triggers
    // -------------------------------------------------------------------------

    pub fn set_triggers(&self, triggers: Vec<TriggeredAction>) {
        info!(worker_id = %self.id(), count = triggers.len(), "Setting triggers");
        self.inner.triggers.set(triggers);
    }

    pub fn upsert_trigger(&self, trigger: TriggeredAction) {
        self.inner.triggers.upsert(trigger);
    }

    pub fn remove_trigger(&self, id: ContractId) -> bool {
        self.inner.triggers.remove(id)
    }

    pub fn get_triggers(&self) -> Vec<Arc<TriggeredAction>> {
        self.inner.triggers.list()
    }

    // -------------------------------------------------------------------------
    // Transformers
    // -------------------------------------------------------------------------

    pub fn set_transformers(&self, transformers: Vec<Transformer>) {
        info!(worker_id = %self.id(), count = transformers.len(), "Setting transformers");
        self.inner.transformers.set(transformers);
    }

    pub fn upsert_transformer(&self, transformer: Transformer) {
        self.inner.transformers.upsert(transformer);
    }

    pub fn remove_transformer(&self, id: ContractId) -> bool {
        self.inner.transformers.remove(id)
    }

    pub fn get_transformers(&self) -> Vec<Arc<Transformer>> {
        self.inner.transformers.list()
    }

    pub fn get_latest_transformers(&self) -> Vec<Arc<Transformer>> {
        self.inner.transformers.latest()
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Fetches a type contract by `slug@version`.
    ///
    /// # Errors
    ///
    /// [`WorkerError::NoElement`] if the reference is malformed or unknown.
    pub async fn get_type(&self, session: &Session, type_ref: &str) -> Result<Contract, WorkerError> {
        let reference: VersionedSlug = type_ref
            .parse()
            .map_err(|_| WorkerError::no_element("type", type_ref))?;
        self.inner
            .deps
            .store
            .get_by_slug(session, &reference)
            .await
            .map_err(WorkerError::from_anyhow)?
            .ok_or_else(|| WorkerError::no_element("type", type_ref))
    }
}
