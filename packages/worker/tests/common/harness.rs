//! Test harness wiring a worker to in-memory collaborators.
//!
//! The store and queue are kept as concrete handles so tests can inspect
//! what the worker wrote and enqueued.

use std::sync::Arc;

use serde_json::{json, Value};
use worker_core::common::{Contract, ContractDraft, ContractId, Session};
use worker_core::domains::actions::{core_plugin, ActionRequestDraft, ActionResult};
use worker_core::domains::commit::CommitOptions;
use worker_core::domains::triggers::{TriggerDefinition, TriggeredAction, TRIGGERED_ACTION_TYPE};
use worker_core::kernel::in_memory::{
    InMemoryQueue, InMemoryStore, NoopSubscriptions, NoopTransformers, PathFormulaEvaluator,
};
use worker_core::kernel::{
    BaseStore, BaseSubscriptionEvaluator, BaseTransformerEvaluator, Plugin, PluginRegistry,
};
use test_context::AsyncTestContext;
use worker_core::{Worker, WorkerConfig, WorkerDeps};

use super::fixtures::test_plugin;

/// Overrides for [`TestHarness::with`].
#[derive(Default)]
pub struct Setup {
    pub plugins: Vec<Plugin>,
    pub transformers: Option<Arc<dyn BaseTransformerEvaluator>>,
    pub subscriptions: Option<Arc<dyn BaseSubscriptionEvaluator>>,
    pub config: Option<WorkerConfig>,
}

pub struct TestHarness {
    pub worker: Worker,
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<InMemoryQueue>,
    pub session: Session,
    /// `card@1.0.0`, supplied by the test plugin.
    pub card_type: Contract,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::with(Setup::default()).await
    }
}

impl TestHarness {
    pub async fn with(setup: Setup) -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let transformers = setup
            .transformers
            .unwrap_or_else(|| Arc::new(NoopTransformers));
        let subscriptions = setup
            .subscriptions
            .unwrap_or_else(|| Arc::new(NoopSubscriptions));
        let deps = WorkerDeps::new(
            store.clone(),
            queue.clone(),
            Arc::new(PathFormulaEvaluator),
            transformers,
            subscriptions,
        );

        let mut plugins = vec![core_plugin(), test_plugin()];
        plugins.extend(setup.plugins);
        let plugins = PluginRegistry::load(plugins).expect("plugins load");

        let bootstrap = Session::new("bootstrap", ContractId::nil());
        plugins
            .bootstrap(store.as_ref(), &bootstrap)
            .await
            .expect("bootstrap plugin contracts");
        let actor = store
            .insert(
                &bootstrap,
                &json!({ "type": "object" }),
                ContractDraft::builder()
                    .slug("user-test")
                    .type_ref("user@1.0.0")
                    .build(),
            )
            .await
            .expect("insert actor")
            .expect("actor stored");
        let session = Session::new("test-session", actor.id);

        let worker = Worker::new(
            deps,
            plugins,
            setup.config.unwrap_or_default(),
            session.clone(),
        );
        let card_type = worker
            .get_type(&session, "card@1.0.0")
            .await
            .expect("card type");

        Self {
            worker,
            store,
            queue,
            session,
            card_type,
        }
    }

    pub fn options(&self) -> CommitOptions {
        CommitOptions::builder().actor(self.session.actor).build()
    }

    pub async fn get_type(&self, type_ref: &str) -> Contract {
        self.worker
            .get_type(&self.session, type_ref)
            .await
            .expect("type exists")
    }

    /// Inserts a `card@1.0.0` through the commit pipeline.
    pub async fn insert_card(&self, slug: &str, data: Value) -> Contract {
        self.worker
            .insert_card(
                &self.session,
                &self.card_type,
                &self.options(),
                ContractDraft::builder()
                    .slug(slug)
                    .type_ref("card@1.0.0")
                    .data(data)
                    .build(),
            )
            .await
            .expect("insert card")
            .expect("card written")
    }

    pub async fn reload(&self, contract: &Contract) -> Contract {
        self.store
            .get_by_id(&self.session, contract.id)
            .await
            .expect("store read")
            .expect("contract exists")
    }

    /// Stores a trigger from its raw definition and registers it.
    pub async fn add_trigger(&self, slug: &str, definition: Value) -> TriggeredAction {
        let definition: TriggerDefinition =
            serde_json::from_value(definition).expect("valid trigger definition");
        let trigger_type = self.get_type(TRIGGERED_ACTION_TYPE).await;
        let schema = trigger_type.schema().cloned().expect("trigger schema");

        let contract = self
            .store
            .insert(&self.session, &schema, TriggeredAction::draft(slug, &definition))
            .await
            .expect("insert trigger")
            .expect("trigger stored");
        let trigger = TriggeredAction::from_contract(&contract).expect("trigger parses");
        self.worker.upsert_trigger(trigger.clone());
        trigger
    }

    /// A request for `action` on `card` by the harness actor.
    pub fn request(&self, action: &str, card: &Contract, arguments: Value) -> ActionRequestDraft {
        ActionRequestDraft::builder()
            .action(action)
            .card(card.id)
            .card_type(card.type_ref.clone())
            .actor(self.session.actor)
            .arguments(arguments)
            .build()
    }

    /// Executes queued requests until the queue is empty.
    pub async fn drain(&self) -> Vec<ActionResult> {
        let mut results = Vec::new();
        while let Some(result) = self
            .worker
            .process_next(&self.session)
            .await
            .expect("result posted")
        {
            results.push(result);
        }
        results
    }

    /// Contracts of one type, oldest first.
    pub fn contracts_of(&self, type_ref: &str) -> Vec<Contract> {
        self.store
            .all()
            .into_iter()
            .filter(|contract| contract.type_ref == type_ref)
            .collect()
    }
}
