//! Process-local collaborator implementations.
//!
//! These back the `worker` binary's bundle mode and the integration tests.
//! They honour the collaborator contracts (schema-validated writes, no-op
//! replaces return `None`, results wake waiters) without any persistence.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use super::error::WorkerError;
use super::schema::SchemaFilter;
use super::traits::{
    BaseFormulaEvaluator, BaseQueue, BaseStore, BaseSubscriptionEvaluator,
    BaseTransformerEvaluator, QueryOptions,
};
use crate::common::{
    apply_patch, Contract, ContractDraft, ContractId, PatchOp, RequestId, Session, VersionedSlug,
};
use crate::domains::actions::builtin::SET_ADD_ACTION;
use crate::domains::actions::models::{
    ActionRequest, ActionRequestDraft, ActionResult, ExecutionEvent, LogContext,
};
use crate::domains::transformers::Transformer;
use crate::domains::triggers::{ArgumentTemplate, TriggerDefinition};

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
pub struct InMemoryStore {
    contracts: DashMap<ContractId, Contract>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Every stored contract, oldest first.
    pub fn all(&self) -> Vec<Contract> {
        let mut contracts: Vec<Contract> = self
            .contracts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        contracts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.slug.cmp(&b.slug))
                .then_with(|| a.id.cmp(&b.id))
        });
        contracts
    }

    fn find_exact(&self, slug: &str, version: &str) -> Option<Contract> {
        self.contracts
            .iter()
            .find(|entry| entry.slug == slug && entry.version == version)
            .map(|entry| entry.value().clone())
    }

    fn find_latest(&self, slug: &str) -> Option<Contract> {
        self.contracts
            .iter()
            .filter(|entry| entry.slug == slug)
            .map(|entry| entry.value().clone())
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Links a contract whose `data.target` names a stored contract to it
    /// under [`ATTACHED_TO`]. Any other links are left alone.
    fn link_target(&self, contract: &mut Contract) {
        let Some(target) = contract
            .data
            .get("target")
            .and_then(Value::as_str)
            .and_then(|target| ContractId::parse(target).ok())
        else {
            return;
        };
        let Some(target) = self.contracts.get(&target).map(|entry| entry.value().clone()) else {
            return;
        };

        contract.links.insert(
            ATTACHED_TO.to_string(),
            json!([{ "id": target.id, "slug": target.slug, "type": target.type_ref }]),
        );
        contract
            .linked_at
            .insert(ATTACHED_TO.to_string(), json!(Utc::now()));
    }

    fn validate(schema: &Value, contract: &Contract) -> Result<()> {
        SchemaFilter::compile(schema)?.validate(&contract.versioned_slug(), &contract.to_value())?;
        Ok(())
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[async_trait]
impl BaseStore for InMemoryStore {
    async fn insert(
        &self,
        _session: &Session,
        schema: &Value,
        draft: ContractDraft,
    ) -> Result<Option<Contract>> {
        if self.find_exact(&draft.slug, &draft.version).is_some() {
            return Err(WorkerError::rejected(format!(
                "{} already exists",
                draft.versioned_slug()
            ))
            .into());
        }

        let mut contract = draft.into_contract(ContractId::new(), Utc::now());
        self.link_target(&mut contract);
        Self::validate(schema, &contract)?;
        self.contracts.insert(contract.id, contract.clone());
        Ok(Some(contract))
    }

    async fn patch(
        &self,
        _session: &Session,
        schema: &Value,
        contract: &Contract,
        patch: &[PatchOp],
    ) -> Result<Option<Contract>> {
        let stored = self
            .contracts
            .get(&contract.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WorkerError::no_element("contract", contract.id))?;

        let mut value = stored.to_value();
        apply_patch(&mut value, patch)?;

        let mut patched: Contract = serde_json::from_value(value)
            .with_context(|| format!("patch produced an invalid contract for {}", stored.slug))?;
        patched.id = stored.id;
        patched.created_at = stored.created_at;
        patched.updated_at = Some(Utc::now());
        self.link_target(&mut patched);
        Self::validate(schema, &patched)?;

        self.contracts.insert(patched.id, patched.clone());
        Ok(Some(patched))
    }

    async fn replace(
        &self,
        session: &Session,
        schema: &Value,
        draft: ContractDraft,
    ) -> Result<Option<Contract>> {
        let Some(existing) = self.find_exact(&draft.slug, &draft.version) else {
            return self.insert(session, schema, draft).await;
        };

        let mut replaced = draft.into_contract(existing.id, existing.created_at);
        if replaced.observably_equal(&existing) {
            return Ok(None);
        }

        replaced.updated_at = Some(Utc::now());
        self.link_target(&mut replaced);
        Self::validate(schema, &replaced)?;
        self.contracts.insert(replaced.id, replaced.clone());
        Ok(Some(replaced))
    }

    async fn query(
        &self,
        _session: &Session,
        schema: &Value,
        options: QueryOptions,
    ) -> Result<Vec<Contract>> {
        let filter = SchemaFilter::compile(schema)?;
        let matches = self
            .all()
            .into_iter()
            .filter(|contract| filter.is_match(&contract.to_value()));

        Ok(match options.limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        })
    }

    async fn get_by_id(&self, _session: &Session, id: ContractId) -> Result<Option<Contract>> {
        Ok(self.contracts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_by_slug(
        &self,
        _session: &Session,
        reference: &VersionedSlug,
    ) -> Result<Option<Contract>> {
        Ok(match &reference.version {
            Some(version) => self.find_exact(&reference.slug, version),
            None => self.find_latest(&reference.slug),
        })
    }
}

// =============================================================================
// Queue
// =============================================================================

#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<ActionRequest>>,
    enqueued: Mutex<Vec<ActionRequest>>,
    results: DashMap<RequestId, ActionResult>,
    events: Mutex<Vec<ExecutionEvent>>,
    posted: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request ever enqueued, in order.
    pub fn enqueued(&self) -> Vec<ActionRequest> {
        self.enqueued.lock().clone()
    }

    /// Every posted result event, in order.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl BaseQueue for InMemoryQueue {
    async fn enqueue(
        &self,
        _worker_id: &str,
        _session: &Session,
        request: ActionRequestDraft,
    ) -> Result<ActionRequest> {
        let request = request.into_request(RequestId::new());
        self.enqueued.lock().push(request.clone());
        self.pending.lock().push_back(request.clone());
        Ok(request)
    }

    async fn dequeue(&self, _worker_id: &str) -> Result<Option<ActionRequest>> {
        Ok(self.pending.lock().pop_front())
    }

    async fn wait_result(
        &self,
        _log_context: &LogContext,
        request: RequestId,
    ) -> Result<ActionResult> {
        loop {
            let posted = self.posted.notified();
            if let Some(result) = self.results.get(&request) {
                return Ok(result.value().clone());
            }
            posted.await;
        }
    }

    async fn post_result(
        &self,
        worker_id: &str,
        _log_context: &LogContext,
        request: &ActionRequest,
        result: &ActionResult,
    ) -> Result<ExecutionEvent> {
        let event = ExecutionEvent {
            request: request.id,
            originator: request.originator,
            worker: worker_id.to_string(),
            result: result.clone(),
            timestamp: Utc::now(),
        };

        self.results.insert(request.id, result.clone());
        self.events.lock().push(event.clone());
        self.posted.notify_waiters();
        Ok(event)
    }

    async fn last_execution(&self, originator: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .enqueued
            .lock()
            .iter()
            .filter(|request| request.originator == Some(originator))
            .map(|request| request.timestamp)
            .max())
    }
}

// =============================================================================
// Formula Evaluator
// =============================================================================

const FORMULA_KEY: &str = "$$formula";
const AGGREGATE_PREFIX: &str = "AGGREGATE($events,";
const LINKS_KEY: &str = "$$links";

/// Link verb joining a timeline event to the contract it is about.
pub const ATTACHED_TO: &str = "is attached to";

/// Minimal formula evaluator.
///
/// Expressions are dotted paths into the resolution context. Objects and
/// patches pass through unchanged. A type's data field declared as
/// `{"$$formula": "AGGREGATE($events, \"<path>\")"}` implies one trigger
/// that adds `<path>` of every new timeline event attached to an instance
/// of the type to that field of the instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFormulaEvaluator;

impl PathFormulaEvaluator {
    fn aggregate_path(formula: &str) -> Option<&str> {
        let rest = formula.trim().strip_prefix(AGGREGATE_PREFIX)?;
        let path = rest.strip_suffix(')')?.trim();
        path.strip_prefix('"')
            .and_then(|p| p.strip_suffix('"'))
            .or_else(|| path.strip_prefix('\'').and_then(|p| p.strip_suffix('\'')))
            .filter(|p| !p.is_empty())
    }
}

impl BaseFormulaEvaluator for PathFormulaEvaluator {
    fn evaluate_object(&self, _schema: &Value, draft: ContractDraft) -> Result<ContractDraft> {
        Ok(draft)
    }

    fn evaluate_patch(
        &self,
        _schema: &Value,
        _contract: &Contract,
        patch: Vec<PatchOp>,
    ) -> Result<Vec<PatchOp>> {
        Ok(patch)
    }

    fn type_triggers(&self, type_contract: &Contract) -> Result<Vec<TriggerDefinition>> {
        let Some(properties) = type_contract
            .schema()
            .and_then(|schema| schema.pointer("/properties/data/properties"))
            .and_then(Value::as_object)
        else {
            return Ok(Vec::new());
        };

        let type_ref = type_contract.versioned_slug();
        let mut definitions = Vec::new();
        for (field, property) in properties {
            let Some(formula) = property.get(FORMULA_KEY).and_then(Value::as_str) else {
                continue;
            };
            let Some(path) = Self::aggregate_path(formula) else {
                continue;
            };

            definitions.push(TriggerDefinition {
                filter: Some(json!({
                    "type": "object",
                    "required": ["data", "links"],
                    "properties": {
                        "data": {
                            "type": "object",
                            "required": ["target"],
                            "properties": { "target": { "type": "string" } }
                        },
                        "links": {
                            "type": "object",
                            "required": [ATTACHED_TO],
                            "properties": {
                                ATTACHED_TO: {
                                    "type": "array",
                                    "contains": {
                                        "type": "object",
                                        "required": ["type"],
                                        "properties": { "type": { "const": type_ref } }
                                    }
                                }
                            }
                        }
                    }
                })),
                mode: None,
                action: format!("{}@1.0.0", SET_ADD_ACTION),
                target: ArgumentTemplate::Eval("source.data.target".to_string()),
                type_target: Some(type_ref.clone()),
                arguments: ArgumentTemplate::from(json!({
                    "property": format!("data.{}", field),
                    "value": { "$eval": format!("source.{}", path) }
                })),
                start_date: None,
                interval: None,
            });
        }

        Ok(definitions)
    }

    fn referenced_link_verbs(&self, type_contract: &Contract) -> Vec<String> {
        type_contract
            .schema()
            .and_then(|schema| schema.get(LINKS_KEY))
            .and_then(Value::as_object)
            .map(|links| links.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Reactions
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransformers;

#[async_trait]
impl BaseTransformerEvaluator for NoopTransformers {
    async fn evaluate(
        &self,
        _latest: &[Arc<Transformer>],
        _previous: Option<&Contract>,
        _current: &Contract,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubscriptions;

#[async_trait]
impl BaseSubscriptionEvaluator for NoopSubscriptions {
    async fn evaluate(
        &self,
        _session: &Session,
        _previous: Option<&Contract>,
        _current: &Contract,
    ) -> Result<()> {
        Ok(())
    }
}

/// Fails every call. Useful to check that reactions are best-effort.
#[derive(Debug, Clone, Default)]
pub struct FailingReactions {
    pub message: String,
}

impl FailingReactions {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl BaseTransformerEvaluator for FailingReactions {
    async fn evaluate(
        &self,
        _latest: &[Arc<Transformer>],
        _previous: Option<&Contract>,
        _current: &Contract,
    ) -> Result<()> {
        Err(anyhow!("{}", self.message))
    }
}

#[async_trait]
impl BaseSubscriptionEvaluator for FailingReactions {
    async fn evaluate(
        &self,
        _session: &Session,
        _previous: Option<&Contract>,
        _current: &Contract,
    ) -> Result<()> {
        Err(anyhow!("{}", self.message))
    }
}
