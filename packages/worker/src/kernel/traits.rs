// Trait definitions for the worker's collaborators
//
// These are INFRASTRUCTURE traits only. The orchestration logic (commit
// pipeline, trigger matching, execution) lives in the domains and talks to
// the outside world exclusively through these.
//
// Naming convention: Base* for trait names (e.g., BaseStore, BaseQueue)

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::common::{Contract, ContractDraft, ContractId, PatchOp, RequestId, Session, VersionedSlug};
use crate::domains::actions::models::{
    ActionRequest, ActionRequestDraft, ActionResult, ExecutionEvent, LogContext,
};
use crate::domains::transformers::Transformer;
use crate::domains::triggers::TriggerDefinition;

// =============================================================================
// Store Trait (Infrastructure - versioned contract storage)
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<usize>,
}

#[async_trait]
pub trait BaseStore: Send + Sync {
    /// Insert a new contract. `schema` is the type schema the store
    /// validates against.
    async fn insert(
        &self,
        session: &Session,
        schema: &Value,
        draft: ContractDraft,
    ) -> Result<Option<Contract>>;

    /// Apply JSON-patch operations to an existing contract.
    async fn patch(
        &self,
        session: &Session,
        schema: &Value,
        contract: &Contract,
        patch: &[PatchOp],
    ) -> Result<Option<Contract>>;

    /// Upsert by `slug@version`. Returns `None` when nothing changed.
    async fn replace(
        &self,
        session: &Session,
        schema: &Value,
        draft: ContractDraft,
    ) -> Result<Option<Contract>>;

    /// Every contract matching a JSON schema.
    async fn query(
        &self,
        session: &Session,
        schema: &Value,
        options: QueryOptions,
    ) -> Result<Vec<Contract>>;

    async fn get_by_id(&self, session: &Session, id: ContractId) -> Result<Option<Contract>>;

    /// `slug@latest` (or a bare slug) resolves to the highest version.
    async fn get_by_slug(
        &self,
        session: &Session,
        reference: &VersionedSlug,
    ) -> Result<Option<Contract>>;

    /// Timeline events attached to `target`.
    async fn timeline(&self, session: &Session, target: ContractId) -> Result<Vec<Contract>> {
        let schema = json!({
            "type": "object",
            "required": ["data"],
            "properties": {
                "data": {
                    "type": "object",
                    "required": ["target"],
                    "properties": {
                        "target": { "const": target.to_string() }
                    }
                }
            }
        });
        self.query(session, &schema, QueryOptions::default()).await
    }
}

// =============================================================================
// Queue Trait (Infrastructure - action requests and results)
// =============================================================================

#[async_trait]
pub trait BaseQueue: Send + Sync {
    async fn enqueue(
        &self,
        worker_id: &str,
        session: &Session,
        request: ActionRequestDraft,
    ) -> Result<ActionRequest>;

    /// Next pending request, if any.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<ActionRequest>>;

    /// Waits for the result posted for `request`. Callers apply their own
    /// timeouts.
    async fn wait_result(&self, log_context: &LogContext, request: RequestId)
        -> Result<ActionResult>;

    async fn post_result(
        &self,
        worker_id: &str,
        log_context: &LogContext,
        request: &ActionRequest,
        result: &ActionResult,
    ) -> Result<ExecutionEvent>;

    /// Timestamp of the most recent request enqueued with `originator`.
    async fn last_execution(&self, originator: Uuid) -> Result<Option<DateTime<Utc>>>;
}

// =============================================================================
// Formula Evaluator Trait (Infrastructure - derived fields, CPU-bound)
// =============================================================================

pub trait BaseFormulaEvaluator: Send + Sync {
    /// Fills derived fields of `draft` according to `schema`.
    fn evaluate_object(&self, schema: &Value, draft: ContractDraft) -> Result<ContractDraft>;

    /// Extends `patch` with operations for derived fields it affects.
    fn evaluate_patch(
        &self,
        schema: &Value,
        contract: &Contract,
        patch: Vec<PatchOp>,
    ) -> Result<Vec<PatchOp>>;

    /// Triggers implied by aggregate formulas in a type's schema.
    fn type_triggers(&self, type_contract: &Contract) -> Result<Vec<TriggerDefinition>>;

    fn referenced_link_verbs(&self, type_contract: &Contract) -> Vec<String>;

    /// Evaluates an `$eval` expression. `None` means undefined.
    fn evaluate_expression(&self, expression: &str, context: &Value) -> Option<Value> {
        lookup_path(context, expression)
    }
}

/// Resolves a dotted path (`source.data.status`, `items.0`) in `value`.
pub fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

// =============================================================================
// Reaction Traits (Infrastructure - transformers and subscriptions)
// =============================================================================

#[async_trait]
pub trait BaseTransformerEvaluator: Send + Sync {
    /// Runs the matching transformers from `latest` for a mutation.
    async fn evaluate(
        &self,
        latest: &[Arc<Transformer>],
        previous: Option<&Contract>,
        current: &Contract,
    ) -> Result<()>;
}

#[async_trait]
pub trait BaseSubscriptionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
    ) -> Result<()>;
}
