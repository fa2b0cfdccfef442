//! The bounded context handed to action handlers.
//!
//! Immutable and cheap to clone. Handlers reach the store only through the
//! mediated operations below, so every write they make goes through the
//! commit pipeline and keeps the causal chain of the request that invoked
//! them.

use serde_json::Value;
use uuid::Uuid;

use super::models::{ActionRequest, LogContext};
use crate::common::{Contract, ContractDraft, ContractId, PatchOp, RequestId, Session, VersionedSlug};
use crate::domains::commit::CommitOptions;
use crate::kernel::error::WorkerError;
use crate::kernel::traits::QueryOptions;
use crate::kernel::Worker;

#[derive(Clone)]
pub struct ActionContext {
    worker: Worker,
    session: Session,
    request: RequestId,
    originator: Uuid,
    actor: ContractId,
    log_context: LogContext,
}

impl ActionContext {
    pub fn new(worker: Worker, session: Session, request: &ActionRequest) -> Self {
        Self {
            worker,
            session,
            request: request.id,
            originator: request.chain_originator(),
            actor: request.actor,
            log_context: request.log_context.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Causal root inherited by every commit made through this context.
    pub fn originator(&self) -> Uuid {
        self.originator
    }

    pub fn actor(&self) -> ContractId {
        self.actor
    }

    pub fn log_context(&self) -> &LogContext {
        &self.log_context
    }

    pub fn worker_id(&self) -> &str {
        self.worker.id()
    }

    /// Options for a commit on behalf of this request.
    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions::builder()
            .actor(self.actor)
            .originator(self.originator)
            .log_context(self.log_context.clone())
            .build()
    }

    /// A plugin-supplied contract by slug.
    pub fn plugin_contract(&self, slug: &str) -> Option<&ContractDraft> {
        self.worker.plugins().contract(slug)
    }

    pub async fn get_type(&self, type_ref: &str) -> Result<Contract, WorkerError> {
        self.worker.get_type(&self.session, type_ref).await
    }

    pub async fn get_card_by_id(&self, id: ContractId) -> Result<Option<Contract>, WorkerError> {
        self.worker
            .deps()
            .store
            .get_by_id(&self.session, id)
            .await
            .map_err(WorkerError::from_anyhow)
    }

    pub async fn get_card_by_slug(&self, reference: &str) -> Result<Option<Contract>, WorkerError> {
        let reference: VersionedSlug = reference
            .parse()
            .map_err(|_| WorkerError::no_element("contract", reference))?;
        self.worker
            .deps()
            .store
            .get_by_slug(&self.session, &reference)
            .await
            .map_err(WorkerError::from_anyhow)
    }

    pub async fn query(
        &self,
        schema: &Value,
        options: QueryOptions,
    ) -> Result<Vec<Contract>, WorkerError> {
        self.worker
            .deps()
            .store
            .query(&self.session, schema, options)
            .await
            .map_err(WorkerError::from_anyhow)
    }

    pub async fn insert_card(
        &self,
        type_contract: &Contract,
        options: CommitOptions,
        draft: ContractDraft,
    ) -> Result<Option<Contract>, WorkerError> {
        self.worker
            .insert_card(&self.session, type_contract, &self.chained(options), draft)
            .await
    }

    pub async fn patch_card(
        &self,
        type_contract: &Contract,
        options: CommitOptions,
        card: &Contract,
        patch: Vec<PatchOp>,
    ) -> Result<Option<Contract>, WorkerError> {
        self.worker
            .patch_card(&self.session, type_contract, &self.chained(options), card, patch)
            .await
    }

    pub async fn replace_card(
        &self,
        type_contract: &Contract,
        options: CommitOptions,
        draft: ContractDraft,
    ) -> Result<Option<Contract>, WorkerError> {
        self.worker
            .replace_card(&self.session, type_contract, &self.chained(options), draft)
            .await
    }

    fn chained(&self, mut options: CommitOptions) -> CommitOptions {
        options.originator.get_or_insert(self.originator);
        options
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("request", &self.request)
            .field("originator", &self.originator)
            .field("actor", &self.actor)
            .field("log_context", &self.log_context)
            .finish_non_exhaustive()
    }
}
