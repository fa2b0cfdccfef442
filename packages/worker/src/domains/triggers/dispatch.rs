//! Turning matched triggers into queued action requests.
//!
//! A triggered request names its target as an id, a `slug@version`, or a
//! list of them. Each identifier is resolved and enqueued on its own; one
//! failing identifier never stops the others.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info_span};
use uuid::Uuid;

use super::models::{TriggeredAction, TriggeredRequest};
use crate::common::{Contract, ContractId, Session, VersionedSlug};
use crate::domains::actions::models::{ActionRequest, ActionRequestDraft, LogContext};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::{ReactionStage, Worker};

impl Worker {
    /// Resolves a trigger target identifier to a contract.
    pub async fn resolve_target(
        &self,
        session: &Session,
        identifier: &str,
    ) -> Result<Contract, WorkerError> {
        let found = match Uuid::parse_str(identifier) {
            Ok(id) => {
                self.deps()
                    .store
                    .get_by_id(session, ContractId::from_uuid(id))
                    .await
            }
            Err(_) => {
                let reference: VersionedSlug = identifier
                    .parse()
                    .map_err(|_| WorkerError::no_element("target", identifier))?;
                self.deps().store.get_by_slug(session, &reference).await
            }
        }
        .map_err(WorkerError::from_anyhow)?;

        found.ok_or_else(|| WorkerError::no_element("target", identifier))
    }

    /// Enqueues one request per resolved target identifier, with bounded
    /// concurrency. Returns what was enqueued; failures are logged and
    /// counted.
    pub(crate) async fn dispatch_triggered(
        &self,
        session: &Session,
        actor: ContractId,
        log_context: &LogContext,
        matched: Vec<(Arc<TriggeredAction>, TriggeredRequest)>,
    ) -> Vec<ActionRequest> {
        let jobs: Vec<(Arc<TriggeredAction>, Arc<TriggeredRequest>, String)> = matched
            .into_iter()
            .flat_map(|(trigger, request)| {
                let request = Arc::new(request);
                request
                    .target_identifiers()
                    .into_iter()
                    .map(move |identifier| (trigger.clone(), request.clone(), identifier))
                    .collect::<Vec<_>>()
            })
            .collect();

        let outcomes: Vec<_> = stream::iter(jobs)
            .map(|(trigger, request, identifier)| async move {
                let outcome = self
                    .enqueue_triggered(
                        session,
                        actor,
                        log_context,
                        &trigger,
                        &request,
                        &identifier,
                    )
                    .await;
                (trigger, identifier, outcome)
            })
            .buffer_unordered(self.config().reaction_concurrency.max(1))
            .collect()
            .await;

        let mut enqueued = Vec::with_capacity(outcomes.len());
        for (trigger, identifier, outcome) in outcomes {
            match outcome {
                Ok(request) => enqueued.push(request),
                Err(e) => {
                    self.stats().record_failure(ReactionStage::Triggers);
                    let _span =
                        info_span!("trigger", trigger_id = %trigger.id, target = %identifier)
                            .entered();
                    log_failure("Failed to enqueue triggered action", &SerializedError::from(&e));
                }
            }
        }
        enqueued
    }

    async fn enqueue_triggered(
        &self,
        session: &Session,
        actor: ContractId,
        log_context: &LogContext,
        trigger: &TriggeredAction,
        request: &TriggeredRequest,
        identifier: &str,
    ) -> Result<ActionRequest, WorkerError> {
        let target = self.resolve_target(session, identifier).await?;

        let draft = ActionRequestDraft {
            action: request.action.clone(),
            card: target.id,
            card_type: target.type_ref.clone(),
            actor,
            originator: Some(request.originator),
            timestamp: request.current_date,
            arguments: request.arguments.clone(),
            log_context: log_context.child(&trigger.slug),
        };

        let enqueued = self
            .deps()
            .queue
            .enqueue(self.id(), session, draft)
            .await
            .map_err(WorkerError::from_anyhow)?;

        debug!(
            trigger_id = %trigger.id,
            request_id = %enqueued.id,
            action = %enqueued.action,
            card = %enqueued.card,
            "Enqueued triggered action"
        );
        Ok(enqueued)
    }
}
