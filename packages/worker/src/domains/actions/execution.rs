//! The action execution state machine.
//!
//! `Resolved -> Validated -> Invoked -> Completed`. Every request reaches
//! `Completed`: failures before invocation and errors raised by handlers
//! both become an error envelope that is posted like any other result.
//! Only a failure to post escapes, as [`WorkerError::NoExecuteEvent`].

use tracing::{debug, info, info_span, warn, Instrument};

use super::context::ActionContext;
use super::library::RegisteredAction;
use super::models::{ActionDefinition, ActionRequest, ActionRequestDraft, ActionResult, LogContext};
use crate::common::{Contract, RequestId, Session};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::schema::SchemaFilter;
use crate::kernel::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Resolved,
    Validated,
    Invoked,
    Completed,
}

/// Action definition, input and actor all exist.
struct Resolved {
    definition: ActionDefinition,
    card: Contract,
}

/// Input and arguments satisfy their schemas and a handler is registered.
struct Validated {
    card: Contract,
    handler: RegisteredAction,
}

impl Worker {
    /// Executes `request` and posts its result.
    ///
    /// # Errors
    ///
    /// [`WorkerError::NoExecuteEvent`] if the result cannot be posted.
    /// Every other failure is returned inside the envelope.
    pub async fn execute(
        &self,
        session: &Session,
        request: ActionRequest,
    ) -> Result<ActionResult, WorkerError> {
        let span = info_span!(
            "execute",
            log_context = %request.log_context.id,
            request_id = %request.id,
            action = %request.action,
        );

        async move {
            let result = match self.prepare(session, &request).await {
                Ok(validated) => self.invoke(validated, &request).await,
                Err(e) => {
                    let error = SerializedError::from(&e);
                    log_failure("Action request rejected", &error);
                    ActionResult::failure(&error)
                }
            };

            self.complete(&request, result).await
        }
        .instrument(span)
        .await
    }

    async fn prepare(
        &self,
        session: &Session,
        request: &ActionRequest,
    ) -> Result<Validated, WorkerError> {
        let resolved = self.resolve(session, request).await?;
        debug!(stage = ?ExecutionStage::Resolved, card = %resolved.card.id);
        let validated = self.validate(resolved, request)?;
        debug!(stage = ?ExecutionStage::Validated);
        Ok(validated)
    }

    async fn resolve(&self, session: &Session, request: &ActionRequest) -> Result<Resolved, WorkerError> {
        let store = &self.deps().store;

        let action_ref = request.action_ref()?;
        let action = store
            .get_by_slug(session, &action_ref)
            .await
            .map_err(WorkerError::from_anyhow)?
            .ok_or_else(|| WorkerError::invalid_action(&request.action, "no such action"))?;

        let (card, actor) = tokio::join!(
            store.get_by_id(session, request.card),
            store.get_by_id(session, request.actor),
        );
        let card = card
            .map_err(WorkerError::from_anyhow)?
            .ok_or_else(|| WorkerError::no_element("input", request.card))?;
        actor
            .map_err(WorkerError::from_anyhow)?
            .ok_or_else(|| WorkerError::no_element("actor", request.actor))?;

        Ok(Resolved {
            definition: ActionDefinition::from_contract(&action),
            card,
        })
    }

    fn validate(&self, resolved: Resolved, request: &ActionRequest) -> Result<Validated, WorkerError> {
        let Resolved { definition, card } = resolved;

        let input = card.to_value();
        let filter = SchemaFilter::compile(&definition.filter)?;
        if !filter.is_match(&input) {
            let errors = filter.errors(&input);
            warn!(card = %card.id, errors = ?errors, "Input does not match the action filter");
            return Err(WorkerError::SchemaMismatch {
                subject: "input".to_string(),
                errors,
            });
        }

        let arguments = SchemaFilter::compile(&definition.arguments_schema())?;
        if !arguments.is_match(&request.arguments) {
            let errors = arguments.errors(&request.arguments);
            warn!(errors = ?errors, "Arguments do not match the action schema");
            return Err(WorkerError::SchemaMismatch {
                subject: "arguments".to_string(),
                errors,
            });
        }

        let handler = self
            .plugins()
            .action(&definition.slug)
            .cloned()
            .ok_or_else(|| WorkerError::invalid_action(&request.action, "no handler is registered"))?;

        Ok(Validated { card, handler })
    }

    async fn invoke(&self, validated: Validated, request: &ActionRequest) -> ActionResult {
        let context = ActionContext::new(self.clone(), self.session().clone(), request);
        debug!(stage = ?ExecutionStage::Invoked);

        match validated
            .handler
            .invoke(context, validated.card, request.clone())
            .await
        {
            Ok(data) => {
                info!("Action succeeded");
                ActionResult::success(data)
            }
            Err(e) => {
                let error = SerializedError::from_anyhow(&e);
                log_failure("Action failed", &error);
                ActionResult::failure(&error)
            }
        }
    }

    async fn complete(
        &self,
        request: &ActionRequest,
        result: ActionResult,
    ) -> Result<ActionResult, WorkerError> {
        self.deps()
            .queue
            .post_result(self.id(), &request.log_context, request, &result)
            .await
            .map_err(|source| WorkerError::NoExecuteEvent {
                request: request.id,
                source,
            })?;

        debug!(stage = ?ExecutionStage::Completed, error = result.error);
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Queue
    // -------------------------------------------------------------------------

    pub async fn enqueue(
        &self,
        session: &Session,
        request: ActionRequestDraft,
    ) -> Result<ActionRequest, WorkerError> {
        self.deps()
            .queue
            .enqueue(self.id(), session, request)
            .await
            .map_err(WorkerError::from_anyhow)
    }

    pub async fn wait_result(
        &self,
        log_context: &LogContext,
        request: RequestId,
    ) -> Result<ActionResult, WorkerError> {
        self.deps()
            .queue
            .wait_result(log_context, request)
            .await
            .map_err(WorkerError::from_anyhow)
    }

    /// Dequeues and executes one request. `Ok(None)` when the queue is
    /// empty.
    pub async fn process_next(&self, session: &Session) -> Result<Option<ActionResult>, WorkerError> {
        let Some(request) = self
            .deps()
            .queue
            .dequeue(self.id())
            .await
            .map_err(WorkerError::from_anyhow)?
        else {
            return Ok(None);
        };

        self.execute(session, request).await.map(Some)
    }
}
