use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info_span};

use super::options::CommitOptions;
use crate::common::{Contract, RequestId, Session, VersionedSlug};
use crate::domains::actions::context::ActionContext;
use crate::domains::actions::models::{ActionRequestDraft, ActionResult};
use crate::domains::triggers::{match_trigger, TriggeredAction, TriggeredRequest};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::{ReactionStage, Worker};

impl Worker {
    /// Awaits a best-effort reaction, recording and logging its failure
    /// instead of returning it.
    pub(crate) async fn fire_and_log<F>(&self, stage: ReactionStage, contract: &Contract, reaction: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        if let Err(e) = reaction.await {
            self.stats().record_failure(stage);
            let _span = info_span!("reaction", stage = stage.as_str(), contract_id = %contract.id)
                .entered();
            log_failure("Reaction failed", &SerializedError::from_anyhow(&e));
        }
    }

    /// Transformers, then subscriptions.
    pub(crate) async fn evaluate_reactions(
        &self,
        session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
    ) {
        let latest = self.get_latest_transformers();
        self.fire_and_log(
            ReactionStage::Transformers,
            current,
            self.deps().transformers.evaluate(&latest, previous, current),
        )
        .await;

        self.fire_and_log(
            ReactionStage::Subscriptions,
            current,
            self.deps().subscriptions.evaluate(session, previous, current),
        )
        .await;
    }

    /// Matches every active trigger whose start date has passed and
    /// enqueues the resulting requests.
    pub(crate) async fn fire_triggers(
        &self,
        session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
        options: &CommitOptions,
    ) {
        let now = options.timestamp;
        let evaluator = self.deps().formulas.as_ref();

        let matched: Vec<(Arc<TriggeredAction>, TriggeredRequest)> = self
            .triggers()
            .active()
            .into_iter()
            .filter(|trigger| now >= trigger.definition.start_date())
            .filter_map(|trigger| {
                let request = match_trigger(&trigger, previous, current, now, evaluator)?;
                Some((trigger, request))
            })
            .collect();

        if matched.is_empty() {
            return;
        }

        debug!(contract_id = %current.id, matched = matched.len(), "Triggers matched");
        self.dispatch_triggered(session, options.actor, &options.log_context, matched)
            .await;
    }

    /// Runs the change-event handler inline so the event exists before the
    /// commit returns.
    pub(crate) async fn attach_change_event(
        &self,
        session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
        options: &CommitOptions,
    ) -> Result<ActionResult, WorkerError> {
        let action = &self.config().change_event_action;
        let action_ref: VersionedSlug = action
            .parse()
            .map_err(|reason: String| WorkerError::invalid_action(action, reason))?;
        let handler = self
            .plugins()
            .action(&action_ref.slug)
            .cloned()
            .ok_or_else(|| WorkerError::invalid_action(action, "no handler is registered"))?;

        let kind = if previous.is_some() { "update" } else { "create" };
        let request = ActionRequestDraft {
            action: action.clone(),
            card: current.id,
            card_type: current.type_ref.clone(),
            actor: options.actor,
            originator: options.originator,
            timestamp: options.timestamp,
            arguments: json!({
                "type": kind,
                "reason": options.reason,
                "payload": current.data,
            }),
            log_context: options.log_context.child(kind),
        }
        .into_request(RequestId::new());

        let context = ActionContext::new(self.clone(), session.clone(), &request);
        let data = handler
            .invoke(context, current.clone(), request)
            .await
            .map_err(WorkerError::from_anyhow)?;

        debug!(contract_id = %current.id, kind, "Attached change event");
        Ok(ActionResult::success(data))
    }
}
