use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info_span};

use super::matcher::materialize_scheduled;
use super::models::{TriggeredAction, TriggeredRequest};
use super::schedule::next_execution;
use crate::common::Session;
use crate::domains::actions::models::{ActionRequest, LogContext};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::{ReactionStage, Worker};

impl Worker {
    /// Fires every recurring trigger that is due at `current_date`.
    ///
    /// A trigger is due once its start date has passed and `current_date`
    /// has reached the next execution computed from the last request it
    /// spawned. Returns the enqueued requests.
    pub async fn tick(&self, session: &Session, current_date: DateTime<Utc>) -> Vec<ActionRequest> {
        let recurring: Vec<Arc<TriggeredAction>> = self
            .triggers()
            .active()
            .into_iter()
            .filter(|trigger| trigger.definition.is_recurring())
            .filter(|trigger| current_date >= trigger.definition.start_date())
            .collect();

        let mut due: Vec<(Arc<TriggeredAction>, TriggeredRequest)> = Vec::new();
        for trigger in recurring {
            match self.due_request(&trigger, current_date).await {
                Ok(Some(request)) => due.push((trigger, request)),
                Ok(None) => {}
                Err(e) => {
                    self.stats().record_failure(ReactionStage::Triggers);
                    let _span = info_span!("tick", trigger_id = %trigger.id).entered();
                    log_failure("Cannot schedule trigger", &SerializedError::from(&e));
                }
            }
        }

        if due.is_empty() {
            return Vec::new();
        }

        debug!(due = due.len(), "Recurring triggers due");
        self.dispatch_triggered(session, session.actor, &LogContext::generate(), due)
            .await
    }

    async fn due_request(
        &self,
        trigger: &TriggeredAction,
        current_date: DateTime<Utc>,
    ) -> Result<Option<TriggeredRequest>, WorkerError> {
        let last = self
            .deps()
            .queue
            .last_execution(trigger.originator())
            .await
            .map_err(WorkerError::from_anyhow)?;

        let Some(next) = next_execution(&trigger.definition, last)? else {
            return Ok(None);
        };
        if current_date < next {
            return Ok(None);
        }

        Ok(materialize_scheduled(
            trigger,
            current_date,
            self.deps().formulas.as_ref(),
        ))
    }
}
