use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info_span};

use crate::common::{Contract, ContractId, PatchOp, Session};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::{ReactionStage, Worker};

/// Markers are a set: order and duplicates carry no meaning.
pub fn same_markers(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

impl Worker {
    /// Re-scopes every timeline event of `current` after its markers
    /// changed.
    pub(crate) async fn propagate_markers(
        &self,
        session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
    ) {
        let Some(previous) = previous else {
            return;
        };
        if same_markers(&previous.markers, &current.markers) {
            return;
        }

        let events = match self.deps().store.timeline(session, current.id).await {
            Ok(events) => events,
            Err(e) => {
                self.stats().record_failure(ReactionStage::Markers);
                let _span = info_span!("markers", contract_id = %current.id).entered();
                log_failure("Failed to load timeline", &SerializedError::from_anyhow(&e));
                return;
            }
        };

        let stale: Vec<Contract> = events
            .into_iter()
            .filter(|event| !same_markers(&event.markers, &current.markers))
            .collect();
        if stale.is_empty() {
            return;
        }

        debug!(contract_id = %current.id, events = stale.len(), "Propagating markers");
        let markers = json!(current.markers);

        let outcomes: Vec<(ContractId, Result<(), WorkerError>)> = stream::iter(stale)
            .map(|event| {
                let markers = markers.clone();
                async move {
                    let outcome = self.rescope_event(session, &event, markers).await;
                    (event.id, outcome)
                }
            })
            .buffer_unordered(self.config().reaction_concurrency.max(1))
            .collect()
            .await;

        for (event_id, outcome) in outcomes {
            if let Err(e) = outcome {
                self.stats().record_failure(ReactionStage::Markers);
                let _span = info_span!("markers", contract_id = %current.id, event_id = %event_id)
                    .entered();
                log_failure("Failed to propagate markers", &SerializedError::from(&e));
            }
        }
    }

    async fn rescope_event(
        &self,
        session: &Session,
        event: &Contract,
        markers: Value,
    ) -> Result<(), WorkerError> {
        let event_type = self.get_type(session, &event.type_ref).await?;
        let schema = event_type
            .schema()
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object" }));

        self.deps()
            .store
            .patch(session, &schema, event, &[PatchOp::replace("/markers", markers)])
            .await
            .map_err(WorkerError::from_anyhow)?;
        Ok(())
    }
}
