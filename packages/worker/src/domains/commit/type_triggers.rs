//! Re-registration of triggers derived from a type definition.
//!
//! Every commit of a type contract retires the previous generation of its
//! derived triggers before registering the new one, so re-committing a
//! type never accumulates duplicates.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::{Contract, ContractId, PatchOp, Session};
use crate::domains::triggers::{TriggerDefinition, TriggeredAction, TRIGGERED_ACTION_TYPE};
use crate::kernel::error::{log_failure, SerializedError, WorkerError};
use crate::kernel::traits::QueryOptions;
use crate::kernel::{ReactionStage, Worker};

/// Active `triggered-action` contracts generated for `type_ref`.
fn generated_for(type_ref: &str) -> Value {
    json!({
        "type": "object",
        "required": ["type", "active", "data"],
        "properties": {
            "type": { "const": TRIGGERED_ACTION_TYPE },
            "active": { "const": true },
            "data": {
                "type": "object",
                "required": ["type"],
                "properties": { "type": { "const": type_ref } }
            }
        }
    })
}

impl Worker {
    pub(crate) async fn refresh_type_triggers(&self, session: &Session, type_contract: &Contract) {
        let type_ref = type_contract.versioned_slug();
        let schema = match self.get_type(session, TRIGGERED_ACTION_TYPE).await {
            Ok(trigger_type) => trigger_type
                .schema()
                .cloned()
                .unwrap_or_else(|| json!({ "type": "object" })),
            Err(e) => {
                self.type_trigger_failure("Cannot load the triggered-action type", &e);
                return;
            }
        };

        self.retire_type_triggers(session, &schema, &type_ref).await;

        let definitions = match self.deps().formulas.type_triggers(type_contract) {
            Ok(definitions) => definitions,
            Err(e) => {
                self.type_trigger_failure("Cannot derive type triggers", &WorkerError::from_anyhow(e));
                return;
            }
        };
        if definitions.is_empty() {
            return;
        }

        let outcomes: Vec<Result<ContractId, WorkerError>> = stream::iter(definitions)
            .map(|mut definition| {
                definition.type_target = Some(type_ref.clone());
                let schema = &schema;
                let slug = &type_contract.slug;
                async move { self.register_type_trigger(session, schema, slug, definition).await }
            })
            .buffer_unordered(self.config().reaction_concurrency.max(1))
            .collect()
            .await;

        let mut registered = 0;
        for outcome in outcomes {
            match outcome {
                Ok(_) => registered += 1,
                Err(e) => self.type_trigger_failure("Failed to register type trigger", &e),
            }
        }
        let link_verbs = self.deps().formulas.referenced_link_verbs(type_contract);
        info!(type_ref = %type_ref, registered, link_verbs = ?link_verbs, "Registered type triggers");
    }

    /// Deactivates the previous generation in the store and drops it from
    /// the registry.
    async fn retire_type_triggers(&self, session: &Session, schema: &Value, type_ref: &str) {
        let mut stale = match self
            .deps()
            .store
            .query(session, &generated_for(type_ref), QueryOptions::default())
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                self.type_trigger_failure("Cannot query type triggers", &WorkerError::from_anyhow(e));
                Vec::new()
            }
        };

        let known: HashSet<ContractId> = stale.iter().map(|contract| contract.id).collect();
        for trigger in self.triggers().for_type(type_ref) {
            if known.contains(&trigger.id) {
                continue;
            }
            match self.deps().store.get_by_id(session, trigger.id).await {
                Ok(Some(contract)) if contract.active => stale.push(contract),
                Ok(_) => {
                    self.triggers().remove(trigger.id);
                }
                Err(e) => {
                    self.triggers().remove(trigger.id);
                    self.type_trigger_failure("Cannot load type trigger", &WorkerError::from_anyhow(e));
                }
            }
        }

        if stale.is_empty() {
            return;
        }

        debug!(type_ref, count = stale.len(), "Retiring type triggers");
        let outcomes: Vec<Result<(), WorkerError>> = stream::iter(stale)
            .map(|contract| async move {
                let deactivated = self
                    .deps()
                    .store
                    .patch(session, schema, &contract, &[PatchOp::replace("/active", json!(false))])
                    .await
                    .map(|_| ())
                    .map_err(WorkerError::from_anyhow);
                self.triggers().remove(contract.id);
                deactivated
            })
            .buffer_unordered(self.config().reaction_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            if let Err(e) = outcome {
                self.type_trigger_failure("Failed to deactivate type trigger", &e);
            }
        }
    }

    async fn register_type_trigger(
        &self,
        session: &Session,
        schema: &Value,
        type_slug: &str,
        definition: TriggerDefinition,
    ) -> Result<ContractId, WorkerError> {
        let slug = format!("triggered-action-{}-{}", type_slug, Uuid::new_v4().simple());
        let contract = self
            .deps()
            .store
            .insert(session, schema, TriggeredAction::draft(slug.clone(), &definition))
            .await
            .map_err(WorkerError::from_anyhow)?
            .ok_or_else(|| WorkerError::no_element("triggered-action", &slug))?;

        let trigger = TriggeredAction::from_contract(&contract)?;
        self.triggers().upsert(trigger);
        Ok(contract.id)
    }

    fn type_trigger_failure(&self, context: &str, error: &WorkerError) {
        self.stats().record_failure(ReactionStage::TypeTriggers);
        log_failure(context, &SerializedError::from(error));
    }
}
