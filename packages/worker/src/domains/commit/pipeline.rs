//! The commit pipeline.
//!
//! One logical mutation plus every reaction to it. Only the type check and
//! the mutation itself can fail the commit (and the inline change event,
//! which must exist before the caller sees the result); everything after
//! is best-effort and lands in the logs and [`ReactionStats`].
//!
//! [`ReactionStats`]: crate::kernel::ReactionStats

use std::future::Future;

use tracing::{debug, info_span, Instrument};

use super::options::CommitOptions;
use crate::common::{Contract, Session};
use crate::kernel::error::WorkerError;
use crate::kernel::Worker;

impl Worker {
    /// Runs `mutate` and fans the result out to transformers,
    /// subscriptions and triggers.
    ///
    /// Returns `Ok(None)` when the store reports no write, or when the
    /// written contract is observably identical to `previous`; in both
    /// cases no reaction runs.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::NoSuchType`] if `type_contract` carries no schema;
    ///   `mutate` is never polled.
    /// - whatever the store or the inline change-event handler fail with.
    pub async fn commit<F>(
        &self,
        session: &Session,
        type_contract: &Contract,
        previous: Option<&Contract>,
        options: &CommitOptions,
        mutate: F,
    ) -> Result<Option<Contract>, WorkerError>
    where
        F: Future<Output = anyhow::Result<Option<Contract>>> + Send,
    {
        if type_contract.schema().is_none() {
            return Err(WorkerError::NoSuchType {
                type_ref: type_contract.versioned_slug(),
            });
        }

        let span = info_span!(
            "commit",
            log_context = %options.log_context.id,
            type_ref = %type_contract.versioned_slug(),
        );

        async move {
            let Some(current) = mutate.await.map_err(WorkerError::from_anyhow)? else {
                debug!("Store reported no write");
                return Ok(None);
            };

            if previous.is_some_and(|previous| previous.observably_equal(&current)) {
                debug!(contract_id = %current.id, "Write changed nothing observable");
                return Ok(None);
            }

            self.evaluate_reactions(session, previous, &current).await;
            self.fire_triggers(session, previous, &current, options).await;

            if options.attach_events {
                self.attach_change_event(session, previous, &current, options)
                    .await?;
            }

            self.propagate_markers(session, previous, &current).await;

            if current.is_type_definition() {
                self.refresh_type_triggers(session, &current).await;
            }

            debug!(contract_id = %current.id, slug = %current.slug, "Committed");
            Ok(Some(current))
        }
        .instrument(span)
        .await
    }
}
