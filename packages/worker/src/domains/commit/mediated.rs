//! Mediated writes: the only way handlers and callers mutate contracts.

use tracing::debug;

use super::options::CommitOptions;
use crate::common::{Contract, ContractDraft, PatchOp, Session, VersionedSlug};
use crate::kernel::error::WorkerError;
use crate::kernel::Worker;

fn schema_of(type_contract: &Contract) -> Result<&serde_json::Value, WorkerError> {
    type_contract.schema().ok_or_else(|| WorkerError::NoSuchType {
        type_ref: type_contract.versioned_slug(),
    })
}

impl Worker {
    pub async fn insert_card(
        &self,
        session: &Session,
        type_contract: &Contract,
        options: &CommitOptions,
        draft: ContractDraft,
    ) -> Result<Option<Contract>, WorkerError> {
        let schema = schema_of(type_contract)?;
        let draft = self
            .deps()
            .formulas
            .evaluate_object(schema, draft)
            .map_err(WorkerError::from_anyhow)?;

        debug!(slug = %draft.slug, type_ref = %type_contract.versioned_slug(), "Inserting card");
        self.commit(
            session,
            type_contract,
            None,
            options,
            self.deps().store.insert(session, schema, draft),
        )
        .await
    }

    /// # Errors
    ///
    /// [`WorkerError::InvalidVersion`] if `card` carries no version.
    pub async fn patch_card(
        &self,
        session: &Session,
        type_contract: &Contract,
        options: &CommitOptions,
        card: &Contract,
        patch: Vec<PatchOp>,
    ) -> Result<Option<Contract>, WorkerError> {
        if card.version.trim().is_empty() {
            return Err(WorkerError::InvalidVersion {
                slug: card.slug.clone(),
            });
        }

        let schema = schema_of(type_contract)?;
        let patch = self
            .deps()
            .formulas
            .evaluate_patch(schema, card, patch)
            .map_err(WorkerError::from_anyhow)?;

        debug!(contract_id = %card.id, operations = patch.len(), "Patching card");
        self.commit(
            session,
            type_contract,
            Some(card),
            options,
            self.deps().store.patch(session, schema, card, &patch),
        )
        .await
    }

    /// Upserts by `slug@version`. Returns `Ok(None)` when nothing changed.
    pub async fn replace_card(
        &self,
        session: &Session,
        type_contract: &Contract,
        options: &CommitOptions,
        draft: ContractDraft,
    ) -> Result<Option<Contract>, WorkerError> {
        let schema = schema_of(type_contract)?;
        let reference = VersionedSlug::new(draft.slug.clone(), draft.version.clone());
        let previous = self
            .deps()
            .store
            .get_by_slug(session, &reference)
            .await
            .map_err(WorkerError::from_anyhow)?;
        let draft = self
            .deps()
            .formulas
            .evaluate_object(schema, draft)
            .map_err(WorkerError::from_anyhow)?;

        debug!(slug = %draft.slug, exists = previous.is_some(), "Replacing card");
        self.commit(
            session,
            type_contract,
            previous.as_ref(),
            options,
            self.deps().store.replace(session, schema, draft),
        )
        .await
    }
}
