//! Plugin loading.
//!
//! Plugins contribute action handlers and contracts (types, action
//! definitions). They are flattened once at startup into slug-keyed maps;
//! the same slug offered twice is a load-time error.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use serde_json::{json, Value};
use tracing::info;

use super::error::WorkerError;
use super::traits::BaseStore;
use crate::common::{Contract, ContractDraft, Session};
use crate::domains::actions::context::ActionContext;
use crate::domains::actions::library::RegisteredAction;
use crate::domains::actions::models::ActionRequest;

#[derive(Debug, Clone)]
pub struct Plugin {
    pub slug: String,
    pub actions: Vec<RegisteredAction>,
    pub contracts: Vec<ContractDraft>,
}

impl Plugin {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            actions: Vec::new(),
            contracts: Vec::new(),
        }
    }

    pub fn with_action<F, Fut>(mut self, slug: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Contract, ActionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.actions.push(RegisteredAction::new(slug, handler));
        self
    }

    pub fn with_contract(mut self, contract: ContractDraft) -> Self {
        self.contracts.push(contract);
        self
    }
}

/// Flattened view of every loaded plugin.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    actions: HashMap<String, RegisteredAction>,
    contracts: BTreeMap<String, ContractDraft>,
}

impl PluginRegistry {
    /// Flattens `plugins`.
    ///
    /// # Errors
    ///
    /// [`WorkerError::DuplicateSlug`] naming every plugin that offers a
    /// slug more than once, for handlers and contracts alike.
    pub fn load(plugins: Vec<Plugin>) -> Result<Self, WorkerError> {
        let mut action_owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut contract_owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for plugin in &plugins {
            for action in &plugin.actions {
                action_owners
                    .entry(action.slug.clone())
                    .or_default()
                    .push(plugin.slug.clone());
            }
            for contract in &plugin.contracts {
                contract_owners
                    .entry(contract.slug.clone())
                    .or_default()
                    .push(plugin.slug.clone());
            }
        }

        for owners in [&action_owners, &contract_owners] {
            if let Some((slug, plugins)) = owners.iter().find(|(_, owners)| owners.len() > 1) {
                return Err(WorkerError::DuplicateSlug {
                    slug: slug.clone(),
                    plugins: plugins.clone(),
                });
            }
        }

        let mut registry = Self::default();
        for plugin in plugins {
            info!(
                plugin = %plugin.slug,
                actions = plugin.actions.len(),
                contracts = plugin.contracts.len(),
                "Loaded plugin"
            );
            for action in plugin.actions {
                registry.actions.insert(action.slug.clone(), action);
            }
            for contract in plugin.contracts {
                registry.contracts.insert(contract.slug.clone(), contract);
            }
        }

        Ok(registry)
    }

    /// Handler registered under the action slug.
    pub fn action(&self, slug: &str) -> Option<&RegisteredAction> {
        self.actions.get(slug)
    }

    pub fn contract(&self, slug: &str) -> Option<&ContractDraft> {
        self.contracts.get(slug)
    }

    /// Every plugin-supplied contract, ordered by slug.
    pub fn contracts(&self) -> impl Iterator<Item = &ContractDraft> {
        self.contracts.values()
    }

    /// Schema of the plugin-supplied type behind a `slug@version` reference.
    pub fn type_schema(&self, type_ref: &str) -> Option<&Value> {
        let slug = type_ref.split_once('@').map_or(type_ref, |(slug, _)| slug);
        self.contracts
            .get(slug)
            .and_then(|contract| contract.data.get("schema"))
            .filter(|schema| !schema.is_null())
    }

    /// Writes every plugin-supplied contract to `store`. Contracts already
    /// stored and unchanged are skipped. Returns how many were written.
    pub async fn bootstrap(
        &self,
        store: &dyn BaseStore,
        session: &Session,
    ) -> Result<usize, WorkerError> {
        let permissive = json!({ "type": "object" });
        let mut written = 0;

        for draft in self.contracts.values() {
            let schema = self.type_schema(&draft.type_ref).unwrap_or(&permissive);
            let stored = store
                .replace(session, schema, draft.clone())
                .await
                .map_err(WorkerError::from_anyhow)?;
            if stored.is_some() {
                written += 1;
            }
        }

        info!(written, "Bootstrapped plugin contracts");
        Ok(written)
    }
}
