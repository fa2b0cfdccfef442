//! Action handler registration.
//!
//! Handlers are opaque async functions keyed by action slug. They receive
//! a bounded [`ActionContext`], the input contract and the request, and
//! return the JSON value placed in a successful result.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::context::ActionContext;
use super::models::ActionRequest;
use crate::common::Contract;

/// Type alias for the async handler function.
pub type ActionHandler = Arc<
    dyn Fn(ActionContext, Contract, ActionRequest) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// An action implementation provided by a plugin.
#[derive(Clone)]
pub struct RegisteredAction {
    pub slug: String,
    handler: ActionHandler,
}

impl RegisteredAction {
    /// Wraps an async function as the handler for `slug`.
    ///
    /// ```ignore
    /// RegisteredAction::new("action-ping", |ctx, card, request| async move {
    ///     Ok(json!({ "id": card.id }))
    /// });
    /// ```
    pub fn new<F, Fut>(slug: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Contract, ActionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            slug: slug.into(),
            handler: Arc::new(move |context, card, request| Box::pin(handler(context, card, request))),
        }
    }

    pub async fn invoke(
        &self,
        context: ActionContext,
        card: Contract,
        request: ActionRequest,
    ) -> anyhow::Result<Value> {
        (self.handler)(context, card, request).await
    }
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}
