//! Test fixtures: a card type, a few actions and a reaction recorder.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use worker_core::common::{Contract, ContractDraft, ContractId, PatchOp, Session};
use worker_core::domains::actions::{ActionContext, ActionRequest};
use worker_core::domains::transformers::Transformer;
use worker_core::kernel::{BaseSubscriptionEvaluator, BaseTransformerEvaluator, Plugin};

pub const SET_FIELD: &str = "action-set-field@1.0.0";
pub const FAIL: &str = "action-fail@1.0.0";
pub const UNHANDLED: &str = "action-unhandled@1.0.0";

fn action(slug: &str, arguments: Value) -> ContractDraft {
    ContractDraft::builder()
        .slug(slug)
        .type_ref("action@1.0.0")
        .data(json!({
            "filter": {
                "type": "object",
                "properties": { "type": { "const": "card@1.0.0" } }
            },
            "arguments": arguments
        }))
        .build()
}

/// `card@1.0.0` and three actions on it: one that sets a data field, one
/// that always fails and one with no handler.
pub fn test_plugin() -> Plugin {
    Plugin::new("test")
        .with_contract(
            ContractDraft::builder()
                .slug("card")
                .type_ref("type@1.0.0")
                .data(json!({
                    "schema": {
                        "type": "object",
                        "properties": { "data": { "type": "object" } }
                    }
                }))
                .build(),
        )
        .with_contract(action(
            "action-set-field",
            json!({
                "field": { "type": "string" },
                "value": {}
            }),
        ))
        .with_contract(action("action-fail", json!({})))
        .with_contract(action("action-unhandled", json!({})))
        .with_action("action-set-field", set_field)
        .with_action("action-fail", |_, _, _| async { Err(anyhow!("boom")) })
}

/// Sets `data.<field>` on the card, recording a change event.
async fn set_field(context: ActionContext, card: Contract, request: ActionRequest) -> Result<Value> {
    let field = request.arguments["field"]
        .as_str()
        .context("field must be a string")?;
    let type_contract = context.get_type(&card.type_ref).await?;

    let mut options = context.commit_options();
    options.attach_events = true;
    let updated = context
        .patch_card(
            &type_contract,
            options,
            &card,
            vec![PatchOp::add(
                format!("/data/{}", field),
                request.arguments["value"].clone(),
            )],
        )
        .await?;

    Ok(json!({ "id": card.id, "changed": updated.is_some() }))
}

/// A plugin whose `action-spy-event` handler records the originator and
/// kind of every change event it is asked to write.
pub fn spy_plugin() -> (Plugin, Arc<Mutex<Vec<(uuid::Uuid, String)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let plugin = Plugin::new("spy").with_action("action-spy-event", move |context, _card, request| {
        let sink = sink.clone();
        async move {
            let kind = request.arguments["type"].as_str().unwrap_or_default().to_string();
            sink.lock().push((context.originator(), kind));
            Ok(json!({}))
        }
    });
    (plugin, seen)
}

/// Records every reaction call as `(previous id, current slug)`.
#[derive(Debug, Default)]
pub struct Recorder {
    calls: Mutex<Vec<(Option<ContractId>, String)>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<(Option<ContractId>, String)> {
        self.calls.lock().clone()
    }

    fn record(&self, previous: Option<&Contract>, current: &Contract) {
        self.calls
            .lock()
            .push((previous.map(|contract| contract.id), current.slug.clone()));
    }
}

#[async_trait]
impl BaseTransformerEvaluator for Recorder {
    async fn evaluate(
        &self,
        _latest: &[Arc<Transformer>],
        previous: Option<&Contract>,
        current: &Contract,
    ) -> Result<()> {
        self.record(previous, current);
        Ok(())
    }
}

#[async_trait]
impl BaseSubscriptionEvaluator for Recorder {
    async fn evaluate(
        &self,
        _session: &Session,
        previous: Option<&Contract>,
        current: &Contract,
    ) -> Result<()> {
        self.record(previous, current);
        Ok(())
    }
}
