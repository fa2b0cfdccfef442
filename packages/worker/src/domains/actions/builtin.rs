//! The core plugin: built-in types, the change-event action and the set
//! accumulator used by aggregate formulas.

use serde_json::{json, Value};
use uuid::Uuid;

use super::context::ActionContext;
use super::models::ActionRequest;
use crate::common::{Contract, ContractDraft, PatchOp};
use crate::kernel::error::WorkerError;
use crate::kernel::traits::lookup_path;
use crate::kernel::Plugin;

pub const CORE_PLUGIN: &str = "core";
pub const CREATE_EVENT_ACTION: &str = "action-create-event";
pub const SET_ADD_ACTION: &str = "action-set-add";

fn type_contract(slug: &str, schema: Value) -> ContractDraft {
    ContractDraft::builder()
        .slug(slug)
        .type_ref("type@1.0.0")
        .name(slug.to_string())
        .data(json!({ "schema": schema }))
        .build()
}

fn event_schema() -> Value {
    json!({
        "type": "object",
        "required": ["data"],
        "properties": {
            "data": {
                "type": "object",
                "required": ["target", "timestamp"],
                "properties": {
                    "target": { "type": "string", "format": "uuid" },
                    "actor": { "type": "string" },
                    "timestamp": { "type": "string" },
                    "reason": { "type": ["string", "null"] },
                    "payload": { "type": "object" }
                }
            }
        }
    })
}

/// Built-in types and their handlers.
pub fn core_plugin() -> Plugin {
    Plugin::new(CORE_PLUGIN)
        .with_contract(type_contract(
            "type",
            json!({
                "type": "object",
                "required": ["data"],
                "properties": {
                    "data": {
                        "type": "object",
                        "properties": { "schema": { "type": "object" } }
                    }
                }
            }),
        ))
        .with_contract(type_contract(
            "triggered-action",
            json!({
                "type": "object",
                "required": ["data"],
                "properties": {
                    "data": {
                        "type": "object",
                        "required": ["action", "target"],
                        "properties": {
                            "action": { "type": "string" },
                            "mode": { "enum": ["insert", "update"] },
                            "type": { "type": "string" },
                            "interval": { "type": "string" },
                            "startDate": { "type": "string" }
                        }
                    }
                }
            }),
        ))
        .with_contract(type_contract(
            "action",
            json!({
                "type": "object",
                "required": ["data"],
                "properties": {
                    "data": {
                        "type": "object",
                        "properties": {
                            "filter": { "type": "object" },
                            "arguments": { "type": "object" }
                        }
                    }
                }
            }),
        ))
        .with_contract(type_contract("user", json!({ "type": "object" })))
        .with_contract(type_contract(
            "transformer",
            json!({
                "type": "object",
                "required": ["version"],
                "properties": { "version": { "type": "string" } }
            }),
        ))
        .with_contract(type_contract("create", event_schema()))
        .with_contract(type_contract("update", event_schema()))
        .with_contract(
            ContractDraft::builder()
                .slug(CREATE_EVENT_ACTION)
                .type_ref("action@1.0.0")
                .data(json!({
                    "filter": { "type": "object" },
                    "arguments": {
                        "type": { "enum": ["create", "update"] },
                        "reason": { "type": ["string", "null"] },
                        "payload": { "type": "object" }
                    }
                }))
                .build(),
        )
        .with_contract(
            ContractDraft::builder()
                .slug(SET_ADD_ACTION)
                .type_ref("action@1.0.0")
                .data(json!({
                    "filter": { "type": "object" },
                    "arguments": {
                        "property": { "type": "string" },
                        "value": {}
                    }
                }))
                .build(),
        )
        .with_action(CREATE_EVENT_ACTION, create_event)
        .with_action(SET_ADD_ACTION, set_add)
}

fn summary(card: &Contract) -> Value {
    json!({
        "id": card.id,
        "slug": card.slug,
        "type": card.type_ref,
        "version": card.version,
    })
}

/// Dotted property path to a JSON pointer (`data.tags` -> `/data/tags`).
fn pointer(property: &str) -> String {
    property
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
}

/// Inserts a `create@1.0.0` or `update@1.0.0` event on the card's
/// timeline, scoped by the card's markers.
pub async fn create_event(
    context: ActionContext,
    card: Contract,
    request: ActionRequest,
) -> anyhow::Result<Value> {
    let kind = match request.arguments.get("type").and_then(Value::as_str) {
        Some(kind @ ("create" | "update")) => kind,
        _ => {
            return Err(WorkerError::invalid_action(
                &request.action,
                "change events are either create or update",
            )
            .into())
        }
    };
    let event_type_ref = format!("{}@1.0.0", kind);
    let event_type = context.get_type(&event_type_ref).await?;

    let draft = ContractDraft::builder()
        .slug(format!("{}-{}", kind, Uuid::new_v4()))
        .type_ref(event_type_ref)
        .markers(card.markers.clone())
        .data(json!({
            "target": card.id,
            "actor": request.actor,
            "timestamp": request.timestamp,
            "reason": request.arguments.get("reason").cloned().unwrap_or(Value::Null),
            "payload": request.arguments.get("payload").cloned().unwrap_or_else(|| json!({})),
        }))
        .build();

    let options = context.commit_options();
    let event = context
        .insert_card(&event_type, options, draft)
        .await?
        .ok_or_else(|| WorkerError::no_element("event", card.id))?;

    Ok(summary(&event))
}

/// Adds `value` (or each element of it, when it is an array) to the array
/// at `property` of the card, skipping elements already present. A card
/// that already holds every element is left untouched.
pub async fn set_add(
    context: ActionContext,
    card: Contract,
    request: ActionRequest,
) -> anyhow::Result<Value> {
    let property = request
        .arguments
        .get("property")
        .and_then(Value::as_str)
        .ok_or_else(|| WorkerError::invalid_action(&request.action, "property must be a string"))?;
    let additions = match request.arguments.get("value") {
        Some(Value::Array(items)) => items.clone(),
        Some(value) => vec![value.clone()],
        None => Vec::new(),
    };

    let mut set = match lookup_path(&card.to_value(), property) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(WorkerError::invalid_action(
                &request.action,
                format!("{} is not a set", property),
            )
            .into())
        }
    };

    let size = set.len();
    for item in additions {
        if !set.contains(&item) {
            set.push(item);
        }
    }
    if set.len() == size {
        return Ok(summary(&card));
    }

    let card_type = context.get_type(&card.type_ref).await?;
    let patch = vec![PatchOp::add(pointer(property), Value::Array(set))];
    let updated = context
        .patch_card(&card_type, context.commit_options(), &card, patch)
        .await?;

    Ok(summary(updated.as_ref().unwrap_or(&card)))
}
