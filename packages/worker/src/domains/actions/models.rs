//! Action requests, results and definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{Contract, ContractId, RequestId, VersionedSlug};
use crate::kernel::error::{SerializedError, WorkerError};

/// Correlates every log line produced on behalf of one request chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    pub id: String,
}

impl LogContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// A context nested under this one, e.g. for trigger-spawned requests.
    pub fn child(&self, suffix: impl std::fmt::Display) -> Self {
        Self::new(format!("{}:{}", self.id, suffix))
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::generate()
    }
}

/// A request before the queue has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ActionRequestDraft {
    /// `slug@version` of the action contract.
    #[builder(setter(into))]
    pub action: String,
    /// Input contract.
    pub card: ContractId,
    #[builder(setter(into))]
    pub card_type: String,
    pub actor: ContractId,
    /// Trigger or request that causally produced this one.
    #[builder(default, setter(strip_option))]
    pub originator: Option<Uuid>,
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    #[builder(default = json!({}))]
    pub arguments: Value,
    #[builder(default)]
    pub log_context: LogContext,
}

impl ActionRequestDraft {
    pub fn into_request(self, id: RequestId) -> ActionRequest {
        ActionRequest {
            id,
            epoch: self.timestamp.timestamp_millis(),
            action: self.action,
            card: self.card,
            card_type: self.card_type,
            actor: self.actor,
            originator: self.originator,
            timestamp: self.timestamp,
            arguments: self.arguments,
            log_context: self.log_context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: RequestId,
    pub action: String,
    pub card: ContractId,
    pub card_type: String,
    pub actor: ContractId,
    pub originator: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    /// `timestamp` in milliseconds since the Unix epoch.
    pub epoch: i64,
    pub arguments: Value,
    pub log_context: LogContext,
}

impl ActionRequest {
    pub fn action_ref(&self) -> Result<VersionedSlug, WorkerError> {
        self.action
            .parse()
            .map_err(|reason: String| WorkerError::invalid_action(&self.action, reason))
    }

    /// The originator follow-up commits should carry: the chain's root if
    /// known, otherwise this request.
    pub fn chain_originator(&self) -> Uuid {
        self.originator.unwrap_or_else(|| self.id.into_uuid())
    }
}

/// The terminal envelope of every execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub error: bool,
    pub data: Value,
}

impl ActionResult {
    pub fn success(data: Value) -> Self {
        Self { error: false, data }
    }

    pub fn failure(error: &SerializedError) -> Self {
        Self {
            error: true,
            data: serde_json::to_value(error).unwrap_or(Value::Null),
        }
    }

    /// The serialized error carried by a failed result.
    pub fn error_payload(&self) -> Option<SerializedError> {
        if !self.error {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Recorded by the queue when a result is posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub request: RequestId,
    pub originator: Option<Uuid>,
    pub worker: String,
    pub result: ActionResult,
    pub timestamp: DateTime<Utc>,
}

/// The declarative half of an action, read from its contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub slug: String,
    pub version: String,
    /// Schema the input contract must satisfy.
    pub filter: Value,
    /// Argument name to argument schema.
    pub arguments: Map<String, Value>,
}

impl ActionDefinition {
    pub fn from_contract(contract: &Contract) -> Self {
        let filter = contract
            .data
            .get("filter")
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object" }));
        let arguments = contract
            .data
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            slug: contract.slug.clone(),
            version: contract.version.clone(),
            filter,
            arguments,
        }
    }

    /// Every declared argument is required and no others are allowed.
    pub fn arguments_schema(&self) -> Value {
        let required: Vec<&String> = self.arguments.keys().collect();
        json!({
            "type": "object",
            "properties": self.arguments,
            "required": required,
            "additionalProperties": false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ContractDraft;

    #[test]
    fn epoch_tracks_timestamp() {
        let timestamp: DateTime<Utc> = "2018-01-01T05:00:00Z".parse().unwrap();
        let request = ActionRequestDraft::builder()
            .action("action-update-card@1.0.0")
            .card(ContractId::new())
            .card_type("card@1.0.0")
            .actor(ContractId::new())
            .timestamp(timestamp)
            .build()
            .into_request(RequestId::new());
        assert_eq!(request.epoch, 1_514_782_800_000);
    }

    #[test]
    fn chain_originator_prefers_existing_originator() {
        let root = Uuid::new_v4();
        let mut request = ActionRequestDraft::builder()
            .action("action-update-card@1.0.0")
            .card(ContractId::new())
            .card_type("card@1.0.0")
            .actor(ContractId::new())
            .originator(root)
            .build()
            .into_request(RequestId::new());
        assert_eq!(request.chain_originator(), root);

        request.originator = None;
        assert_eq!(request.chain_originator(), request.id.into_uuid());
    }

    #[test]
    fn failure_envelope_round_trips_the_error() {
        let error = SerializedError {
            name: "SchemaMismatch".to_string(),
            message: "arguments does not match its schema".to_string(),
            expected: false,
        };
        let result = ActionResult::failure(&error);
        assert!(result.error);
        assert_eq!(result.error_payload(), Some(error));
        assert_eq!(ActionResult::success(json!({})).error_payload(), None);
    }

    #[test]
    fn arguments_schema_requires_every_argument() {
        let contract = ContractDraft::builder()
            .slug("action-set-status")
            .type_ref("action@1.0.0")
            .data(json!({
                "filter": { "type": "object" },
                "arguments": { "status": { "type": "string" } }
            }))
            .build()
            .into_contract(ContractId::new(), Utc::now());
        let definition = ActionDefinition::from_contract(&contract);
        assert_eq!(
            definition.arguments_schema(),
            json!({
                "type": "object",
                "properties": { "status": { "type": "string" } },
                "required": ["status"],
                "additionalProperties": false
            })
        );
    }
}
