use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::template::ArgumentTemplate;
use crate::common::{Contract, ContractDraft, ContractId};
use crate::kernel::error::WorkerError;

/// Type of the contracts that persist triggers.
pub const TRIGGERED_ACTION_TYPE: &str = "triggered-action@1.0.0";

/// Which kind of mutation a trigger reacts to. Unset means both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Insert,
    Update,
}

impl TriggerMode {
    pub fn for_previous(previous: Option<&Contract>) -> Self {
        match previous {
            Some(_) => TriggerMode::Update,
            None => TriggerMode::Insert,
        }
    }
}

/// The `data` of a `triggered-action` contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Schema the mutated object must satisfy. Triggers without a filter are
    /// time-only and never match mutations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TriggerMode>,
    /// `slug@version` of the action to request.
    pub action: String,
    /// Object id, `slug@version`, or a list of them; may use `$eval`.
    pub target: ArgumentTemplate,
    /// Set on triggers generated from a type definition: the
    /// `slug@version` of that type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_target: Option<String>,
    #[serde(default)]
    pub arguments: ArgumentTemplate,
    #[serde(default, rename = "startDate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// ISO-8601 duration for recurring triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl TriggerDefinition {
    /// `start_date`, defaulting to the Unix epoch.
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn is_recurring(&self) -> bool {
        self.interval.is_some()
    }
}

/// A trigger as held by the registry: a stored contract plus its parsed
/// definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredAction {
    pub id: ContractId,
    pub slug: String,
    pub active: bool,
    pub definition: TriggerDefinition,
}

impl TriggeredAction {
    pub fn from_contract(contract: &Contract) -> Result<Self, WorkerError> {
        let definition: TriggerDefinition = serde_json::from_value(contract.data.clone())
            .map_err(|e| WorkerError::SchemaMismatch {
                subject: contract.slug.clone(),
                errors: vec![e.to_string()],
            })?;

        Ok(Self {
            id: contract.id,
            slug: contract.slug.clone(),
            active: contract.active,
            definition,
        })
    }

    /// The contract draft that persists `definition` under `slug`.
    pub fn draft(slug: impl Into<String>, definition: &TriggerDefinition) -> ContractDraft {
        ContractDraft::builder()
            .slug(slug)
            .type_ref(TRIGGERED_ACTION_TYPE)
            .data(serde_json::to_value(definition).unwrap_or(Value::Null))
            .build()
    }

    /// The originator carried by every request this trigger spawns.
    pub fn originator(&self) -> Uuid {
        self.id.into_uuid()
    }
}

/// A matched trigger's materialized request, before its target has been
/// resolved to concrete contracts.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredRequest {
    pub action: String,
    pub target: Value,
    pub arguments: Value,
    /// Id of the trigger that produced the request.
    pub originator: Uuid,
    pub current_date: DateTime<Utc>,
}

impl TriggeredRequest {
    /// Distinct target identifiers in first-seen order. Non-string entries
    /// are ignored.
    pub fn target_identifiers(&self) -> Vec<String> {
        let candidates: Vec<&Value> = match &self.target {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut identifiers: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(identifier) = candidate.as_str() {
                if !identifiers.iter().any(|seen| seen == identifier) {
                    identifiers.push(identifier.to_string());
                }
            }
        }
        identifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_reads_wire_names() {
        let definition: TriggerDefinition = serde_json::from_value(json!({
            "filter": { "type": "object" },
            "mode": "update",
            "action": "action-create-card@1.0.0",
            "target": "card@1.0.0",
            "type": "thread@1.0.0",
            "arguments": { "reason": null },
            "startDate": "2018-01-01T05:00:00Z",
            "interval": "PT1H"
        }))
        .unwrap();

        assert_eq!(definition.mode, Some(TriggerMode::Update));
        assert_eq!(definition.type_target.as_deref(), Some("thread@1.0.0"));
        assert_eq!(definition.start_date().to_rfc3339(), "2018-01-01T05:00:00+00:00");
        assert!(definition.is_recurring());
    }

    #[test]
    fn start_date_defaults_to_epoch() {
        let definition: TriggerDefinition = serde_json::from_value(json!({
            "action": "action-ping@1.0.0",
            "target": "card@1.0.0"
        }))
        .unwrap();
        assert_eq!(definition.start_date(), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(definition.arguments, ArgumentTemplate::default());
    }

    #[test]
    fn target_identifiers_are_deduplicated() {
        let request = TriggeredRequest {
            action: "action-ping@1.0.0".to_string(),
            target: json!(["a@1.0.0", "b@1.0.0", "a@1.0.0", 3]),
            arguments: json!({}),
            originator: Uuid::nil(),
            current_date: Utc::now(),
        };
        assert_eq!(request.target_identifiers(), vec!["a@1.0.0", "b@1.0.0"]);
    }

    #[test]
    fn draft_round_trips_through_a_contract() {
        let definition: TriggerDefinition = serde_json::from_value(json!({
            "filter": { "type": "object" },
            "action": "action-ping@1.0.0",
            "target": { "$eval": "source.id" }
        }))
        .unwrap();
        let contract = TriggeredAction::draft("triggered-action-ping", &definition)
            .into_contract(ContractId::new(), Utc::now());
        let trigger = TriggeredAction::from_contract(&contract).unwrap();
        assert_eq!(trigger.definition, definition);
        assert!(trigger.active);
    }
}
