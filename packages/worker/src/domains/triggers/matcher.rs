//! Trigger matching.
//!
//! A trigger fires on a mutation when its mode agrees with the kind of
//! mutation and the new object satisfies its filter. On a match the
//! trigger's target and arguments templates are resolved against
//! `{source, timestamp}`; any undefined `$eval` voids the match.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;

use super::models::{TriggerMode, TriggeredAction, TriggeredRequest};
use crate::common::Contract;
use crate::kernel::schema::SchemaFilter;
use crate::kernel::traits::BaseFormulaEvaluator;

/// Matches `trigger` against a mutation from `previous` to `current`.
///
/// Returns `None` when the trigger does not fire.
pub fn match_trigger(
    trigger: &TriggeredAction,
    previous: Option<&Contract>,
    current: &Contract,
    current_date: DateTime<Utc>,
    evaluator: &dyn BaseFormulaEvaluator,
) -> Option<TriggeredRequest> {
    let definition = &trigger.definition;
    let mode = TriggerMode::for_previous(previous);

    if definition.mode.is_some_and(|wanted| wanted != mode) {
        return None;
    }

    let filter = definition.filter.as_ref()?;
    let source = current.to_value();

    match SchemaFilter::compile(filter) {
        Ok(filter) if filter.is_match(&source) => {}
        Ok(_) => return None,
        Err(e) => {
            warn!(trigger_id = %trigger.id, error = %e, "Trigger has an invalid filter");
            return None;
        }
    }

    materialize(trigger, source, current_date, evaluator)
}

/// Materializes a recurring trigger at `current_date`. There is no source
/// object, so `source` resolves to `null`.
pub fn materialize_scheduled(
    trigger: &TriggeredAction,
    current_date: DateTime<Utc>,
    evaluator: &dyn BaseFormulaEvaluator,
) -> Option<TriggeredRequest> {
    materialize(trigger, Value::Null, current_date, evaluator)
}

fn materialize(
    trigger: &TriggeredAction,
    source: Value,
    current_date: DateTime<Utc>,
    evaluator: &dyn BaseFormulaEvaluator,
) -> Option<TriggeredRequest> {
    let context = json!({
        "source": source,
        "timestamp": current_date.to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    let eval = |expression: &str| evaluator.evaluate_expression(expression, &context);

    let definition = &trigger.definition;
    let target = definition.target.resolve(&eval)?;
    let arguments = definition.arguments.resolve(&eval)?;

    Some(TriggeredRequest {
        action: definition.action.clone(),
        target,
        arguments,
        originator: trigger.originator(),
        current_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ContractDraft, ContractId};
    use crate::kernel::in_memory::PathFormulaEvaluator;

    fn trigger(data: Value) -> TriggeredAction {
        let contract = ContractDraft::builder()
            .slug("triggered-action-test")
            .type_ref("triggered-action@1.0.0")
            .data(data)
            .build()
            .into_contract(ContractId::new(), Utc::now());
        TriggeredAction::from_contract(&contract).unwrap()
    }

    fn card(status: &str) -> Contract {
        ContractDraft::builder()
            .slug("card-1")
            .type_ref("card@1.0.0")
            .data(json!({ "status": status }))
            .build()
            .into_contract(ContractId::new(), Utc::now())
    }

    fn open_cards(mode: Option<&str>) -> TriggeredAction {
        let mut data = json!({
            "filter": {
                "type": "object",
                "required": ["data"],
                "properties": {
                    "data": {
                        "type": "object",
                        "required": ["status"],
                        "properties": { "status": { "const": "open" } }
                    }
                }
            },
            "action": "action-notify@1.0.0",
            "target": { "$eval": "source.id" },
            "arguments": { "when": { "$eval": "timestamp" }, "status": { "$eval": "source.data.status" } }
        });
        if let Some(mode) = mode {
            data["mode"] = json!(mode);
        }
        trigger(data)
    }

    fn now() -> DateTime<Utc> {
        "2018-01-01T05:00:00Z".parse().unwrap()
    }

    #[test]
    fn materializes_on_match() {
        let trigger = open_cards(None);
        let current = card("open");
        let request = match_trigger(&trigger, None, &current, now(), &PathFormulaEvaluator).unwrap();

        assert_eq!(request.action, "action-notify@1.0.0");
        assert_eq!(request.target, json!(current.id.to_string()));
        assert_eq!(
            request.arguments,
            json!({ "when": "2018-01-01T05:00:00.000Z", "status": "open" })
        );
        assert_eq!(request.originator, trigger.id.into_uuid());
    }

    #[test]
    fn filter_rejects() {
        let trigger = open_cards(None);
        assert!(match_trigger(&trigger, None, &card("closed"), now(), &PathFormulaEvaluator).is_none());
    }

    #[test]
    fn update_mode_ignores_inserts() {
        let trigger = open_cards(Some("update"));
        let current = card("open");
        assert!(match_trigger(&trigger, None, &current, now(), &PathFormulaEvaluator).is_none());
        assert!(
            match_trigger(&trigger, Some(&current), &current, now(), &PathFormulaEvaluator).is_some()
        );
    }

    #[test]
    fn insert_mode_ignores_updates() {
        let trigger = open_cards(Some("insert"));
        let current = card("open");
        assert!(match_trigger(&trigger, None, &current, now(), &PathFormulaEvaluator).is_some());
        assert!(
            match_trigger(&trigger, Some(&current), &current, now(), &PathFormulaEvaluator).is_none()
        );
    }

    #[test]
    fn undefined_argument_voids_match() {
        let trigger = trigger(json!({
            "filter": { "type": "object" },
            "action": "action-notify@1.0.0",
            "target": { "$eval": "source.id" },
            "arguments": { "missing": { "$eval": "source.data.nope" } }
        }));
        assert!(match_trigger(&trigger, None, &card("open"), now(), &PathFormulaEvaluator).is_none());
    }

    #[test]
    fn filterless_triggers_only_fire_on_schedule() {
        let trigger = trigger(json!({
            "action": "action-notify@1.0.0",
            "target": "card-1@1.0.0",
            "interval": "PT1H"
        }));
        assert!(match_trigger(&trigger, None, &card("open"), now(), &PathFormulaEvaluator).is_none());

        let request = materialize_scheduled(&trigger, now(), &PathFormulaEvaluator).unwrap();
        assert_eq!(request.target, json!("card-1@1.0.0"));
        assert_eq!(request.arguments, json!({}));
    }
}
