//! Integration tests for triggers derived from type definitions.

mod common;

use serde_json::{json, Value};
use test_context::test_context;
use worker_core::common::{Contract, ContractDraft, PatchOp};
use worker_core::domains::triggers::TRIGGERED_ACTION_TYPE;

use crate::common::TestHarness;

const TALLY: &str = "tally@1.0.0";

fn tally_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "data": {
                "type": "object",
                "properties": {
                    "amounts": {
                        "type": "array",
                        "$$formula": "AGGREGATE($events, \"data.payload.amount\")"
                    }
                }
            }
        }
    })
}

async fn insert_tally_type(harness: &TestHarness) -> Contract {
    let type_type = harness.get_type("type@1.0.0").await;
    harness
        .worker
        .insert_card(
            &harness.session,
            &type_type,
            &harness.options(),
            ContractDraft::builder()
                .slug("tally")
                .type_ref("type@1.0.0")
                .data(json!({ "schema": tally_schema() }))
                .build(),
        )
        .await
        .unwrap()
        .unwrap()
}

async fn patch_type(harness: &TestHarness, contract: &Contract, patch: Vec<PatchOp>) -> Contract {
    let type_type = harness.get_type("type@1.0.0").await;
    harness
        .worker
        .patch_card(&harness.session, &type_type, &harness.options(), contract, patch)
        .await
        .unwrap()
        .unwrap()
}

async fn insert_tally(harness: &TestHarness, slug: &str) -> Contract {
    let tally_type = harness.get_type(TALLY).await;
    harness
        .worker
        .insert_card(
            &harness.session,
            &tally_type,
            &harness.options(),
            ContractDraft::builder().slug(slug).type_ref(TALLY).build(),
        )
        .await
        .unwrap()
        .unwrap()
}

/// Records an event carrying `amount` on the timeline of `target`.
async fn record_amount(harness: &TestHarness, slug: &str, target: &Contract, amount: i64) {
    let event_type = harness.get_type("create@1.0.0").await;
    harness
        .worker
        .insert_card(
            &harness.session,
            &event_type,
            &harness.options(),
            ContractDraft::builder()
                .slug(slug)
                .type_ref("create@1.0.0")
                .data(json!({
                    "target": target.id,
                    "timestamp": "2018-01-01T05:00:00.000Z",
                    "payload": { "amount": amount }
                }))
                .build(),
        )
        .await
        .unwrap()
        .unwrap();
}

fn stored_for(harness: &TestHarness, type_ref: &str) -> Vec<Contract> {
    harness
        .contracts_of(TRIGGERED_ACTION_TYPE)
        .into_iter()
        .filter(|contract| contract.data["type"] == type_ref)
        .collect()
}

fn registered_for(harness: &TestHarness, type_ref: &str) -> usize {
    harness
        .worker
        .get_triggers()
        .iter()
        .filter(|trigger| trigger.definition.type_target.as_deref() == Some(type_ref))
        .count()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn committing_a_type_registers_its_triggers(harness: &TestHarness) {
    insert_tally_type(harness).await;

    let stored = stored_for(harness, TALLY);
    assert_eq!(stored.len(), 1);
    assert!(stored[0].active);
    assert!(stored[0].slug.starts_with("triggered-action-tally-"));
    assert_eq!(registered_for(harness, TALLY), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recommitting_a_type_never_duplicates_triggers(harness: &TestHarness) {
    let tally = insert_tally_type(harness).await;
    let first = stored_for(harness, TALLY)[0].id;

    let tally = patch_type(harness, &tally, vec![PatchOp::add("/name", json!("Tally"))]).await;
    patch_type(harness, &tally, vec![PatchOp::add("/name", json!("Tally v2"))]).await;

    let stored = stored_for(harness, TALLY);
    assert_eq!(stored.len(), 3);
    let active: Vec<&Contract> = stored.iter().filter(|contract| contract.active).collect();
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, first);

    assert_eq!(registered_for(harness, TALLY), 1);
    assert_eq!(harness.worker.reaction_stats().type_triggers, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dropping_the_formula_retires_the_trigger(harness: &TestHarness) {
    let tally = insert_tally_type(harness).await;

    patch_type(
        &harness,
        &tally,
        vec![PatchOp::replace("/data/schema", json!({ "type": "object" }))],
    )
    .await;

    assert!(stored_for(harness, TALLY)
        .iter()
        .all(|contract| !contract.active));
    assert_eq!(registered_for(harness, TALLY), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn generated_trigger_aggregates_events_of_its_type(harness: &TestHarness) {
    insert_tally_type(harness).await;
    let tally = insert_tally(harness, "tally-1").await;

    record_amount(harness, "event-1", &tally, 5).await;

    let enqueued = harness.queue.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].action, "action-set-add@1.0.0");
    assert_eq!(enqueued[0].card, tally.id);
    assert_eq!(
        enqueued[0].arguments,
        json!({ "property": "data.amounts", "value": 5 })
    );

    record_amount(harness, "event-2", &tally, 5).await;
    record_amount(harness, "event-3", &tally, 7).await;

    let results = harness.drain().await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|result| !result.error), "{:?}", results);
    assert_eq!(harness.reload(&tally).await.data["amounts"], json!([5, 7]));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn events_on_other_types_are_ignored(harness: &TestHarness) {
    insert_tally_type(harness).await;
    let card = harness.insert_card("card-1", json!({})).await;

    record_amount(harness, "event-1", &card, 3).await;

    assert!(harness.queue.enqueued().is_empty());
    assert_eq!(harness.reload(&card).await.data, json!({}));
}
