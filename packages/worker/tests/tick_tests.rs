//! Integration tests for recurring triggers.

mod common;

use chrono::{DateTime, Utc};
use serde_json::json;
use test_context::test_context;

use crate::common::{TestHarness, SET_FIELD};

fn at(timestamp: &str) -> DateTime<Utc> {
    timestamp.parse().unwrap()
}

fn hourly(target: &str) -> serde_json::Value {
    json!({
        "action": SET_FIELD,
        "target": target,
        "arguments": { "field": "pinged", "value": { "$eval": "timestamp" } },
        "interval": "PT1H",
        "startDate": "2018-01-01T04:00:00Z"
    })
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recurring_trigger_fires_once_per_interval(harness: &TestHarness) {
    let card = harness.insert_card("card-1", json!({})).await;
    let trigger = harness
        .add_trigger("triggered-action-hourly", hourly(&card.id.to_string()))
        .await;

    // Not started yet.
    assert!(harness
        .worker
        .tick(&harness.session, at("2018-01-01T03:00:00Z"))
        .await
        .is_empty());

    let first = harness
        .worker
        .tick(&harness.session, at("2018-01-01T04:30:00Z"))
        .await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].card, card.id);
    assert_eq!(first[0].originator, Some(trigger.originator()));
    assert_eq!(first[0].timestamp, at("2018-01-01T04:30:00Z"));
    assert_eq!(
        first[0].arguments,
        json!({ "field": "pinged", "value": "2018-01-01T04:30:00.000Z" })
    );

    // Next execution is an hour after the last one.
    assert!(harness
        .worker
        .tick(&harness.session, at("2018-01-01T05:00:00Z"))
        .await
        .is_empty());
    assert_eq!(
        harness
            .worker
            .tick(&harness.session, at("2018-01-01T05:30:00Z"))
            .await
            .len(),
        1
    );
    assert_eq!(harness.queue.enqueued().len(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scheduled_requests_execute_like_any_other(harness: &TestHarness) {
    let card = harness.insert_card("card-1", json!({})).await;
    harness
        .add_trigger("triggered-action-hourly", hourly(&card.versioned_slug()))
        .await;

    harness
        .worker
        .tick(&harness.session, at("2018-01-01T04:30:00Z"))
        .await;
    let results = harness.drain().await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].error, "{:?}", results[0]);
    assert_eq!(
        harness.reload(&card).await.data["pinged"],
        "2018-01-01T04:30:00.000Z"
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invalid_intervals_are_counted_and_skipped(harness: &TestHarness) {
    let card = harness.insert_card("card-1", json!({})).await;
    let mut broken = hourly(&card.id.to_string());
    broken["interval"] = json!("every hour");
    harness.add_trigger("triggered-action-broken", broken).await;
    harness
        .add_trigger("triggered-action-hourly", hourly(&card.id.to_string()))
        .await;

    let enqueued = harness
        .worker
        .tick(&harness.session, at("2018-01-01T04:30:00Z"))
        .await;
    assert_eq!(enqueued.len(), 1);
    assert_eq!(harness.worker.reaction_stats().triggers, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn inactive_and_removed_triggers_never_fire(harness: &TestHarness) {
    let card = harness.insert_card("card-1", json!({})).await;

    let mut inactive = harness
        .add_trigger("triggered-action-inactive", hourly(&card.id.to_string()))
        .await;
    inactive.active = false;
    harness.worker.upsert_trigger(inactive);

    let removed = harness
        .add_trigger("triggered-action-removed", hourly(&card.id.to_string()))
        .await;
    assert!(harness.worker.remove_trigger(removed.id));

    assert!(harness
        .worker
        .tick(&harness.session, at("2018-01-01T04:30:00Z"))
        .await
        .is_empty());
    assert_eq!(harness.worker.get_triggers().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recurring_triggers_without_a_filter_ignore_commits(harness: &TestHarness) {
    let card = harness.insert_card("card-1", json!({})).await;
    harness
        .add_trigger("triggered-action-hourly", hourly(&card.id.to_string()))
        .await;

    harness.insert_card("card-2", json!({})).await;
    assert!(harness.queue.enqueued().is_empty());
}
