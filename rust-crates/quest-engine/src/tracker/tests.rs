#![allow(non_snake_case)]

use super::*;
use crate::{
    config::DEFAULT_NAMESPACE,
    test_helpers::*,
};

const NS: &str = DEFAULT_NAMESPACE;

fn alice() -> Felt {
    felt(0xa11ce)
}

fn bob() -> Felt {
    felt(0xb0b)
}

fn world() -> FakeIndexer {
    FakeIndexer::new()
        .with_entities(vec![definition_entity(NS, 1, &[], &[(1, 2)])])
        .with_event_messages(vec![creation_entity(NS, 1, "First steps")])
}

fn tracker(indexer: &FakeIndexer) -> QuestTracker<FakeIndexer, RecordingToaster> {
    QuestTracker::new(
        indexer.clone(),
        RecordingToaster::new(),
        EngineConfig::default(),
    )
    .with_clock(fixed_clock)
}

#[tokio::test]
async fn refresh__no_account__stays_uninitialized() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);

    // when
    tracker.refresh().await.unwrap();

    // then
    assert_eq!(tracker.state(), TrackerState::Uninitialized);
    assert_eq!(tracker.status(), Status::Loading);
    assert!(indexer.queries().is_empty());
    assert_eq!(indexer.subscriptions_opened(), 0);
}

#[tokio::test]
async fn set_account__cold_start__projects_quest_and_subscribes() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);

    // when
    tracker.set_account(Some(alice())).await.unwrap();

    // then
    assert_eq!(tracker.state(), TrackerState::Subscribed);
    assert_eq!(tracker.status(), Status::Success);
    assert_eq!(indexer.live_subscriptions(), 2);
    let quests = tracker.quests();
    assert_eq!(quests.len(), 1);
    assert_eq!(quests[0].name, "First steps");
    assert!(!quests[0].completed);
    assert!(!quests[0].locked);
    assert_eq!(quests[0].progression, 0.0);
}

#[tokio::test]
async fn refresh__player_queries__are_scoped_to_account() {
    let indexer = world();
    let mut tracker = tracker(&indexer);

    tracker.set_account(Some(alice())).await.unwrap();

    let queries = indexer.queries();
    assert_eq!(queries.len(), 4);
    let scoped = queries.iter().filter(|q| q.player == Some(alice())).count();
    assert_eq!(scoped, 2);
}

#[tokio::test]
async fn refresh__query_fails__reports_error_and_keeps_nothing() {
    // given
    let indexer = world();
    indexer.add_entity(advancement_entity(NS, alice(), 1, 1, 1));
    indexer.fail_queries("indexer unreachable");
    let mut tracker = tracker(&indexer);

    // when
    let result = tracker.set_account(Some(alice())).await;

    // then
    assert!(result.is_err());
    assert_eq!(tracker.status(), Status::Error);
    assert_eq!(tracker.state(), TrackerState::Error);
    assert!(tracker.store().is_empty());
    assert!(tracker.quests().is_empty());
    assert_eq!(indexer.subscriptions_opened(), 0);
}

#[tokio::test]
async fn refresh__after_failure__recovers() {
    let indexer = world();
    indexer.fail_queries("indexer unreachable");
    let mut tracker = tracker(&indexer);
    let _ = tracker.set_account(Some(alice())).await;

    indexer.recover();
    tracker.refresh().await.unwrap();

    assert_eq!(tracker.status(), Status::Success);
    assert_eq!(tracker.state(), TrackerState::Subscribed);
}

#[tokio::test]
async fn refresh__no_creations__defers_subscriptions() {
    // given
    let indexer =
        FakeIndexer::new().with_entities(vec![definition_entity(NS, 1, &[], &[(1, 2)])]);
    let mut tracker = tracker(&indexer);

    // when
    tracker.set_account(Some(alice())).await.unwrap();

    // then
    assert_eq!(tracker.state(), TrackerState::Connecting);
    assert_eq!(tracker.status(), Status::Success);
    assert_eq!(indexer.subscriptions_opened(), 0);
    assert_eq!(tracker.quests()[0].name, "Quest");

    // when
    indexer.add_event_message(creation_entity(NS, 1, "First steps"));
    tracker.refresh().await.unwrap();

    // then
    assert_eq!(tracker.state(), TrackerState::Subscribed);
    assert_eq!(indexer.subscriptions_opened(), 2);
}

#[tokio::test]
async fn refresh__already_subscribed__does_not_resubscribe() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();

    tracker.refresh().await.unwrap();
    tracker.refresh().await.unwrap();

    assert_eq!(indexer.subscriptions_opened(), 2);
    assert_eq!(indexer.live_subscriptions(), 2);
    assert_eq!(indexer.queries().len(), 4);
}

#[tokio::test]
async fn refresh__while_subscribed__leaves_state_and_status_untouched() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.fail_queries("indexer unreachable");

    // when
    let result = tracker.refresh().await;

    // then
    assert!(result.is_ok());
    assert_eq!(indexer.queries().len(), 4);
    assert_eq!(tracker.state(), TrackerState::Subscribed);
    assert_eq!(tracker.status(), Status::Success);
    assert!(tracker.is_subscribed());
    assert_eq!(tracker.quests().len(), 1);
}

#[tokio::test]
async fn refresh__lifecycle_query_fails__nothing_from_the_cycle_is_kept() {
    // given
    let indexer = world();
    indexer.add_entity(advancement_entity(NS, alice(), 1, 1, 1));
    indexer.fail_model(LifecycleKind::Claimed.tag(NS));
    let mut tracker = tracker(&indexer);

    // when
    let result = tracker.set_account(Some(alice())).await;

    // then
    assert!(result.is_err());
    assert_eq!(indexer.queries().len(), 4);
    assert!(tracker.store().is_empty());
    assert!(tracker.quests().is_empty());
    assert_eq!(tracker.status(), Status::Error);
    assert_eq!(tracker.state(), TrackerState::Error);
    assert_eq!(indexer.subscriptions_opened(), 0);
}

#[tokio::test]
async fn refresh__definitions_query_fails__creations_are_not_kept() {
    let indexer = world();
    indexer.fail_model(format!("{NS}-QuestDefinition"));
    let mut tracker = tracker(&indexer);

    assert!(tracker.set_account(Some(alice())).await.is_err());

    assert!(tracker.store().creations().is_empty());
    assert!(tracker.quests().is_empty());

    indexer.recover();
    tracker.refresh().await.unwrap();

    assert_eq!(tracker.quests()[0].name, "First steps");
    assert_eq!(tracker.state(), TrackerState::Subscribed);
}

#[tokio::test]
async fn set_account__change__cancels_previous_subscriptions() {
    // given
    let indexer = world();
    indexer.add_entity(advancement_entity(NS, alice(), 1, 1, 2));
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    assert_eq!(tracker.quests()[0].progression, 100.0);

    // when
    tracker.set_account(Some(bob())).await.unwrap();

    // then
    assert_eq!(indexer.subscriptions_opened(), 4);
    assert_eq!(indexer.live_subscriptions(), 2);
    assert!(tracker.store().advancements().is_empty());
    assert_eq!(tracker.quests()[0].progression, 0.0);
}

#[tokio::test]
async fn set_account__none__tears_down_and_clears() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();

    tracker.set_account(None).await.unwrap();

    assert_eq!(indexer.live_subscriptions(), 0);
    assert_eq!(tracker.state(), TrackerState::Uninitialized);
    assert!(tracker.store().is_empty());
    assert!(tracker.quests().is_empty());
}

#[tokio::test]
async fn next_update__advancement_for_account__recomputes_progression() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_entities(vec![advancement_entity(NS, alice(), 1, 1, 2)]);

    // when
    let event = tracker.next_update().await;

    // then
    assert_eq!(event, Some(TrackerEvent::Entities { changed: true }));
    let quests = tracker.quests();
    assert_eq!(quests[0].progression, 100.0);
    assert!(!quests[0].completed);

    // when
    indexer.emit_entities(vec![completion_entity(NS, alice(), 1, FIXED_NOW, true)]);
    tracker.next_update().await;

    // then
    let quests = tracker.quests();
    assert!(quests[0].completed);
    assert!(!quests[0].claimed);
}

#[tokio::test]
async fn next_update__other_players_progress__is_ignored() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_entities(vec![advancement_entity(NS, bob(), 1, 1, 2)]);

    let event = tracker.next_update().await;

    assert_eq!(event, Some(TrackerEvent::Entities { changed: false }));
    assert_eq!(tracker.quests()[0].progression, 0.0);
}

#[tokio::test]
async fn next_update__lifecycle_event_for_known_quest__toasts() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_event_messages(vec![lifecycle_entity(
        NS,
        LifecycleKind::Completed,
        alice(),
        1,
    )]);

    // when
    let event = tracker.next_update().await;

    // then
    let expected = Toast {
        title: "First steps".to_string(),
        subtitle: "Quest completed".to_string(),
    };
    assert_eq!(
        event,
        Some(TrackerEvent::Events {
            changed: false,
            toasts: vec![expected.clone()],
        })
    );
    assert_eq!(tracker.toaster().toasts(), vec![expected]);
}

#[tokio::test]
async fn next_update__claimed_event_without_creation__is_dropped() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_event_messages(vec![lifecycle_entity(
        NS,
        LifecycleKind::Claimed,
        alice(),
        42,
    )]);

    let event = tracker.next_update().await;

    assert_eq!(
        event,
        Some(TrackerEvent::Events {
            changed: false,
            toasts: vec![],
        })
    );
    assert!(tracker.toaster().toasts().is_empty());
}

#[tokio::test]
async fn next_update__creation_with_event__resolves_in_same_delivery() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_event_messages(vec![
        creation_entity(NS, 2, "Second wind"),
        lifecycle_entity(NS, LifecycleKind::Unlocked, alice(), 2),
    ]);

    tracker.next_update().await;

    let toasts = tracker.toaster().toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Second wind");
    assert_eq!(toasts[0].subtitle, "Quest unlocked");
}

#[tokio::test]
async fn next_update__other_players_event__does_not_toast() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_event_messages(vec![lifecycle_entity(
        NS,
        LifecycleKind::Completed,
        bob(),
        1,
    )]);

    tracker.next_update().await;

    assert!(tracker.toaster().toasts().is_empty());
}

#[tokio::test]
async fn refresh__past_lifecycle_events__are_not_toasted() {
    let indexer = world();
    indexer.add_event_message(lifecycle_entity(
        NS,
        LifecycleKind::Completed,
        alice(),
        1,
    ));
    let mut tracker = tracker(&indexer);

    tracker.set_account(Some(alice())).await.unwrap();

    assert!(tracker.toaster().toasts().is_empty());
}

#[tokio::test]
async fn next_update__subscription_error__is_rejected_and_stream_survives() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_entity_error("rate limited");

    // when
    let event = tracker.next_update().await;

    // then
    assert_eq!(
        event,
        Some(TrackerEvent::Rejected {
            error: "rate limited".to_string(),
        })
    );
    assert!(tracker.is_subscribed());
    assert_eq!(tracker.state(), TrackerState::Subscribed);
}

#[tokio::test]
async fn next_update__stream_closed__tears_down() {
    // given
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.close_subscriptions();

    // when
    let event = tracker.next_update().await;

    // then
    assert_eq!(event, Some(TrackerEvent::Closed));
    assert!(!tracker.is_subscribed());
    assert_eq!(tracker.state(), TrackerState::Connecting);
    assert_eq!(tracker.next_update().await, None);
    assert_eq!(tracker.quests().len(), 1);
}

#[tokio::test]
async fn run__applies_updates_until_closed() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();
    indexer.emit_entities(vec![advancement_entity(NS, alice(), 1, 1, 1)]);
    indexer.close_subscriptions();

    tracker.run().await;

    assert_eq!(tracker.quests()[0].progression, 50.0);
    assert!(!tracker.is_subscribed());
}

#[tokio::test]
async fn shutdown__cancels_live_subscriptions() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();

    tracker.shutdown();

    assert_eq!(indexer.live_subscriptions(), 0);
    assert_eq!(tracker.state(), TrackerState::Connecting);
    assert_eq!(tracker.quests().len(), 1);
}

#[tokio::test]
async fn drop__cancels_live_subscriptions() {
    let indexer = world();
    let mut tracker = tracker(&indexer);
    tracker.set_account(Some(alice())).await.unwrap();

    drop(tracker);

    assert_eq!(indexer.live_subscriptions(), 0);
}

#[tokio::test]
async fn reproject__interval_rollover__resets_recurring_progress() {
    // given
    let recurring = entity(
        NS,
        "QuestDefinition",
        felt(9),
        serde_json::json!({
            "id": felt(1).to_hex(),
            "start": 0,
            "end": 0,
            "duration": 100,
            "interval": 100,
            "tasks": [{ "id": felt(1).to_hex(), "total": 1, "description": "" }],
            "conditions": [],
        }),
    );
    let indexer = FakeIndexer::new()
        .with_entities(vec![recurring, advancement_entity(NS, alice(), 1, 1, 1)])
        .with_event_messages(vec![creation_entity(NS, 1, "Daily")]);
    let mut tracker = QuestTracker::new(
        indexer.clone(),
        RecordingToaster::new(),
        EngineConfig::default(),
    )
    .with_clock(|| 50);
    tracker.set_account(Some(alice())).await.unwrap();
    assert_eq!(tracker.quests()[0].progression, 100.0);

    // when
    tracker = tracker.with_clock(|| 150);
    tracker.reproject();

    // then
    assert_eq!(tracker.quests()[0].interval_id, 1);
    assert_eq!(tracker.quests()[0].progression, 0.0);
}
