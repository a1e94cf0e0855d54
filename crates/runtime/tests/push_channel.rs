//! Push adapter behavior: subscription lifecycle, frame routing, and
//! deduplication against polled rounds.

mod common;

use serde_json::json;

use combat_core::{Notification, SessionPhase};
use combat_runtime::{ConnectionEvent, Event, Topic};
use common::*;

#[tokio::test(start_paused = true)]
async fn round_from_both_channels_is_applied_once() {
    let api = MockApi::new();
    let push = MockPush::new();
    api.script_round(victory(501, 90));

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    handle.select_character(HERO, None).await.unwrap();
    push.wait_subscribed(HERO, 1).await;

    handle.start().await.unwrap();
    let polled = wait_until(&handle, |s| s.fighting).await;
    assert_eq!(log_ids(&polled), vec![501]);

    push.push(HERO, "combat.update", combat_update(501, HERO, 90)).await;
    push.push(HERO, "combat.update", combat_update(502, HERO, 84)).await;

    let snapshot = wait_until(&handle, |s| s.log.len() == 2).await;
    assert_eq!(log_ids(&snapshot), vec![502, 501]);
    assert_eq!(snapshot.current_hp, Some(84));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn retarget_unsubscribes_before_subscribing() {
    let api = MockApi::new();
    let push = MockPush::new();

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    handle.select_character(HERO, None).await.unwrap();
    push.wait_subscribed(HERO, 1).await;
    handle.select_character(ALT, None).await.unwrap();
    push.wait_subscribed(ALT, 1).await;

    assert_eq!(
        push.calls(),
        vec![
            PushCall::Subscribe(HERO),
            PushCall::Unsubscribe(HERO),
            PushCall::Subscribe(ALT),
        ]
    );

    // a frame tagged for the previous character never reaches the new session
    push.push_tagged(ALT, HERO, "combat.update", combat_update(8, HERO, 10))
        .await;
    push.push(ALT, "combat.update", combat_update(9, ALT, 55)).await;

    let snapshot = wait_until(&handle, |s| !s.log.is_empty()).await;
    assert_eq!(snapshot.character_id, ALT);
    assert_eq!(log_ids(&snapshot), vec![9]);
    assert_eq!(snapshot.current_hp, Some(55));

    handle.logout().await.unwrap();
    push.wait_for_calls(|calls| calls.last() == Some(&PushCall::Unsubscribe(ALT)))
        .await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_is_retried_and_replay_deduplicated() {
    let api = MockApi::new();
    let push = MockPush::new();

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    let mut connection = handle.subscribe(Topic::Connection);
    handle.select_character(HERO, None).await.unwrap();
    push.wait_subscribed(HERO, 1).await;

    push.push(HERO, "combat.update", combat_update(1, HERO, 90)).await;
    wait_until(&handle, |s| s.log.len() == 1).await;

    push.disconnect(HERO);
    push.wait_subscribed(HERO, 2).await;

    // the server replays the last round after reconnecting
    push.push(HERO, "combat.update", combat_update(1, HERO, 90)).await;
    push.push(HERO, "combat.update", combat_update(2, HERO, 88)).await;
    let snapshot = wait_until(&handle, |s| s.log.len() == 2).await;
    assert_eq!(log_ids(&snapshot), vec![2, 1]);

    let mut events = Vec::new();
    while let Ok(Event::Connection(event)) = connection.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            ConnectionEvent::Subscribed { character: HERO },
            ConnectionEvent::Disconnected { character: HERO },
            ConnectionEvent::Subscribed { character: HERO },
        ]
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_subscribe_is_retried() {
    let api = MockApi::new();
    let push = MockPush::new();
    push.fail_next_subscribes(2);

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    let mut connection = handle.subscribe(Topic::Connection);
    handle.select_character(HERO, None).await.unwrap();

    push.wait_subscribed(HERO, 3).await;
    push.push(HERO, "combat.update", combat_update(4, HERO, 70)).await;
    wait_until(&handle, |s| !s.log.is_empty()).await;

    let mut failures = 0;
    let mut subscribed = 0;
    while let Ok(Event::Connection(event)) = connection.try_recv() {
        match event {
            ConnectionEvent::SubscribeFailed { .. } => failures += 1,
            ConnectionEvent::Subscribed { .. } => subscribed += 1,
            _ => {}
        }
    }
    assert_eq!((failures, subscribed), (2, 1));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn loot_and_level_up_leave_combat_state_alone() {
    let api = MockApi::new();
    let push = MockPush::new();

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    let mut notifications = handle.subscribe(Topic::Notification);
    handle
        .select_character(HERO, Some(snapshot(HERO, 70)))
        .await
        .unwrap();
    push.wait_subscribed(HERO, 1).await;

    push.push(HERO, "loot.dropped", json!({"copper": 7}).to_string())
        .await;
    push.push(HERO, "level.up", json!({"level": 5}).to_string())
        .await;

    let snapshot = wait_until(&handle, |s| {
        s.character.as_ref().and_then(|c| c.level) == Some(5)
    })
    .await;
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(!snapshot.fighting);
    assert_eq!(snapshot.current_hp, Some(70));
    assert!(snapshot.log.is_empty());
    assert_eq!(snapshot.character.unwrap().currency, Some(7));

    assert!(matches!(
        notifications.recv().await.unwrap(),
        Event::Notification(Notification::LootDropped { currency: 7, .. })
    ));
    assert!(matches!(
        notifications.recv().await.unwrap(),
        Event::Notification(Notification::LevelUp { level: 5, .. })
    ));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unknown_and_malformed_frames_are_dropped() {
    let api = MockApi::new();
    let push = MockPush::new();

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    handle.select_character(HERO, None).await.unwrap();
    push.wait_subscribed(HERO, 1).await;

    push.push(HERO, "chat.message", json!({"text": "hi"}).to_string())
        .await;
    push.push(HERO, "combat.update", "not json".to_string()).await;
    push.push(HERO, "combat.update", combat_update(3, HERO, 64)).await;

    let snapshot = wait_until(&handle, |s| !s.log.is_empty()).await;
    assert_eq!(log_ids(&snapshot), vec![3]);
    assert!(snapshot.last_error.is_none());

    runtime.shutdown().await.unwrap();
}

/// Push-only defeat: the pushed round alone ends auto-combat.
#[tokio::test(start_paused = true)]
async fn pushed_auto_stop_defeats_session() {
    let api = MockApi::new();
    let push = MockPush::new();
    let gate = api.script_gated();

    let runtime = runtime(&api, Some(&push));
    let handle = runtime.handle();
    handle.select_character(HERO, None).await.unwrap();
    push.wait_subscribed(HERO, 1).await;
    handle.start().await.unwrap();
    api.wait_for_calls(|calls| calls.iter().any(|c| matches!(c, ApiCall::Resolve { .. })))
        .await;

    let data = json!({
        "combat_log_id": 77,
        "defeat": true,
        "auto_stopped": true,
        "current_hp": 0,
    })
    .to_string();
    push.push(HERO, "combat.update", data).await;

    let defeated = wait_until(&handle, |s| s.defeated).await;
    assert_eq!(defeated.current_hp, Some(0));
    assert_eq!(log_ids(&defeated), vec![77]);

    // the polled copy of the same round arrives late
    gate.release(Ok(defeat(77)));
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    let settled = handle.snapshot().unwrap();
    assert_eq!(log_ids(&settled), vec![77]);
    assert_eq!(api.resolve_calls(), 1);

    runtime.shutdown().await.unwrap();
}
