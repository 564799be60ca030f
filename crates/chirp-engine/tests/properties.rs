//! 판정/구독 불변식 테스트.

mod common;

use chirp_core::models::event::ConversationType;
use chirp_core::models::notification::{Decision, SuppressReason};
use chirp_core::models::wire::OutboundCommand;
use common::*;
use serde_json::Value;

#[tokio::test(start_paused = true)]
async fn own_events_never_alert_or_count() {
    let mut h = Harness::start(0, MockApi::with_friends(&["p"])).await;
    let link = h.connected_link().await;

    let own: Vec<Value> = vec![
        direct_message("m1", ME, "p"),
        group_message("g1", ME, "team"),
        post_like("l1", ME),
    ];
    for event in own {
        link.push(event).await;
    }
    settle().await;

    let notifications = h.notifications();
    assert_eq!(notifications.len(), 3);
    assert!(notifications
        .iter()
        .all(|n| n.decision.decision == Decision::Suppress(SuppressReason::SelfOrigin)));
    assert!(h.unread_changes().is_empty());
    assert_eq!(h.alert_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn active_view_suppresses_but_bus_fires_once() {
    let mut h = Harness::start(0, MockApi::with_friends(&[])).await;
    let link = h.connected_link().await;

    h.session.set_active_view("team", ConversationType::Group);
    link.push(group_message("g1", "q", "team")).await;
    // 같은 ID의 1:1 대화는 활성 뷰가 아니다
    link.push(direct_message("m1", "q", "team")).await;
    settle().await;

    let notifications = h.notifications();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].event.id, "g1");
    assert_eq!(
        notifications[0].decision.decision,
        Decision::Suppress(SuppressReason::ActiveView)
    );
    assert_eq!(notifications[1].decision.decision, Decision::ShowLocal);
    assert_eq!(h.alert_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_subscribe_sends_one_wire_call() {
    let mut h = Harness::start(0, MockApi::with_friends(&[])).await;
    let mut link = h.connected_link().await;

    h.session.set_friends(vec!["a".to_string()]);
    h.session.set_friends(vec!["a".to_string()]);
    h.session.set_active_view("a", ConversationType::Personal);
    settle().await;
    assert_eq!(subscribes(&link.drain()), vec!["a"]);

    // 해제 후 다시 구독하면 새 호출
    h.session.clear_active_view();
    h.session.set_friends(Vec::new());
    h.session.set_friends(vec!["a".to_string()]);
    settle().await;
    assert_eq!(
        link.drain(),
        vec![OutboundCommand::unsubscribe("a"), OutboundCommand::subscribe("a")]
    );
}

#[tokio::test(start_paused = true)]
async fn reconnect_resends_exactly_desired_set() {
    let mut h = Harness::start(0, MockApi::with_friends(&["a", "b", "c"])).await;
    let mut first = h.connected_link().await;
    first.drain();

    h.session.set_friends(vec!["b".to_string(), "c".to_string()]);
    h.session.set_active_view("x", ConversationType::Personal);
    settle().await;
    first.drain();
    let desired: Vec<String> = h.session.registry().desired_set().into_iter().collect();

    first.close().await;
    let mut second = h.connected_link().await;

    assert_eq!(subscribes(&second.drain()), desired);
    assert_eq!(desired, vec!["b", "c", "x"]);
}

#[tokio::test(start_paused = true)]
async fn changes_while_disconnected_are_resent_once() {
    let mut h = Harness::start(0, MockApi::with_friends(&["a"])).await;
    let first = h.connected_link().await;

    h.transport.fail_next(2);
    first.close().await;
    settle().await;

    // 끊긴 동안의 변경은 재연결 스냅샷에 흡수된다
    h.session.set_friends(vec!["a".to_string(), "b".to_string()]);
    h.session.set_friends(vec!["b".to_string()]);

    let mut second = h.connected_link().await;
    assert_eq!(second.drain(), vec![OutboundCommand::subscribe("b")]);
}

#[tokio::test(start_paused = true)]
async fn replayed_batch_does_not_double_count() {
    let api = MockApi::with_friends(&["p"]);
    let mut h = Harness::start(0, api).await;
    let link = h.connected_link().await;

    let batch = vec![
        direct_message("m1", "p", "p"),
        direct_message("m2", "p", "p"),
        post_like("l1", "q"),
    ];
    for event in batch.iter().cloned() {
        link.push(event).await;
    }
    settle().await;
    let total = h.session.unread_total();
    let alerts = h.alert_count();

    for event in batch {
        link.push(event).await;
    }
    settle().await;

    assert_eq!(total, 3);
    assert_eq!(h.session.unread_total(), total);
    assert_eq!(h.alert_count(), alerts);
    assert_eq!(h.notifications().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn push_delivered_event_is_not_replayed_live() {
    let mut h = Harness::start(0, MockApi::with_friends(&["p"])).await;
    let link = h.connected_link().await;

    h.session.record_push_delivered("m1");
    link.push(direct_message("m1", "p", "p")).await;
    settle().await;

    assert_eq!(h.alert_count(), 0);
    assert!(h.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_live_events_are_dropped() {
    let mut h = Harness::start(0, MockApi::with_friends(&["p"])).await;
    let link = h.connected_link().await;

    link.push(serde_json::json!({"type": "message_new", "id": "m1"}))
        .await;
    link.push(serde_json::json!({"id": "m2"})).await;
    link.push(direct_message("m3", "p", "p")).await;
    settle().await;

    let ids: Vec<String> = h
        .notifications()
        .into_iter()
        .map(|n| n.event.id)
        .collect();
    assert_eq!(ids, vec!["m3"]);
}

#[tokio::test(start_paused = true)]
async fn event_without_origin_is_treated_as_foreign() {
    let mut h = Harness::start(0, MockApi::with_friends(&["p"])).await;
    let link = h.connected_link().await;

    link.push(serde_json::json!({
        "type": "message_new",
        "id": "m1",
        "conversation_id": "p",
    }))
    .await;
    settle().await;

    assert_eq!(h.alert_count(), 1);
    assert_eq!(h.session.unread_total(), 1);
}
