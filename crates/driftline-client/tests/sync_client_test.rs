//! End-to-end engine scenarios driven through [`SyncClient::handle`].

#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use driftline_client::{RoomId, SyncAction, SyncClient, SyncConfig, SyncEvent};
use driftline_core::Environment;
use driftline_core::env::test_utils::MockEnv;
use driftline_proto::{ChatMessage, Destination, HistoryPage, ReceiptKind, Topic};

fn client(env: &MockEnv) -> SyncClient<MockEnv> {
    SyncClient::new(env.clone(), SyncConfig::new("ada"))
}

/// Connect and complete the handshake; returns the establishment actions.
fn establish(client: &mut SyncClient<MockEnv>, session_id: u64) -> Vec<SyncAction> {
    client.handle(SyncEvent::Connect).unwrap();
    client.handle(SyncEvent::HandshakeSucceeded { session_id }).unwrap()
}

fn subscribed_topics(actions: &[SyncAction]) -> Vec<Topic> {
    actions
        .iter()
        .filter_map(|a| match a {
            SyncAction::Subscribe { topic } => Some(topic.clone()),
            _ => None,
        })
        .collect()
}

fn publishes_to(actions: &[SyncAction], destination: Destination) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, SyncAction::Publish { destination: d, .. } if *d == destination))
        .count()
}

fn history_request(actions: &[SyncAction]) -> (u64, RoomId) {
    actions
        .iter()
        .find_map(|a| match a {
            SyncAction::FetchHistory { request_id, room_id, .. } => {
                Some((*request_id, room_id.clone()))
            },
            _ => None,
        })
        .unwrap()
}

fn chat(id: &str, ts: i64) -> ChatMessage {
    let mut m = ChatMessage::chat(RoomId::global(), "bob", "hi", ts);
    m.id = Some(id.to_string());
    m
}

fn payload(client: &mut SyncClient<MockEnv>, topic: &str, body: String) -> Vec<SyncAction> {
    client
        .handle(SyncEvent::PayloadReceived { topic: topic.to_string(), body })
        .unwrap()
}

#[test]
fn session_establishment_subscribes_fetches_and_resets() {
    let env = MockEnv::new();
    let mut client = client(&env);
    let actions = establish(&mut client, 1);

    let topics = subscribed_topics(&actions);
    assert_eq!(topics.len(), 9);
    assert!(topics.contains(&Topic::RoomFeed(RoomId::global())));
    assert!(topics.contains(&Topic::Presence));
    assert!(actions.contains(&SyncAction::FetchOnlineUsers));
    assert!(actions.contains(&SyncAction::TimelineReset { room_id: RoomId::global() }));
    history_request(&actions);
}

#[test]
fn initial_page_merges_ascending_and_exhausts() {
    let env = MockEnv::new();
    let mut client = client(&env);
    let actions = establish(&mut client, 1);
    let (request_id, room_id) = history_request(&actions);

    // Backend returns newest-first
    let page = HistoryPage { items: vec![chat("m2", 20), chat("m1", 10)], is_last: true };
    let actions = client.handle(SyncEvent::HistoryPage { request_id, room_id, page }).unwrap();
    assert!(actions.contains(&SyncAction::HistoryApplied {
        room_id: RoomId::global(),
        inserted: 2,
        has_more: false,
    }));

    let ids: Vec<_> = client.timeline().iter().map(|m| m.id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    // Exhausted: loading more is a no-op
    assert!(client.handle(SyncEvent::LoadOlder).unwrap().is_empty());
}

#[test]
fn reconnect_resubscribes_same_set_and_flushes_queue_once() {
    let env = MockEnv::new();
    let mut client = client(&env);
    let first = establish(&mut client, 1);

    client.handle(SyncEvent::TransportLost { reason: "socket reset".into() }).unwrap();

    // Sent while reconnecting: queued, not published, not dropped
    let actions = client
        .handle(SyncEvent::SendChat { content: "offline hello".into(), attachment: None })
        .unwrap();
    assert_eq!(publishes_to(&actions, Destination::SendChat), 0);
    assert!(!actions.iter().any(|a| matches!(a, SyncAction::Log { .. })));

    // Backoff elapses and the retry opens a new transport
    env.advance(Duration::from_secs(3));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert!(actions.contains(&SyncAction::OpenTransport));

    let second = client.handle(SyncEvent::HandshakeSucceeded { session_id: 2 }).unwrap();
    assert_eq!(subscribed_topics(&first), subscribed_topics(&second));
    assert_eq!(publishes_to(&second, Destination::SendChat), 1);

    // A later session must not replay the flushed frame
    client.handle(SyncEvent::TransportLost { reason: "socket reset".into() }).unwrap();
    env.advance(Duration::from_secs(3));
    client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    let third = client.handle(SyncEvent::HandshakeSucceeded { session_id: 3 }).unwrap();
    assert_eq!(publishes_to(&third, Destination::SendChat), 0);
}

#[test]
fn duplicate_connect_queues_sends_during_the_settle_gap() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    // A second connect supersedes the live session
    let actions = client.handle(SyncEvent::Connect).unwrap();
    assert!(actions.iter().any(|a| matches!(a, SyncAction::CloseTransport { .. })));

    // The old subscriptions are gone; this must queue, not publish
    let actions = client
        .handle(SyncEvent::SendChat { content: "mid-gap".into(), attachment: None })
        .unwrap();
    assert_eq!(publishes_to(&actions, Destination::SendChat), 0);
    assert!(!actions.iter().any(|a| matches!(a, SyncAction::Log { .. })));

    // The replacement session flushes the queued frame exactly once
    env.advance(Duration::from_millis(500));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert!(actions.contains(&SyncAction::OpenTransport));
    let actions = client.handle(SyncEvent::HandshakeSucceeded { session_id: 2 }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::SendChat), 1);
}

#[test]
fn send_while_fully_disconnected_is_dropped_with_a_log() {
    let env = MockEnv::new();
    let mut client = client(&env);
    let actions =
        client.handle(SyncEvent::SendChat { content: "into the void".into(), attachment: None }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::SendChat), 0);
    assert!(actions.iter().any(|a| matches!(a, SyncAction::Log { .. })));
}

#[test]
fn typing_indicator_self_heals_after_lost_stop() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let body = serde_json::json!({
        "username": "bob",
        "roomId": "global",
        "typing": true,
        "timestamp": 0,
    })
    .to_string();
    let actions = payload(&mut client, "/topic/typing", body);
    assert!(actions.contains(&SyncAction::TypingChanged {
        room_id: RoomId::global(),
        users: vec!["bob".to_string()],
    }));

    // The stop event never arrives
    env.advance(Duration::from_secs(3));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert!(actions.contains(&SyncAction::TypingChanged {
        room_id: RoomId::global(),
        users: Vec::new(),
    }));
}

#[test]
fn own_typing_broadcast_is_ignored() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let body = serde_json::json!({
        "username": "ada",
        "roomId": "global",
        "typing": true,
    })
    .to_string();
    assert!(payload(&mut client, "/topic/typing", body).is_empty());
}

#[test]
fn local_typing_burst_publishes_start_then_auto_stop() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let actions = client.handle(SyncEvent::LocalInput { has_text: true }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::TypingStart), 1);
    // Further keystrokes stay silent
    let actions = client.handle(SyncEvent::LocalInput { has_text: true }).unwrap();
    assert!(actions.is_empty());

    env.advance(Duration::from_millis(1000));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::TypingStop), 1);
}

#[test]
fn orphan_receipt_applies_when_its_message_arrives() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let receipt = serde_json::json!({ "messageId": "42", "username": "bob", "kind": "READ" });
    let actions = payload(&mut client, "/topic/read-receipt.global", receipt.to_string());
    assert!(actions.is_empty());

    let body = serde_json::to_string(&chat("42", 100)).unwrap();
    let actions = payload(&mut client, "/topic/room.global", body);
    assert!(actions.iter().any(|a| matches!(a, SyncAction::MessageReceived { .. })));
    assert!(actions.contains(&SyncAction::ReceiptApplied {
        room_id: RoomId::global(),
        message_id: "42".to_string(),
        username: "bob".to_string(),
        kind: ReceiptKind::Read,
    }));

    assert!(client.timeline()[0].read_by.contains("bob"));
}

#[test]
fn orphan_receipt_expires_silently() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let receipt = serde_json::json!({ "messageId": "42", "username": "bob", "kind": "READ" });
    payload(&mut client, "/topic/read-receipt.global", receipt.to_string());

    env.advance(Duration::from_secs(31));
    client.handle(SyncEvent::Tick { now: env.now() }).unwrap();

    let body = serde_json::to_string(&chat("42", 100)).unwrap();
    let actions = payload(&mut client, "/topic/room.global", body);
    assert!(!actions.iter().any(|a| matches!(a, SyncAction::ReceiptApplied { .. })));
}

#[test]
fn double_delivery_on_both_feeds_collapses_to_one_entry() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let body = serde_json::to_string(&chat("7", 100)).unwrap();
    let first = payload(&mut client, "/topic/room.global", body.clone());
    let second = payload(&mut client, "/topic/messages/global", body);

    assert_eq!(
        first.iter().filter(|a| matches!(a, SyncAction::MessageReceived { .. })).count(),
        1
    );
    assert!(!second.iter().any(|a| matches!(a, SyncAction::MessageReceived { .. })));
    assert_eq!(client.timeline().len(), 1);
}

#[test]
fn switch_room_moves_room_bound_subscriptions_in_place() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let dev = RoomId::from("dev");
    let actions = client.handle(SyncEvent::SwitchRoom { room_id: dev.clone() }).unwrap();

    assert!(!actions.contains(&SyncAction::OpenTransport));
    assert!(actions.contains(&SyncAction::Unsubscribe {
        topic: Topic::RoomFeed(RoomId::global())
    }));
    assert!(actions.contains(&SyncAction::Subscribe { topic: Topic::RoomFeed(dev.clone()) }));
    assert!(actions.contains(&SyncAction::TimelineReset { room_id: dev.clone() }));
    let (_, room_id) = history_request(&actions);
    assert_eq!(room_id, dev);

    // Switching to the active room is a no-op
    assert!(client.handle(SyncEvent::SwitchRoom { room_id: dev }).unwrap().is_empty());
}

#[test]
fn stale_history_response_after_switch_is_discarded() {
    let env = MockEnv::new();
    let mut client = client(&env);
    let actions = establish(&mut client, 1);
    let (request_id, room_id) = history_request(&actions);

    client.handle(SyncEvent::SwitchRoom { room_id: RoomId::from("dev") }).unwrap();

    let page = HistoryPage { items: vec![chat("old", 1)], is_last: true };
    let actions = client.handle(SyncEvent::HistoryPage { request_id, room_id, page }).unwrap();
    assert!(!actions.iter().any(|a| matches!(a, SyncAction::HistoryApplied { .. })));
    assert!(client.timeline().is_empty());
    assert!(client.timeline_in(&RoomId::global()).is_empty());
}

#[test]
fn mark_room_read_publishes_and_mirrors() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let actions = client.handle(SyncEvent::MarkRoomRead).unwrap();
    assert_eq!(publishes_to(&actions, Destination::MarkRead), 1);
    assert!(actions.contains(&SyncAction::MirrorMarkRead {
        room_id: RoomId::global(),
        username: "ada".to_string(),
    }));
}

#[test]
fn heartbeat_publishes_on_cadence() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    env.advance(Duration::from_secs(29));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::Heartbeat), 0);

    env.advance(Duration::from_secs(1));
    let actions = client.handle(SyncEvent::Tick { now: env.now() }).unwrap();
    assert_eq!(publishes_to(&actions, Destination::Heartbeat), 1);
}

#[test]
fn presence_snapshot_and_deltas_merge() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    // Delta beats the snapshot fetch; it must not be lost
    let delta = serde_json::json!({ "username": "eve", "online": true });
    payload(&mut client, "/topic/presence", delta.to_string());

    let actions = client
        .handle(SyncEvent::OnlineUsersFetched { usernames: vec!["ada".into(), "bob".into()] })
        .unwrap();
    assert!(actions.contains(&SyncAction::OnlineUsersChanged {
        online: vec!["ada".to_string(), "bob".to_string(), "eve".to_string()],
    }));

    let offline = serde_json::json!({ "username": "bob", "online": false, "lastSeen": 123 });
    let actions = payload(&mut client, "/topic/presence", offline.to_string());
    assert!(actions.iter().any(|a| matches!(a, SyncAction::PresenceChanged { .. })));
    assert_eq!(client.online_users(), vec!["ada".to_string(), "eve".to_string()]);
}

#[test]
fn malformed_payload_logs_and_never_errors() {
    let env = MockEnv::new();
    let mut client = client(&env);
    establish(&mut client, 1);

    let actions = payload(&mut client, "/topic/room.global", "not json".to_string());
    assert_eq!(actions.len(), 1);
    assert!(matches!(actions[0], SyncAction::Log { .. }));

    let actions = payload(&mut client, "/topic/not-a-topic", "{}".to_string());
    assert!(matches!(actions[0], SyncAction::Log { .. }));
}
