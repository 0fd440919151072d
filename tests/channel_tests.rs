//! Channel manager integration tests.
//!
//! Drive a `ChannelManager` through the scripted `MockConnector` from
//! `tests/common` and check both outputs, connection status and the
//! reconnection schedule.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use botc_room_client::protocol::{Participant, RoomEvent, RoomPatch};
use botc_room_client::{
    BotcError, ChannelManager, ClientConfig, ClientMessage, ConnectionStatus, ImperativeMessage,
    ReconnectPolicy, RoomSessionRole, VisitorIdentity,
};
use serde_json::json;
use tokio_test::{assert_pending, assert_ready};

use common::{
    channel, entries, hello_json, journal, phase_change_json, setup_tasks_json,
    spectator_joined_json, state_json, task_done_json, wait_until, MockConnector,
};

// ════════════════════════════════════════════════════════════════════
// Connecting
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn spectator_receives_state_with_two_seats() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());

    spectator.connect("abc123").await.unwrap();
    assert_eq!(connector.urls(), ["ws://test/ws/abc123/room"]);
    assert_eq!(spectator.status(), ConnectionStatus::Connected);

    server.push(state_json(&[(1, None), (2, Some(("v-bob", "Bob")))]));
    wait_until(|| spectator.latest_snapshot().is_some()).await;

    let snapshot = spectator.latest_snapshot().unwrap();
    assert_eq!(snapshot.seats().len(), 2);
    assert_eq!(snapshot.seat_of("v-bob"), Some(2));
}

#[tokio::test]
async fn role_endpoints_use_their_own_paths() {
    let connector = MockConnector::new(journal());
    let _player_server = connector.accept();
    let _st_server = connector.accept();

    let mut player = channel(RoomSessionRole::Player, connector.clone());
    let mut storyteller = channel(RoomSessionRole::Storyteller, connector.clone());
    player.connect("r1").await.unwrap();
    storyteller.connect("r1").await.unwrap();

    assert_eq!(
        connector.urls(),
        ["ws://test/ws/r1/player/v-alice", "ws://test/ws/r1/st"]
    );
}

#[tokio::test]
async fn missing_room_id_fails_fast_without_opening() {
    let connector = MockConnector::new(journal());
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());

    let err = spectator.connect("  ").await.unwrap_err();
    assert!(matches!(err, BotcError::Connection(_)));
    assert_eq!(connector.attempts(), 0);
    assert_eq!(spectator.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn player_channel_requires_a_visitor_id() {
    let connector = MockConnector::new(journal());
    let anonymous = VisitorIdentity {
        id: String::new(),
        name: "Nobody".into(),
    };
    let mut player = ChannelManager::new(
        RoomSessionRole::Player,
        anonymous,
        connector.clone(),
        &ClientConfig::default(),
    );

    let err = player.connect("r1").await.unwrap_err();
    assert!(matches!(err, BotcError::Connection(_)));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn initial_open_failure_is_surfaced_and_not_retried() {
    let connector = MockConnector::new(journal());
    connector.refuse(1);
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());

    let err = spectator.connect("r1").await.unwrap_err();
    assert!(matches!(err, BotcError::Connection(_)));
    assert_eq!(spectator.status(), ConnectionStatus::Disconnected);
    assert!(spectator.target().is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_is_reported() {
    struct NeverOpens;

    #[async_trait::async_trait]
    impl botc_room_client::Connector for NeverOpens {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<Box<dyn botc_room_client::Transport>, BotcError> {
            std::future::pending().await
        }
    }

    let config = ClientConfig::default().with_connect_timeout(Duration::from_secs(3));
    let mut spectator = ChannelManager::new(
        RoomSessionRole::Spectator,
        common::visitor(),
        std::sync::Arc::new(NeverOpens),
        &config,
    );
    let err = spectator.connect("r1").await.unwrap_err();
    assert!(matches!(err, BotcError::Timeout));
}

#[tokio::test]
async fn reconnecting_to_the_same_room_is_a_no_op() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());

    spectator.connect("r1").await.unwrap();
    server.push(state_json(&[(1, None)]));
    wait_until(|| spectator.latest_snapshot().is_some()).await;

    spectator.connect("r1").await.unwrap();
    assert_eq!(connector.attempts(), 1);
    assert!(!server.is_closed());
    assert!(spectator.latest_snapshot().is_some());
}

#[tokio::test]
async fn connecting_elsewhere_closes_the_old_socket_first() {
    let log = journal();
    let connector = MockConnector::new(log.clone());
    let first = connector.accept();
    let _second = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());

    spectator.connect("r1").await.unwrap();
    first.push(state_json(&[(1, None)]));
    wait_until(|| spectator.latest_snapshot().is_some()).await;

    spectator.connect("r2").await.unwrap();
    assert!(first.is_closed());
    assert!(spectator.latest_snapshot().is_none());
    assert_eq!(
        entries(&log),
        [
            "open ws://test/ws/r1/room",
            "close ws://test/ws/r1/room",
            "open ws://test/ws/r2/room",
        ]
    );
}

// ════════════════════════════════════════════════════════════════════
// Frame routing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn snapshot_is_last_write_wins() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());
    spectator.connect("r1").await.unwrap();

    server.push(state_json(&[(1, None), (2, None), (3, None)]));
    server.push(state_json(&[(1, Some(("v-cara", "Cara")))]));
    wait_until(|| spectator.latest_snapshot().is_some_and(|s| s.seats().len() == 1)).await;

    let snapshot = spectator.latest_snapshot().unwrap();
    assert_eq!(snapshot.seat_of("v-cara"), Some(1));
}

#[tokio::test]
async fn seats_survive_the_round_trip_unchanged() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());
    spectator.connect("r1").await.unwrap();

    // Storyteller-shaped seats: numeric ids, an explicit null role, a role
    // object without an id and fields the client does not model.
    let sent = json!([
        {"seat": 1, "occupant": {"id": 7, "name": "Ann", "seat": 1, "role": null}},
        {"seat": 2, "occupant": {"id": "v-ben", "name": "Ben", "seat": 2, "role": {"id": "imp"}}},
        {
            "seat": 3,
            "occupant": {"id": 9, "name": "Cy", "seat": 3, "role": {"id": null}, "nominated": true}
        },
        {"seat": 4, "occupant": null, "marker": "empty"}
    ]);
    server.push(json!({"type": "state", "view": {"seats": sent}}).to_string());
    wait_until(|| spectator.latest_snapshot().is_some()).await;

    let snapshot = spectator.latest_snapshot().unwrap();
    assert_eq!(serde_json::to_value(snapshot.seats()).unwrap(), sent);
    assert_eq!(snapshot.seat_of("7"), Some(1));
    assert!(snapshot.is_my_seat(3, "9"));

    let occupants: Vec<_> = snapshot.seats().iter().filter_map(|s| s.occupant.as_ref()).collect();
    assert_eq!(occupants[0].role_id(), None);
    assert_eq!(occupants[1].role_id(), Some("imp"));
}

#[tokio::test]
async fn unknown_frames_leave_both_outputs_unchanged() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());
    spectator.connect("r1").await.unwrap();

    server.push(state_json(&[(1, None)]));
    server.push(task_done_json(1));
    wait_until(|| spectator.latest_imperative().is_some()).await;
    let snapshot_before = spectator.latest_snapshot();
    let imperative_before = spectator.latest_imperative();

    server.push(r#"{"type":"unknown"}"#);
    server.push("not json at all");
    // A later frame proves the bad ones were consumed.
    server.push(hello_json());
    server.push(task_done_json(2));
    wait_until(|| spectator.pending_imperatives() == 2).await;

    assert_eq!(spectator.latest_snapshot(), snapshot_before);
    assert_eq!(
        spectator.drain_imperatives(),
        [
            imperative_before.unwrap(),
            ImperativeMessage::Event(RoomEvent::TaskDone { id: 2 })
        ]
    );
    assert_eq!(spectator.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn bursts_of_imperatives_are_all_delivered_in_order() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut storyteller = channel(RoomSessionRole::Storyteller, connector.clone());
    storyteller.connect("r1").await.unwrap();

    server.push(spectator_joined_json("v-bob", "Bob"));
    server.push(setup_tasks_json(&[1, 2]));
    server.push(phase_change_json(1));
    server.push(r#"{"type":"error","error":"room_not_found"}"#);
    wait_until(|| storyteller.pending_imperatives() == 4).await;

    assert_eq!(
        storyteller.latest_imperative(),
        Some(ImperativeMessage::ServerError("room_not_found".into()))
    );

    let first = storyteller.try_next_imperative().unwrap();
    assert_eq!(
        first,
        ImperativeMessage::Event(RoomEvent::SpectatorJoined(Participant {
            id: "v-bob".into(),
            name: "Bob".into(),
            seat: None,
        }))
    );
    assert_eq!(first.describe().as_deref(), Some("Bob is spectating"));

    let tasks = storyteller.try_next_imperative().unwrap();
    assert_eq!(tasks.setup_tasks().map(<[_]>::len), Some(2));

    let patch = storyteller.try_next_imperative().unwrap();
    assert!(matches!(
        patch,
        ImperativeMessage::Patch(RoomPatch::PhaseChange { .. })
    ));

    assert!(matches!(
        storyteller.try_next_imperative(),
        Some(ImperativeMessage::ServerError(_))
    ));
    assert!(storyteller.try_next_imperative().is_none());
    // Peeking is unaffected by consumption.
    assert!(storyteller.latest_imperative().is_some());
}

#[tokio::test]
async fn next_imperative_waits_for_a_message() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut storyteller = channel(RoomSessionRole::Storyteller, connector.clone());
    storyteller.connect("r1").await.unwrap();

    let mut next = tokio_test::task::spawn(storyteller.next_imperative());
    assert_pending!(next.poll());

    server.push(r#"{"type":"event","event":"setup_complete"}"#);
    wait_until(|| next.is_woken()).await;

    let message = assert_ready!(next.poll());
    assert_eq!(message, ImperativeMessage::Event(RoomEvent::SetupComplete));
}

// ════════════════════════════════════════════════════════════════════
// Sending
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn send_writes_through_the_open_socket() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut storyteller = channel(RoomSessionRole::Storyteller, connector.clone());
    storyteller.connect("r1").await.unwrap();

    assert!(storyteller.send(ClientMessage::Ping { t: 42 }));
    wait_until(|| !server.sent().is_empty()).await;
    assert_eq!(server.sent_json(), [json!({"type": "ping", "t": 42})]);
}

#[tokio::test]
async fn send_without_a_socket_is_a_silent_no_op() {
    let connector = MockConnector::new(journal());
    let storyteller = channel(RoomSessionRole::Storyteller, connector);
    assert!(!storyteller.send(ClientMessage::GetState));
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn lost_socket_reconnects_with_backoff_and_resyncs() {
    let connector = MockConnector::new(journal());
    let first = connector.accept();
    connector.refuse(1);
    let second = connector.accept();

    let config = common::config().with_reconnect_policy(ReconnectPolicy::from_millis(1000, 15_000));
    let mut spectator = ChannelManager::new(
        RoomSessionRole::Spectator,
        common::visitor(),
        connector.clone(),
        &config,
    );
    spectator.connect("r1").await.unwrap();
    let mut status = spectator.watch_status();

    first.drop_connection();
    wait_until(|| spectator.status() == ConnectionStatus::Reconnecting { attempt: 1 }).await;
    assert_eq!(spectator.reconnect_attempts(), 1);
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Reconnecting { attempt: 1 });

    // First retry after ~1s.
    tokio::time::advance(Duration::from_millis(999)).await;
    assert_eq!(connector.attempts(), 1);
    tokio::time::advance(Duration::from_millis(1)).await;
    wait_until(|| connector.attempts() == 2).await;

    // That one is refused; the next waits ~2s.
    wait_until(|| spectator.status() == ConnectionStatus::Reconnecting { attempt: 2 }).await;
    tokio::time::advance(Duration::from_millis(1999)).await;
    assert_eq!(connector.attempts(), 2);
    tokio::time::advance(Duration::from_millis(1)).await;
    wait_until(|| spectator.status() == ConnectionStatus::Connected).await;

    assert_eq!(spectator.reconnect_attempts(), 0);
    wait_until(|| !second.sent().is_empty()).await;
    assert_eq!(second.sent_json(), [json!({"type": "get_state"})]);

    second.push(state_json(&[(1, None)]));
    wait_until(|| spectator.latest_snapshot().is_some()).await;
}

#[tokio::test(start_paused = true)]
async fn receive_errors_also_trigger_reconnection() {
    let connector = MockConnector::new(journal());
    let first = connector.accept();
    let _second = connector.accept();
    let mut player = channel(RoomSessionRole::Player, connector.clone());
    player.connect("r1").await.unwrap();

    first.fail("connection reset");
    wait_until(|| player.status().is_reconnecting()).await;
    assert!(!player.send(ClientMessage::GetState));

    tokio::time::advance(Duration::from_millis(500)).await;
    wait_until(|| player.status().is_connected()).await;
    assert_eq!(
        connector.urls(),
        ["ws://test/ws/r1/player/v-alice", "ws://test/ws/r1/player/v-alice"]
    );
}

#[tokio::test(start_paused = true)]
async fn close_during_backoff_stops_reconnecting() {
    let connector = MockConnector::new(journal());
    let first = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());
    spectator.connect("r1").await.unwrap();

    first.drop_connection();
    wait_until(|| spectator.status().is_reconnecting()).await;

    spectator.close().await;
    assert_eq!(spectator.status(), ConnectionStatus::Closed);

    tokio::time::advance(Duration::from_secs(60)).await;
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    assert_eq!(connector.attempts(), 1);
    assert_eq!(spectator.status(), ConnectionStatus::Closed);
}

// ════════════════════════════════════════════════════════════════════
// Closing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn close_clears_outputs_and_is_idempotent() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut storyteller = channel(RoomSessionRole::Storyteller, connector.clone());
    storyteller.connect("r1").await.unwrap();

    server.push(state_json(&[(1, None)]));
    server.push(task_done_json(3));
    wait_until(|| storyteller.pending_imperatives() == 1).await;
    wait_until(|| storyteller.latest_snapshot().is_some()).await;

    storyteller.close().await;
    assert!(server.is_closed());
    assert!(storyteller.latest_snapshot().is_none());
    assert!(storyteller.latest_imperative().is_none());
    assert_eq!(storyteller.pending_imperatives(), 0);
    assert_eq!(storyteller.status(), ConnectionStatus::Closed);

    storyteller.close().await;
    assert_eq!(storyteller.status(), ConnectionStatus::Closed);
    assert!(!storyteller.send(ClientMessage::GetState));
}

#[tokio::test]
async fn frames_after_close_are_never_published() {
    let connector = MockConnector::new(journal());
    let server = connector.accept();
    let mut spectator = channel(RoomSessionRole::Spectator, connector.clone());
    spectator.connect("r1").await.unwrap();
    spectator.close().await;

    server.push(state_json(&[(1, None)]));
    server.push(task_done_json(1));
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    assert!(spectator.latest_snapshot().is_none());
    assert!(spectator.latest_imperative().is_none());
}
