//! Sessions that fetch credentials through the LiveKit room token flow.

use assert_matches::assert_matches;
use axum::http::StatusCode;
use huddle::testutil::{assert_eventually, with_timeout, ListenerEvent};
use huddle::tiles;
use huddle::transport::loopback::LoopbackHub;
use huddle::{Role, RoomId, SessionError, SessionState, SwitchOutcome};
use huddle_tests::mock_server::start_token_server;
use huddle_tests::{TestClient, TokenFlow, TIMEOUT};

fn room() -> RoomId {
    RoomId::new("standup").unwrap()
}

#[tokio::test]
async fn join_uses_single_token_request() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 1).unwrap();

    alice.join(&room(), Role::Talker).await.unwrap();
    assert_eq!(server.requests(), 1);
    assert_eq!(hub.participants(&room()), vec![alice.label().clone()]);
    assert_eq!(hub.published_tracks(&room(), alice.label()).len(), 2);

    alice.manager.leave().await;
    assert!(hub.participants(&room()).is_empty());
}

#[tokio::test]
async fn rejected_token_request() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 1).unwrap();

    server.fail_next(StatusCode::FORBIDDEN, "room is locked");
    let result = alice.join(&room(), Role::Talker).await;
    let error = assert_matches!(result, Err(SessionError::CredentialUnavailable(e)) => e);
    assert_eq!(error.status_code(), Some(StatusCode::FORBIDDEN));
    assert_eq!(error.server_message(), Some("room is locked"));
    assert_eq!(alice.manager.state(), SessionState::Idle);
    assert_eq!(
        alice.listener.states(),
        vec![SessionState::Connecting, SessionState::Idle]
    );
}

#[tokio::test]
async fn removed_by_moderator() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    let bob = TestClient::new("Bob", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    alice.join(&room(), Role::Talker).await.unwrap();
    bob.join(&room(), Role::Talker).await.unwrap();
    alice.wait_for_peers(1, 2).await;
    bob.wait_for_peers(1, 2).await;

    assert!(hub.remove_participant(&room(), alice.label()));

    let manager = alice.manager.clone();
    assert_eventually(TIMEOUT, move || manager.state() == SessionState::Idle).await;
    assert_eq!(alice.devices.live_captures(), 0);
    assert!(alice.manager.snapshot().participants.is_empty());

    // Bob sees Alice go away and stays connected.
    bob.wait_for_peers(0, 0).await;
    assert_eq!(bob.manager.state(), SessionState::Connected);

    // Alice can come back.
    alice.join(&room(), Role::Talker).await.unwrap();
    bob.wait_for_peers(1, 2).await;
}

#[tokio::test]
async fn room_closed_under_everyone() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    let bob = TestClient::new("Bob", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    alice.join(&room(), Role::Talker).await.unwrap();
    bob.join(&room(), Role::Watcher).await.unwrap();

    hub.close_room(&room());

    for client in [&alice, &bob] {
        let mut state = client.manager.watch_state();
        with_timeout(TIMEOUT, state.wait_for(|s| *s == SessionState::Idle))
            .await
            .unwrap();
        assert_eq!(client.devices.live_captures(), 0);
    }
}

#[tokio::test]
async fn transport_exception_is_not_fatal() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    alice.join(&room(), Role::Talker).await.unwrap();

    hub.raise_exception(&room(), alice.label(), "ice candidate failed");
    let listener = alice.listener.clone();
    assert_eventually(TIMEOUT, move || {
        listener
            .events()
            .contains(&ListenerEvent::Exception("ice candidate failed".to_string()))
    })
    .await;
    assert_eq!(alice.manager.state(), SessionState::Connected);
    assert!(alice.manager.snapshot().publication.is_some());
}

#[tokio::test]
async fn tiles_follow_the_room() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::Livekit, 3).unwrap();
    let bob = TestClient::new("Bob", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    let carol = TestClient::new("Carol", &hub, &server, TokenFlow::Livekit, 1).unwrap();
    alice.join(&room(), Role::Talker).await.unwrap();
    bob.join(&room(), Role::Talker).await.unwrap();
    carol.join(&room(), Role::Watcher).await.unwrap();
    alice.wait_for_peers(1, 2).await;

    let rendered = tiles::render(&tiles::layout(&alice.manager.snapshot()));
    assert_eq!(
        rendered,
        "video Alice (talker) [you]\nvideo Bob (talker)\naudio Bob (talker)"
    );

    let outcome = alice.manager.switch_video_source(None).await.unwrap();
    assert_matches!(outcome, SwitchOutcome::Switched(device) if device.id.0 == "synthetic-camera-1");
    let snapshot = carol.manager.snapshot();
    assert!(tiles::layout(&snapshot).iter().all(|t| !t.is_local()));
}
