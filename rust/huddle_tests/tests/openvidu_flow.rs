//! Sessions that fetch credentials through the OpenVidu session/connection flow.

use assert_matches::assert_matches;
use axum::http::StatusCode;
use huddle::testutil::{assert_eventually, ListenerEvent};
use huddle::transport::loopback::LoopbackHub;
use huddle::{JoinForm, Role, RoomId, SessionError, SessionState, TicketStore, TrackKind};
use huddle_tests::mock_server::start_token_server;
use huddle_tests::{TestClient, TokenFlow, TIMEOUT};

fn room() -> RoomId {
    RoomId::new("Session A").unwrap()
}

#[tokio::test]
async fn two_talkers_see_each_other() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();
    let bob = TestClient::new("Bob", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();

    alice.join(&room(), Role::Talker).await.unwrap();
    bob.join(&room(), Role::Talker).await.unwrap();
    assert_eq!(server.requests(), 4);

    alice.wait_for_peers(1, 2).await;
    bob.wait_for_peers(1, 2).await;

    let snapshot = alice.manager.snapshot();
    let remote = snapshot.participant(bob.label()).unwrap();
    assert_eq!(remote.label().caption(), "Bob (talker)");
    assert!(remote.track(TrackKind::Video).is_some());
    assert!(remote.track(TrackKind::Audio).is_some());

    bob.manager.leave().await;
    alice.wait_for_peers(0, 0).await;
    assert!(alice
        .listener
        .events()
        .contains(&ListenerEvent::ParticipantLeft(bob.label().clone())));
    assert_eq!(bob.devices.live_captures(), 0);

    alice.manager.leave().await;
    assert!(hub.participants(&room()).is_empty());
}

#[tokio::test]
async fn token_server_error_surfaces_message() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();

    server.fail_next(StatusCode::INTERNAL_SERVER_ERROR, "openvidu is restarting");
    let result = alice.join(&room(), Role::Talker).await;
    let error = assert_matches!(result, Err(SessionError::CredentialUnavailable(e)) => e);
    assert_eq!(error.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(error.server_message(), Some("openvidu is restarting"));

    assert_eq!(alice.manager.state(), SessionState::Idle);
    assert!(hub.participants(&room()).is_empty());
    assert_eq!(alice.devices.live_captures(), 0);

    // Retrying is up to the caller.
    alice.join(&room(), Role::Talker).await.unwrap();
    assert_eq!(alice.manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn watcher_receives_without_publishing() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let talker = TestClient::new("Talker", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();
    let watcher = TestClient::new("Watcher", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();

    talker.join(&room(), Role::Talker).await.unwrap();
    watcher.join(&room(), Role::Watcher).await.unwrap();

    watcher.wait_for_peers(1, 2).await;
    assert!(watcher.manager.snapshot().publication.is_none());
    assert_eq!(watcher.devices.live_captures(), 0);
    assert!(hub.published_tracks(&room(), watcher.label()).is_empty());

    // The talker never sees the watcher, who has no tracks.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(talker.manager.snapshot().participants.is_empty());
}

#[tokio::test]
async fn join_form_ticket_lifecycle() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let client = TestClient::new("Carol", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();
    let tickets = TicketStore::new();

    let defaults = client.manager.join_defaults();
    assert_eq!(defaults.room.as_str(), "SessionA");
    assert!(defaults.participant_name.starts_with("Participant"));

    let blank = JoinForm {
        participant_name: "  ".to_string(),
        ..JoinForm::from_defaults(&defaults)
    };
    assert_matches!(blank.validate(), Err(SessionError::InvalidJoinForm(_)));

    let form = JoinForm {
        participant_name: "Carol".to_string(),
        room: "Session A".to_string(),
        role: Role::Talker,
    };
    tickets.set(form.validate().unwrap());
    let ticket = tickets.get().unwrap();
    client.manager.join_ticket(&ticket).await.unwrap();

    let snapshot = client.manager.snapshot();
    let identity = snapshot.identity.as_ref().unwrap();
    assert_eq!(identity.display_name(), "Carol");
    assert_eq!(hub.participants(&room()), vec![identity.label().clone()]);

    client.manager.leave().await;
    assert!(tickets.clear().is_some());
    assert!(tickets.get().is_none());
    assert_eq!(client.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn remote_tracks_released_on_leave() {
    let hub = LoopbackHub::new();
    let server = start_token_server(hub.clone()).await;
    let alice = TestClient::new("Alice", &hub, &server, TokenFlow::OpenVidu, 2).unwrap();
    let bob = TestClient::new("Bob", &hub, &server, TokenFlow::OpenVidu, 1).unwrap();
    alice.join(&room(), Role::Talker).await.unwrap();
    bob.join(&room(), Role::Talker).await.unwrap();
    bob.wait_for_peers(1, 2).await;

    // A camera switch is seen by the other side as a replaced video track.
    alice.manager.switch_video_source(None).await.unwrap();
    let bob_manager = bob.manager.clone();
    let alice_label = alice.label().clone();
    let new_video = hub
        .published_tracks(&room(), alice.label())
        .into_iter()
        .find(|(_, kind)| *kind == TrackKind::Video)
        .map(|(sid, _)| sid)
        .unwrap();
    assert_eventually(TIMEOUT, move || {
        bob_manager
            .snapshot()
            .participant(&alice_label)
            .and_then(|p| p.track(TrackKind::Video))
            .is_some_and(|t| t.sid == new_video)
    })
    .await;

    bob.manager.leave().await;
    let detached = bob
        .listener
        .events()
        .into_iter()
        .filter(|e| matches!(e, ListenerEvent::TrackUnsubscribed { .. }))
        .count();
    // The old video, then the new video and the audio at leave.
    assert_eq!(detached, 3);
}
