use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use huddle::transport::loopback::{LoopbackHub, LOOPBACK_URL};
use huddle::{ParticipantIdentity, RoomId};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::debug;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSession {
    custom_session_id: String,
}

#[derive(Deserialize)]
struct CreateConnection {
    identity: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomToken {
    room_name: String,
    participant_name: String,
}

struct MockState {
    hub: Arc<LoopbackHub>,
    sessions: Mutex<HashSet<String>>,
    failure: Mutex<Option<(StatusCode, String)>>,
    requests: AtomicUsize,
}

impl MockState {
    /// Counts a request and returns the injected failure, if any.
    fn begin(&self) -> Result<(), Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match self.failure.lock().take() {
            Some((status, message)) => Err(error_response(status, &message)),
            None => Ok(()),
        }
    }
}

/// A token server that issues credentials for a [`LoopbackHub`].
///
/// Speaks both the OpenVidu two-step flow and the LiveKit single-step flow.
pub struct TokenServerHandle {
    url: String,
    state: Arc<MockState>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl TokenServerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Makes the next request fail with `status` and a JSON error body carrying `message`.
    pub fn fail_next(&self, status: StatusCode, message: impl Into<String>) {
        *self.state.failure.lock() = Some((status, message.into()));
    }

    /// Returns the number of requests served so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::Relaxed)
    }
}

impl Drop for TokenServerHandle {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

/// Starts a mock token server backed by `hub`.
pub async fn start_token_server(hub: Arc<LoopbackHub>) -> TokenServerHandle {
    let state = Arc::new(MockState {
        hub,
        sessions: Mutex::default(),
        failure: Mutex::default(),
        requests: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/{session_id}/connections",
            post(create_connection_handler),
        )
        .route("/token", post(room_token_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let join_handle = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    TokenServerHandle {
        url: format!("http://{addr}"),
        state,
        join_handle,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn create_session_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<CreateSession>,
) -> Response {
    if let Err(response) = state.begin() {
        return response;
    }
    debug!("session {} requested", body.custom_session_id);
    state
        .sessions
        .lock()
        .insert(body.custom_session_id.clone());
    Json(json!({ "id": body.custom_session_id })).into_response()
}

async fn create_connection_handler(
    State(state): State<Arc<MockState>>,
    Path(session_id): Path<String>,
    Json(body): Json<CreateConnection>,
) -> Response {
    if let Err(response) = state.begin() {
        return response;
    }
    if !state.sessions.lock().contains(&session_id) {
        return error_response(StatusCode::NOT_FOUND, "session not found");
    }
    let Ok(room) = RoomId::new(&session_id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid session id");
    };
    let credential = state
        .hub
        .issue_token(&room, &ParticipantIdentity::from(body.identity));
    Json(json!({ "token": credential.token() })).into_response()
}

async fn room_token_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<RoomToken>,
) -> Response {
    if let Err(response) = state.begin() {
        return response;
    }
    let Ok(room) = RoomId::new(&body.room_name) else {
        return error_response(StatusCode::BAD_REQUEST, "roomName is required");
    };
    let credential = state
        .hub
        .issue_token(&room, &ParticipantIdentity::from(body.participant_name));
    Json(json!({ "token": credential.token(), "url": LOOPBACK_URL })).into_response()
}
