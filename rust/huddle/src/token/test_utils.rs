use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::client::{TokenClient, TokenClientBuilder};

pub const OPENVIDU_TOKEN_PREFIX: &str = "ov_tok_";
pub const LIVEKIT_TOKEN_PREFIX: &str = "lk_tok_";
pub const TEST_MEDIA_URL: &str = "ws://media.test:7880";
/// Room name that makes every endpoint answer 500.
pub const FAIL_ROOM: &str = "fail-room";
/// Room name that makes the token endpoint answer with an empty token.
pub const EMPTY_TOKEN_ROOM: &str = "empty-room";

pub struct ServerHandle {
    url: String,
    join_handle: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.join_handle.abort()
    }
}

/// Starts a token server that speaks both the OpenVidu and LiveKit flows.
pub async fn create_test_server() -> ServerHandle {
    let app = Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/{session_id}/connections",
            post(create_connection_handler),
        )
        .route("/token", post(room_token_handler))
        .route("/fail/{code}", post(fail_handler));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let join_handle = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    ServerHandle {
        url: format!("http://{addr}"),
        join_handle,
    }
}

/// Creates a test client pointed at the given base URL.
pub fn create_test_client(url: &str) -> TokenClient {
    TokenClientBuilder::new(url).build().unwrap()
}

fn field<'a>(body: &'a Value, name: &str) -> &'a str {
    body.get(name).and_then(Value::as_str).unwrap_or_default()
}

async fn create_session_handler(Json(body): Json<Value>) -> Response {
    let room = field(&body, "customSessionId");
    if room == FAIL_ROOM {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(room).into_response()
}

async fn create_connection_handler(
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let identity = field(&body, "identity");
    Json(format!("{OPENVIDU_TOKEN_PREFIX}{session_id}:{identity}")).into_response()
}

async fn room_token_handler(Json(body): Json<Value>) -> Response {
    let room = field(&body, "roomName");
    let participant = field(&body, "participantName");
    match room {
        FAIL_ROOM => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "errorMessage": "token server unavailable" })),
        )
            .into_response(),
        EMPTY_TOKEN_ROOM => Json(json!({ "token": "" })).into_response(),
        _ => Json(json!({
            "token": format!("{LIVEKIT_TOKEN_PREFIX}{room}:{participant}"),
            "url": TEST_MEDIA_URL,
        }))
        .into_response(),
    }
}

async fn fail_handler(Path(code): Path<u16>) -> Response {
    match code {
        403 => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden by test" })),
        )
            .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
    }
}
