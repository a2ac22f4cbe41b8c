use async_trait::async_trait;
use tracing::debug;

use super::client::{encode_uri_component, TokenClient, TokenError};
use super::types::{CreateConnectionRequest, CreateSessionRequest, SessionResponse, TokenResponse};
use super::{Credential, TokenProvider};
use crate::identity::{Identity, RoomId};

/// Two-step token flow: create (or reuse) a session, then create a connection in it.
///
/// The server is expected to expose `POST api/sessions` taking `{"customSessionId": room}` and
/// `POST api/sessions/{id}/connections` returning the connection token. Both responses may be a
/// bare JSON string or an object.
#[derive(Clone)]
pub struct OpenViduTokenProvider {
    client: TokenClient,
}

impl OpenViduTokenProvider {
    /// Creates a provider backed by `client`.
    pub fn new(client: TokenClient) -> Self {
        Self { client }
    }

    async fn create_session(&self, room: &RoomId) -> Result<String, TokenError> {
        let session: SessionResponse = self
            .client
            .post("api/sessions")
            .json(&CreateSessionRequest {
                custom_session_id: room.as_str(),
            })
            .send_json()
            .await?;
        let id = session.into_id();
        if id.is_empty() {
            return Err(TokenError::EmptyResponse("session id"));
        }
        Ok(id)
    }

    async fn create_connection(
        &self,
        session_id: &str,
        identity: &Identity,
    ) -> Result<Credential, TokenError> {
        let session_id = encode_uri_component(session_id);
        let response: TokenResponse = self
            .client
            .post(&format!("api/sessions/{session_id}/connections"))
            .json(&CreateConnectionRequest {
                identity: identity.label().as_str(),
            })
            .send_json()
            .await?;
        let (token, url) = response.into_parts();
        if token.is_empty() {
            return Err(TokenError::EmptyResponse("token"));
        }
        let credential = Credential::new(token);
        Ok(match url {
            Some(url) => credential.with_url(url),
            None => credential,
        })
    }
}

#[async_trait]
impl TokenProvider for OpenViduTokenProvider {
    async fn fetch_token(
        &self,
        room: &RoomId,
        identity: &Identity,
    ) -> Result<Credential, TokenError> {
        let session_id = self.create_session(room).await?;
        debug!("token server session {session_id} for room {room}");
        self.create_connection(&session_id, identity).await
    }
}
