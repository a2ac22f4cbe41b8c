use async_trait::async_trait;

use super::client::{TokenClient, TokenError};
use super::types::{RoomTokenRequest, TokenResponse};
use super::{Credential, TokenProvider};
use crate::identity::{Identity, RoomId};

/// Single-step token flow: `POST token` with `{roomName, participantName}` returns `{token}`.
///
/// The participant label is sent as the participant name, so it becomes the identity the media
/// server reports to other participants.
#[derive(Clone)]
pub struct LivekitTokenProvider {
    client: TokenClient,
}

impl LivekitTokenProvider {
    /// Creates a provider backed by `client`.
    pub fn new(client: TokenClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenProvider for LivekitTokenProvider {
    async fn fetch_token(
        &self,
        room: &RoomId,
        identity: &Identity,
    ) -> Result<Credential, TokenError> {
        let response: TokenResponse = self
            .client
            .post("token")
            .json(&RoomTokenRequest {
                room_name: room.as_str(),
                participant_name: identity.label().as_str(),
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

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reqwest::StatusCode;

    use super::*;
    use crate::token::test_utils::{
        create_test_client, create_test_server, EMPTY_TOKEN_ROOM, FAIL_ROOM,
        LIVEKIT_TOKEN_PREFIX, TEST_MEDIA_URL,
    };
    use crate::token::RequestError;

    #[tokio::test]
    async fn fetch_token_success() {
        let server = create_test_server().await;
        let provider = LivekitTokenProvider::new(create_test_client(server.url()));
        let identity = Identity::with_label("Alice", "alice-0001");
        let credential = provider
            .fetch_token(&RoomId::new("room1").unwrap(), &identity)
            .await
            .expect("could not fetch token");
        assert_eq!(
            credential.token(),
            format!("{LIVEKIT_TOKEN_PREFIX}room1:alice-0001")
        );
        assert_eq!(credential.url(), Some(TEST_MEDIA_URL));
    }

    #[tokio::test]
    async fn server_error_message_is_surfaced() {
        let server = create_test_server().await;
        let provider = LivekitTokenProvider::new(create_test_client(server.url()));
        let identity = Identity::with_label("Bob", "bob-0002");
        let err = provider
            .fetch_token(&RoomId::new(FAIL_ROOM).unwrap(), &identity)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.server_message(), Some("token server unavailable"));
        assert_matches!(err, TokenError::Request(RequestError::ErrorResponse { .. }));
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let server = create_test_server().await;
        let provider = LivekitTokenProvider::new(create_test_client(server.url()));
        let identity = Identity::with_label("Carol", "carol-0003");
        let err = provider
            .fetch_token(&RoomId::new(EMPTY_TOKEN_ROOM).unwrap(), &identity)
            .await
            .unwrap_err();
        assert_matches!(err, TokenError::EmptyResponse("token"));
    }
}
