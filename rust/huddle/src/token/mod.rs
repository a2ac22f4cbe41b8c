//! Credentials for joining a room.
//!
//! Media servers admit a client only with a short-lived credential minted by a token server.
//! Two HTTP flows are supported: the two-step OpenVidu flow ([`OpenViduTokenProvider`]) and the
//! single-step LiveKit flow ([`LivekitTokenProvider`]).

use std::fmt;

use async_trait::async_trait;

use crate::identity::{Identity, RoomId};

mod client;
mod livekit_server;
mod openvidu;
#[cfg(test)]
mod test_utils;
mod types;

pub use client::{RequestError, TokenClient, TokenClientBuilder, TokenError, DEFAULT_TIMEOUT};
pub use livekit_server::LivekitTokenProvider;
pub use openvidu::OpenViduTokenProvider;
pub use types::ErrorResponse;

/// A credential admitting one participant to one room.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    url: Option<String>,
}

impl Credential {
    /// Wraps an opaque token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: None,
        }
    }

    /// Attaches the media server URL the token is valid for.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Returns the opaque token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the media server URL, if the token server supplied one.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("url", &self.url)
            .finish()
    }
}

/// Issues credentials for a room.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a credential for `identity` to join `room`.
    async fn fetch_token(&self, room: &RoomId, identity: &Identity)
        -> Result<Credential, TokenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let credential = Credential::new("secret-jwt").with_url("wss://media");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("wss://media"));
    }
}
