//! Server locations and session settings.

use std::time::Duration;

use crate::devices::CaptureConstraints;
use crate::identity::RoomId;
use crate::token::{TokenClient, TokenClientBuilder, TokenError, DEFAULT_TIMEOUT};

const TOKEN_SERVER_URL_ENV: &str = "HUDDLE_TOKEN_SERVER_URL";
const MEDIA_SERVER_URL_ENV: &str = "HUDDLE_MEDIA_SERVER_URL";
const TOKEN_TIMEOUT_ENV: &str = "HUDDLE_TOKEN_TIMEOUT";

/// Room joined when the user does not pick one.
pub const DEFAULT_ROOM: &str = "SessionA";

/// Where the token server and the media server live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrls {
    /// Base URL of the token server.
    pub token_server: String,
    /// WebSocket URL of the media server.
    pub media_server: String,
}

impl ServerUrls {
    /// Derives the default server locations from the hostname the client was served from.
    ///
    /// On `localhost` both servers are reached over plain HTTP/WS on their development ports.
    /// Anywhere else they are reached over TLS on the same host.
    pub fn for_host(hostname: &str) -> Self {
        if hostname == "localhost" {
            Self {
                token_server: "http://localhost:6080/".to_string(),
                media_server: "ws://localhost:7880/".to_string(),
            }
        } else {
            Self {
                token_server: format!("https://{hostname}:6443/"),
                media_server: format!("wss://{hostname}:7443/"),
            }
        }
    }
}

/// Settings for a [`SessionManager`](crate::SessionManager).
///
/// Values not set explicitly fall back to the `HUDDLE_TOKEN_SERVER_URL`,
/// `HUDDLE_MEDIA_SERVER_URL` and `HUDDLE_TOKEN_TIMEOUT` (seconds) environment variables, and
/// then to the defaults for the configured hostname.
#[derive(Debug, Clone)]
#[must_use]
pub struct SessionConfig {
    hostname: String,
    token_server_url: Option<String>,
    media_server_url: Option<String>,
    token_timeout: Option<Duration>,
    default_room: RoomId,
    capture: CaptureConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Creates a configuration for a client served from `localhost`.
    pub fn new() -> Self {
        Self {
            hostname: "localhost".to_string(),
            token_server_url: None,
            media_server_url: None,
            token_timeout: None,
            default_room: RoomId::from_trusted(DEFAULT_ROOM),
            capture: CaptureConstraints::default(),
        }
    }

    /// Sets the hostname used to derive default server URLs.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the token server URL.
    pub fn token_server_url(mut self, url: impl Into<String>) -> Self {
        self.token_server_url = Some(url.into());
        self
    }

    /// Sets the media server URL used when a credential does not carry one.
    pub fn media_server_url(mut self, url: impl Into<String>) -> Self {
        self.media_server_url = Some(url.into());
        self
    }

    /// Sets the timeout for token requests.
    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = Some(timeout);
        self
    }

    /// Sets the room suggested by [`JoinDefaults`](crate::JoinDefaults).
    pub fn default_room(mut self, room: RoomId) -> Self {
        self.default_room = room;
        self
    }

    /// Sets the capture constraints used when publishing on join.
    pub fn capture_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.capture = constraints;
        self
    }

    /// Returns the suggested room.
    pub fn default_room_id(&self) -> &RoomId {
        &self.default_room
    }

    /// Returns the capture constraints used on join.
    pub fn constraints(&self) -> &CaptureConstraints {
        &self.capture
    }

    /// Resolves the server locations, consulting the environment for unset values.
    pub fn server_urls(&self) -> ServerUrls {
        self.server_urls_with(|key| std::env::var(key).ok())
    }

    fn server_urls_with(&self, env: impl Fn(&str) -> Option<String>) -> ServerUrls {
        let defaults = ServerUrls::for_host(&self.hostname);
        ServerUrls {
            token_server: self
                .token_server_url
                .clone()
                .or_else(|| env(TOKEN_SERVER_URL_ENV))
                .unwrap_or(defaults.token_server),
            media_server: self
                .media_server_url
                .clone()
                .or_else(|| env(MEDIA_SERVER_URL_ENV))
                .unwrap_or(defaults.media_server),
        }
    }

    /// Resolves the token request timeout, consulting the environment if unset.
    pub fn resolved_token_timeout(&self) -> Duration {
        self.token_timeout_with(|key| std::env::var(key).ok())
    }

    fn token_timeout_with(&self, env: impl Fn(&str) -> Option<String>) -> Duration {
        self.token_timeout
            .or_else(|| {
                env(TOKEN_TIMEOUT_ENV)
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
            })
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Builds an HTTP client for the configured token server.
    pub fn token_client(&self) -> Result<TokenClient, TokenError> {
        TokenClientBuilder::new(self.server_urls().token_server)
            .timeout(self.resolved_token_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn localhost_uses_development_ports() {
        let urls = ServerUrls::for_host("localhost");
        assert_eq!(urls.token_server, "http://localhost:6080/");
        assert_eq!(urls.media_server, "ws://localhost:7880/");
    }

    #[test]
    fn remote_host_uses_tls_ports() {
        let urls = ServerUrls::for_host("meet.example.com");
        assert_eq!(urls.token_server, "https://meet.example.com:6443/");
        assert_eq!(urls.media_server, "wss://meet.example.com:7443/");
    }

    #[test]
    fn environment_overrides_host_defaults() {
        let config = SessionConfig::new().hostname("meet.example.com");
        let urls = config.server_urls_with(env_from(&[(
            TOKEN_SERVER_URL_ENV,
            "https://tokens.internal/",
        )]));
        assert_eq!(urls.token_server, "https://tokens.internal/");
        assert_eq!(urls.media_server, "wss://meet.example.com:7443/");
    }

    #[test]
    fn explicit_values_beat_environment() {
        let config = SessionConfig::new()
            .media_server_url("ws://explicit:1234")
            .token_timeout(Duration::from_secs(3));
        let env = env_from(&[
            (MEDIA_SERVER_URL_ENV, "ws://from-env"),
            (TOKEN_TIMEOUT_ENV, "9"),
        ]);
        assert_eq!(
            config.server_urls_with(&env).media_server,
            "ws://explicit:1234"
        );
        assert_eq!(config.token_timeout_with(&env), Duration::from_secs(3));
    }

    #[test]
    fn timeout_from_environment() {
        let config = SessionConfig::new();
        assert_eq!(
            config.token_timeout_with(env_from(&[(TOKEN_TIMEOUT_ENV, "5")])),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.token_timeout_with(env_from(&[(TOKEN_TIMEOUT_ENV, "soon")])),
            DEFAULT_TIMEOUT
        );
    }

    #[test]
    fn default_room() {
        assert_eq!(SessionConfig::new().default_room_id().as_str(), "SessionA");
    }
}
