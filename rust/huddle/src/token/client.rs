use std::fmt::Display;
use std::time::Duration;

use percent_encoding::AsciiSet;
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::types::ErrorResponse;

/// Default time allowed for a single token request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const PATH_ENCODING: AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode_uri_component(component: &str) -> impl Display + '_ {
    percent_encoding::percent_encode(component.as_bytes(), &PATH_ENCODING)
}

/// A failed HTTP exchange with the token server.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    /// The request could not be sent or timed out.
    #[error("failed to send request: {0}")]
    SendRequest(#[source] reqwest::Error),

    /// The response body could not be read.
    #[error("failed to load response bytes: {0}")]
    LoadResponseBytes(#[source] reqwest::Error),

    /// The server answered with an error status and a structured body.
    #[error("received error response {status}: {error}")]
    ErrorResponse {
        /// HTTP status.
        status: StatusCode,
        /// Parsed error body.
        error: ErrorResponse,
        /// Response headers.
        headers: Box<HeaderMap>,
    },

    /// The server answered with an error status and an unrecognized body.
    #[error("received malformed error response {status} with body '{body}'")]
    MalformedErrorResponse {
        /// HTTP status.
        status: StatusCode,
        /// Raw body, lossily decoded.
        body: String,
        /// Response headers.
        headers: Box<HeaderMap>,
    },

    /// A successful response could not be parsed.
    #[error("failed to parse response: {0}")]
    ParseResponse(#[source] serde_json::Error),
}

/// An error fetching a credential.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TokenError {
    /// The HTTP exchange failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The HTTP client could not be constructed.
    #[error("failed to build client: {0}")]
    BuildClient(#[from] reqwest::Error),

    /// The server returned an empty value where one was required.
    #[error("token server returned an empty {0}")]
    EmptyResponse(&'static str),

    /// A non-HTTP provider refused to issue a credential.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

impl TokenError {
    /// Returns the HTTP status of an error response, if there was one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Request(
                RequestError::MalformedErrorResponse { status, .. }
                | RequestError::ErrorResponse { status, .. },
            ) => Some(*status),
            _ => None,
        }
    }

    /// Returns the server-provided message of a structured error response.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Request(RequestError::ErrorResponse { error, .. }) => Some(&error.message),
            _ => None,
        }
    }
}

#[must_use]
pub(crate) struct RequestBuilder(reqwest::RequestBuilder);

impl RequestBuilder {
    fn new(client: &reqwest::Client, method: Method, url: &str, user_agent: &str) -> Self {
        Self(client.request(method, url).header(USER_AGENT, user_agent))
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.0 = self.0.json(body);
        self
    }

    pub async fn send(self) -> Result<reqwest::Response, RequestError> {
        let response = self.0.send().await.map_err(RequestError::SendRequest)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let headers = Box::new(response.headers().clone());
            let body = response.bytes().await.unwrap_or_default();
            return Err(match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(error) => RequestError::ErrorResponse {
                    status,
                    error,
                    headers,
                },
                Err(_) => RequestError::MalformedErrorResponse {
                    status,
                    body: String::from_utf8_lossy(&body).to_string(),
                    headers,
                },
            });
        }

        Ok(response)
    }

    /// Sends the request and parses a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        let response = self.send().await?;
        let bytes = response
            .bytes()
            .await
            .map_err(RequestError::LoadResponseBytes)?;
        serde_json::from_slice(&bytes).map_err(RequestError::ParseResponse)
    }
}

pub(crate) fn default_user_agent() -> String {
    format!("huddle/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP client for a token server.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl TokenClient {
    fn new(
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        timeout_duration: Duration,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            http: reqwest::ClientBuilder::new()
                .timeout(timeout_duration)
                .build()?,
            base_url: base_url.into(),
            user_agent: user_agent.into(),
        })
    }

    /// Returns the server's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        RequestBuilder::new(&self.http, method, &url, &self.user_agent)
    }

    pub(crate) fn post(&self, endpoint: &str) -> RequestBuilder {
        self.request(Method::POST, endpoint)
    }
}

/// Builds a [`TokenClient`].
#[must_use]
pub struct TokenClientBuilder {
    base_url: String,
    user_agent: String,
    timeout_duration: Duration,
}

impl TokenClientBuilder {
    /// Starts a builder for the token server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: default_user_agent(),
            timeout_duration: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<TokenClient, TokenError> {
        TokenClient::new(self.base_url, self.user_agent, self.timeout_duration)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reqwest::StatusCode;

    use super::*;
    use crate::token::test_utils::{create_test_client, create_test_server};

    #[test]
    fn path_components_are_escaped() {
        assert_eq!(encode_uri_component("Session A/1").to_string(), "Session%20A%2F1");
        assert_eq!(encode_uri_component("a-b.c_d~e").to_string(), "a-b.c_d~e");
    }

    #[tokio::test]
    async fn structured_error_response() {
        let server = create_test_server().await;
        let client = create_test_client(server.url());
        let result = client
            .post("/fail/403")
            .send()
            .await
            .map_err(TokenError::from);
        let err = result.unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::FORBIDDEN));
        assert_eq!(err.server_message(), Some("forbidden by test"));
    }

    #[tokio::test]
    async fn malformed_error_response() {
        let server = create_test_server().await;
        let client = create_test_client(server.url());
        let err = client.post("/fail/500").send().await.unwrap_err();
        assert_matches!(
            err,
            RequestError::MalformedErrorResponse { status, ref body, .. }
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
        );
    }

    #[tokio::test]
    async fn unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = TokenClientBuilder::new(url)
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let err = client.post("token").send().await.unwrap_err();
        assert_matches!(err, RequestError::SendRequest(_));
    }
}
