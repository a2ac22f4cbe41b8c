use std::fmt;

use serde::{Deserialize, Serialize};

/// Body of `POST api/sessions`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionRequest<'a> {
    pub custom_session_id: &'a str,
}

/// Body of `POST api/sessions/{id}/connections`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConnectionRequest<'a> {
    pub identity: &'a str,
}

/// Body of `POST token`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomTokenRequest<'a> {
    pub room_name: &'a str,
    pub participant_name: &'a str,
}

/// A session id, returned either as a bare JSON string or inside an object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum SessionResponse {
    Id(String),
    Object {
        #[serde(alias = "sessionId", alias = "customSessionId")]
        id: String,
    },
}

impl SessionResponse {
    pub fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// A connection token, returned either as a bare JSON string or inside an object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum TokenResponse {
    Token(String),
    Object {
        token: String,
        #[serde(default, alias = "serverUrl", alias = "wsUrl")]
        url: Option<String>,
    },
}

impl TokenResponse {
    pub fn into_parts(self) -> (String, Option<String>) {
        match self {
            Self::Token(token) => (token, None),
            Self::Object { token, url } => (token, url),
        }
    }
}

/// An error body from the token server.
#[derive(Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    /// Server-provided description.
    #[serde(alias = "errorMessage", alias = "error")]
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_response_shapes() {
        let bare: SessionResponse = serde_json::from_str(r#""SessionA""#).unwrap();
        assert_eq!(bare.into_id(), "SessionA");
        let object: SessionResponse = serde_json::from_str(r#"{"sessionId":"SessionB"}"#).unwrap();
        assert_eq!(object.into_id(), "SessionB");
        let object: SessionResponse = serde_json::from_str(r#"{"id":"SessionC","x":1}"#).unwrap();
        assert_eq!(object.into_id(), "SessionC");
    }

    #[test]
    fn token_response_shapes() {
        let bare: TokenResponse = serde_json::from_str(r#""tok""#).unwrap();
        assert_eq!(bare.into_parts(), ("tok".to_string(), None));
        let object: TokenResponse =
            serde_json::from_str(r#"{"token":"tok","url":"wss://media"}"#).unwrap();
        assert_eq!(
            object.into_parts(),
            ("tok".to_string(), Some("wss://media".to_string()))
        );
        assert!(serde_json::from_str::<TokenResponse>(r#"{"jwt":"tok"}"#).is_err());
    }

    #[test]
    fn error_response_keys() {
        for body in [
            r#"{"errorMessage":"room is full"}"#,
            r#"{"message":"room is full"}"#,
            r#"{"error":"room is full","status":403}"#,
        ] {
            let error: ErrorResponse = serde_json::from_str(body).unwrap();
            assert_eq!(error.to_string(), "room is full");
        }
    }

    #[test]
    fn request_bodies_are_camel_case() {
        let body = serde_json::to_string(&RoomTokenRequest {
            room_name: "r",
            participant_name: "p",
        })
        .unwrap();
        assert_eq!(body, r#"{"roomName":"r","participantName":"p"}"#);
        let body = serde_json::to_string(&CreateSessionRequest {
            custom_session_id: "SessionA",
        })
        .unwrap();
        assert_eq!(body, r#"{"customSessionId":"SessionA"}"#);
    }
}
