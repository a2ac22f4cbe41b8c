//! Participant identities, room identifiers and role labels.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SessionError;

/// The part a participant plays in a session.
///
/// The role selects which local media is published on join: talkers publish audio and video,
/// watchers only subscribe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publishes camera and microphone.
    #[default]
    Talker,
    /// Publishes nothing; receives remote media only.
    Watcher,
}

impl Role {
    /// Returns the lowercase tag used in metadata and captions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Talker => "talker",
            Role::Watcher => "watcher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "talker" => Ok(Role::Talker),
            "watcher" => Ok(Role::Watcher),
            other => Err(SessionError::InvalidJoinForm(format!("unknown role '{other}'"))),
        }
    }
}

/// Identifier of a participant within a room, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantIdentity(pub String);

impl ParticipantIdentity {
    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of a shared session. Supplied by the user and not globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a room identifier, rejecting blank names.
    pub fn new(id: impl AsRef<str>) -> Result<Self, SessionError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(SessionError::InvalidJoinForm(
                "room name is required".to_string(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub(crate) fn from_trusted(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The local participant's identity for one join attempt.
///
/// The label is the display name with a random suffix, so two people typing the same name can
/// still share a room. It is only unique for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    display_name: String,
    label: ParticipantIdentity,
}

impl Identity {
    /// Creates an identity with a freshly generated participant label.
    pub fn new(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into().trim().to_string();
        let suffix: u16 = rand::thread_rng().gen_range(0..=u16::MAX);
        let label = ParticipantIdentity(format!("{display_name}-{suffix:04x}"));
        Self {
            display_name,
            label,
        }
    }

    /// Creates an identity with an explicit participant label.
    pub fn with_label(
        display_name: impl Into<String>,
        label: impl Into<ParticipantIdentity>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            label: label.into(),
        }
    }

    /// Returns the human-readable name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the participant label used as the transport identity.
    pub fn label(&self) -> &ParticipantIdentity {
        &self.label
    }

    /// Serializes the connection metadata announced to other participants.
    pub fn metadata(&self, role: Role) -> String {
        let metadata = ParticipantMetadata {
            client_data: self.display_name.clone(),
            role: Some(role.as_str().to_string()),
        };
        // Serializing two plain strings cannot fail.
        serde_json::to_string(&metadata).unwrap_or_default()
    }
}

/// Structured metadata attached to a participant's connection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantMetadata {
    #[serde(default)]
    client_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

/// How a remote participant is presented: a display name plus an optional role tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantLabel {
    /// Name shown on the participant's tile.
    pub display_name: String,
    /// Role announced in the participant's metadata, if any.
    pub role: Option<Role>,
}

impl ParticipantLabel {
    /// Builds a label from a remote participant's connection metadata.
    ///
    /// Metadata is expected to be a JSON object with `clientData` and `role` fields. Anything
    /// else falls back to the raw identity with no role tag.
    pub fn from_metadata(identity: &ParticipantIdentity, metadata: Option<&str>) -> Self {
        let Some(metadata) = metadata.filter(|m| !m.trim().is_empty()) else {
            return Self::plain(identity);
        };
        match serde_json::from_str::<ParticipantMetadata>(metadata) {
            Ok(parsed) => {
                let role = parsed.role.and_then(|r| r.parse().ok());
                let display_name = if parsed.client_data.trim().is_empty() {
                    identity.to_string()
                } else {
                    parsed.client_data
                };
                Self { display_name, role }
            }
            Err(e) => {
                debug!("unstructured metadata for {identity}: {e}");
                Self::plain(identity)
            }
        }
    }

    fn plain(identity: &ParticipantIdentity) -> Self {
        Self {
            display_name: identity.to_string(),
            role: None,
        }
    }

    /// Returns the tile caption, e.g. `"Alice (talker)"`.
    pub fn caption(&self) -> String {
        match self.role {
            Some(role) => format!("{} ({role})", self.display_name),
            None => self.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn label_has_random_hex_suffix() {
        let identity = Identity::new("Alice");
        let label = identity.label().as_str();
        let suffix = label.strip_prefix("Alice-").expect("label keeps the display name");
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn display_name_is_trimmed() {
        assert_eq!(Identity::new("  Bob ").display_name(), "Bob");
    }

    #[test]
    fn blank_room_is_rejected() {
        assert_matches!(RoomId::new("   "), Err(SessionError::InvalidJoinForm(_)));
        assert_eq!(RoomId::new(" room1 ").unwrap().as_str(), "room1");
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Talker".parse::<Role>().unwrap(), Role::Talker);
        assert_eq!("watcher".parse::<Role>().unwrap(), Role::Watcher);
        assert!("speaker".parse::<Role>().is_err());
    }

    #[test]
    fn metadata_round_trips_into_label() {
        let identity = Identity::with_label("Alice", "alice-0001");
        let metadata = identity.metadata(Role::Watcher);
        let label = ParticipantLabel::from_metadata(identity.label(), Some(&metadata));
        assert_eq!(label.display_name, "Alice");
        assert_eq!(label.role, Some(Role::Watcher));
        assert_eq!(label.caption(), "Alice (watcher)");
    }

    #[test]
    fn unstructured_metadata_falls_back_to_identity() {
        let identity = ParticipantIdentity::from("bob-42");
        let label = ParticipantLabel::from_metadata(&identity, Some("Bob_talker"));
        assert_eq!(label.display_name, "bob-42");
        assert_eq!(label.role, None);
    }

    #[test]
    fn unknown_role_is_dropped() {
        let identity = ParticipantIdentity::from("carol");
        let label = ParticipantLabel::from_metadata(
            &identity,
            Some(r#"{"clientData":"Carol","role":"referee"}"#),
        );
        assert_eq!(label.display_name, "Carol");
        assert_eq!(label.role, None);
    }

    #[test]
    fn missing_metadata_uses_identity() {
        let identity = ParticipantIdentity::from("dave");
        assert_eq!(
            ParticipantLabel::from_metadata(&identity, None).caption(),
            "dave"
        );
    }
}
