use std::fmt;

use super::participant::RemoteParticipant;
use super::publication::LocalPublication;
use crate::identity::{Identity, ParticipantIdentity, Role, RoomId};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session. The only state in which a join is accepted.
    #[default]
    Idle,
    /// A join is fetching a credential or opening the connection.
    Connecting,
    /// Connected to the room.
    Connected,
    /// A leave is tearing the session down.
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        })
    }
}

/// A consistent, read-only view of a session at one point in time.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Room of the current or in-flight join.
    pub room: Option<RoomId>,
    /// Local identity of the current or in-flight join.
    pub identity: Option<Identity>,
    /// Role of the current or in-flight join.
    pub role: Option<Role>,
    /// Active local publication.
    pub publication: Option<LocalPublication>,
    /// Remote participants with at least one track, in arrival order.
    pub participants: Vec<RemoteParticipant>,
}

impl SessionSnapshot {
    /// Returns the remote participant with `identity`.
    pub fn participant(&self, identity: &ParticipantIdentity) -> Option<&RemoteParticipant> {
        self.participants.iter().find(|p| p.identity() == identity)
    }

    /// Returns true if the session is connected.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}
