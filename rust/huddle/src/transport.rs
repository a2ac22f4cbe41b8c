//! Media transport abstraction.
//!
//! A [`Transport`] opens a [`Connection`] to a media server and hands back a stream of
//! [`TransportEvent`]s. The session manager drains that stream from a single task, so
//! implementations only need to preserve delivery order.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::identity::ParticipantIdentity;
use crate::token::Credential;
use crate::track::{LocalTrack, RemoteTrack, TrackKind, TrackSid};

#[cfg(feature = "livekit")]
pub mod livekit_room;
pub mod loopback;

/// Sending half of a connection's event stream.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
/// Receiving half of a connection's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// A remote participant as described by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipantInfo {
    /// Identity within the room.
    pub identity: ParticipantIdentity,
    /// Raw connection metadata.
    pub metadata: Option<String>,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// This client asked to disconnect.
    ClientInitiated,
    /// The server is shutting down.
    ServerShutdown,
    /// The participant was removed from the room.
    ParticipantRemoved,
    /// The room was closed.
    RoomDeleted,
    /// Another connection took over this identity.
    DuplicateIdentity,
    /// The network connection was lost.
    ConnectionLost,
    /// Any other reason.
    Unknown,
}

impl DisconnectReason {
    /// Returns true if this client initiated the disconnect.
    pub fn is_client_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ClientInitiated)
    }

    /// Returns a short tag for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ClientInitiated => "client initiated",
            DisconnectReason::ServerShutdown => "server shutdown",
            DisconnectReason::ParticipantRemoved => "participant removed",
            DisconnectReason::RoomDeleted => "room deleted",
            DisconnectReason::DuplicateIdentity => "duplicate identity",
            DisconnectReason::ConnectionLost => "connection lost",
            DisconnectReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event reported by a connection.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TransportEvent {
    /// A participant entered the room.
    ParticipantConnected(RemoteParticipantInfo),
    /// A participant left the room.
    ParticipantDisconnected(ParticipantIdentity),
    /// A remote track became available to render.
    TrackSubscribed {
        /// The publisher.
        participant: RemoteParticipantInfo,
        /// The subscribed track.
        track: RemoteTrack,
    },
    /// A remote track stopped being available.
    TrackUnsubscribed {
        /// The publisher.
        participant: ParticipantIdentity,
        /// The track that went away.
        sid: TrackSid,
        /// Its media kind.
        kind: TrackKind,
    },
    /// The transport reported a non-fatal problem.
    Exception {
        /// Description of the problem.
        message: String,
    },
    /// The connection ended.
    Disconnected {
        /// Why it ended.
        reason: DisconnectReason,
    },
}

/// Options for opening a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Metadata announced to the other participants.
    pub metadata: Option<String>,
    /// Subscribe to remote tracks as they are published.
    pub auto_subscribe: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            metadata: None,
            auto_subscribe: true,
        }
    }
}

/// An error from the media transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The server refused or could not be reached.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// The server rejected the credential.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    /// The track is not published on this connection.
    #[error("unknown track {0}")]
    UnknownTrack(TrackSid),
    /// The connection is no longer usable.
    #[error("connection closed")]
    Closed,
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Opens connections to a media server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to `url` using `credential`.
    ///
    /// Events start flowing into the returned receiver immediately, including the participants
    /// and tracks already in the room.
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Connection>, EventReceiver), TransportError>;
}

/// An open connection to a room.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returns this client's identity in the room.
    fn local_identity(&self) -> ParticipantIdentity;

    /// Publishes a local track.
    async fn publish(&self, track: &LocalTrack) -> Result<TrackSid, TransportError>;

    /// Withdraws a published local track.
    async fn unpublish(&self, sid: &TrackSid) -> Result<(), TransportError>;

    /// Stops receiving a remote track.
    async fn unsubscribe(&self, sid: &TrackSid) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
