//! Session lifecycle management for publish/subscribe media conferencing clients.
//!
//! This crate drives a client through a conferencing session on an SFU backend such as
//! [LiveKit] or [OpenVidu]: it fetches a short-lived credential from a token server, connects a
//! media transport, publishes local audio/video, and keeps a mirror of the remote participants
//! and tracks that the server reports. It renders nothing itself.
//!
//! [LiveKit]: https://livekit.io/
//! [OpenVidu]: https://openvidu.io/
//!
//! # Getting started
//!
//! A [`SessionManager`] is assembled from a [`SessionConfig`], a [`TokenProvider`], a
//! [`Transport`] and a set of [`MediaDevices`]. The loopback transport runs an in-process room,
//! which is handy for trying things out:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use huddle::transport::loopback::{LoopbackHub, LoopbackTokenProvider, LoopbackTransport};
//! use huddle::{Identity, Role, RoomId, SessionConfig, SessionManager};
//!
//! # async fn func() -> Result<(), huddle::SessionError> {
//! let hub = LoopbackHub::new();
//! let manager = SessionManager::builder(SessionConfig::new())
//!     .token_provider(Arc::new(LoopbackTokenProvider::new(hub.clone())))
//!     .transport(Arc::new(LoopbackTransport::new(hub)))
//!     .build()?;
//!
//! manager
//!     .join(Identity::new("Alice"), RoomId::new("room1")?, Role::Talker)
//!     .await?;
//! println!("{} remote participants", manager.snapshot().participants.len());
//! manager.leave().await;
//! # Ok(()) }
//! ```
//!
//! # Concepts
//!
//! ## Lifecycle
//!
//! A manager moves through `Idle → Connecting → Connected → Disconnecting → Idle`. Every
//! entity (the connection, the local publication, the remote participant set) is created during
//! [`SessionManager::join`] and destroyed during [`SessionManager::leave`]; nothing survives a
//! leave.
//!
//! ## Events
//!
//! Transport events are drained by a single task per connection, one at a time and in delivery
//! order. Renderers observe changes through a [`SessionListener`], or read a
//! [`SessionSnapshot`] at any time.
//!
//! # Requirements
//!
//! The crate depends on [tokio] as its async runtime. [`SessionManager::join`] spawns the event
//! task on the current runtime.
//!
//! [tokio]: https://docs.rs/tokio/latest/tokio/

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use thiserror::Error;

pub mod config;
pub mod context;
pub mod devices;
pub mod identity;
mod listener;
pub mod session;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod tiles;
pub mod token;
pub mod track;
pub mod transport;

pub use config::{ServerUrls, SessionConfig};
pub use context::{JoinDefaults, JoinForm, RoomTicket, TicketStore};
pub use devices::{CaptureConstraints, MediaDevices, MediaError, SyntheticDevices};
pub use identity::{Identity, ParticipantIdentity, ParticipantLabel, Role, RoomId};
pub use listener::SessionListener;
pub use session::{
    LocalPublication, PublishedTrack, RemoteParticipant, SessionManager, SessionManagerBuilder,
    SessionSnapshot, SessionState, SwitchOutcome,
};
pub use token::{Credential, TokenError, TokenProvider};
pub use track::{LocalTrack, RemoteTrack, TrackKind, TrackSid};
pub use transport::{Connection, Transport, TransportError, TransportEvent};

/// An error type for session operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// The token provider could not issue a credential for the join.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(#[source] TokenError),
    /// Local capture could not be started, e.g. no permission or no device.
    #[error("local media unavailable: {0}")]
    LocalMediaUnavailable(#[source] MediaError),
    /// The transport failed to open a connection.
    #[error("transport connect failed: {0}")]
    TransportConnectFailed(#[source] TransportError),
    /// The operation is not valid in the manager's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the manager was in.
        state: SessionState,
    },
    /// A join form field is missing or malformed.
    #[error("invalid join form: {0}")]
    InvalidJoinForm(String),
    /// The session was left while the operation was in flight; its outcome was discarded.
    #[error("operation aborted because the session was left")]
    Aborted,
    /// There is no active local publication (with video, where video is required).
    #[error("no active local publication")]
    NoLocalPublication,
    /// A transport operation failed on an established connection.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Device enumeration failed.
    #[error("media device error: {0}")]
    Media(#[source] MediaError),
    /// The manager was built without a required collaborator.
    #[error("configuration error: {0}")]
    Configuration(String),
}
