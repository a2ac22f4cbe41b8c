use crate::identity::ParticipantIdentity;
use crate::session::{LocalPublication, RemoteParticipant, SessionState};
use crate::track::RemoteTrack;

/// Provides a mechanism for registering callbacks for session events.
///
/// Callbacks run on the session's event task or on the task driving a session operation, and
/// must not block. If blocking or long-running behavior is required, the implementation should
/// use [`tokio::task::spawn`] (or [`tokio::task::spawn_blocking`]).
pub trait SessionListener: Send + Sync {
    /// Callback invoked when the session moves to a new state.
    fn on_state_changed(&self, _state: SessionState) {}
    /// Callback invoked when local media is published or replaced.
    fn on_local_published(&self, _publication: &LocalPublication) {}
    /// Callback invoked when local media is withdrawn.
    fn on_local_unpublished(&self, _publication: &LocalPublication) {}
    /// Callback invoked when a remote track becomes available to render.
    fn on_track_subscribed(&self, _participant: &RemoteParticipant, _track: &RemoteTrack) {}
    /// Callback invoked when a remote track goes away.
    fn on_track_unsubscribed(&self, _participant: &ParticipantIdentity, _track: &RemoteTrack) {}
    /// Callback invoked when a remote participant's last track is gone.
    fn on_participant_left(&self, _participant: &ParticipantIdentity) {}
    /// Callback invoked when the transport reports a non-fatal error.
    fn on_exception(&self, _message: &str) {}
}
