//! Test utilities.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::devices::DeviceId;
use crate::identity::ParticipantIdentity;
use crate::listener::SessionListener;
use crate::session::{LocalPublication, RemoteParticipant, SessionState};
use crate::track::{RemoteTrack, TrackKind};

/// A listener callback, as recorded by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// [`SessionListener::on_state_changed`].
    StateChanged(SessionState),
    /// [`SessionListener::on_local_published`].
    LocalPublished {
        /// Camera of the publication, if it has video.
        video_device: Option<DeviceId>,
        /// Number of published tracks.
        tracks: usize,
    },
    /// [`SessionListener::on_local_unpublished`].
    LocalUnpublished,
    /// [`SessionListener::on_track_subscribed`].
    TrackSubscribed {
        /// Publisher.
        participant: ParticipantIdentity,
        /// Media kind.
        kind: TrackKind,
    },
    /// [`SessionListener::on_track_unsubscribed`].
    TrackUnsubscribed {
        /// Publisher.
        participant: ParticipantIdentity,
        /// Media kind.
        kind: TrackKind,
    },
    /// [`SessionListener::on_participant_left`].
    ParticipantLeft(ParticipantIdentity),
    /// [`SessionListener::on_exception`].
    Exception(String),
}

/// A listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Returns the callbacks recorded so far.
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Returns and clears the callbacks recorded so far.
    pub fn take(&self) -> Vec<ListenerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the recorded state changes.
    pub fn states(&self) -> Vec<SessionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ListenerEvent::StateChanged(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ListenerEvent) {
        self.events.lock().push(event);
    }
}

impl SessionListener for RecordingListener {
    fn on_state_changed(&self, state: SessionState) {
        self.record(ListenerEvent::StateChanged(state));
    }

    fn on_local_published(&self, publication: &LocalPublication) {
        self.record(ListenerEvent::LocalPublished {
            video_device: publication.video_device().cloned(),
            tracks: publication.tracks().len(),
        });
    }

    fn on_local_unpublished(&self, _publication: &LocalPublication) {
        self.record(ListenerEvent::LocalUnpublished);
    }

    fn on_track_subscribed(&self, participant: &RemoteParticipant, track: &RemoteTrack) {
        self.record(ListenerEvent::TrackSubscribed {
            participant: participant.identity().clone(),
            kind: track.kind,
        });
    }

    fn on_track_unsubscribed(&self, participant: &ParticipantIdentity, track: &RemoteTrack) {
        self.record(ListenerEvent::TrackUnsubscribed {
            participant: participant.clone(),
            kind: track.kind,
        });
    }

    fn on_participant_left(&self, participant: &ParticipantIdentity) {
        self.record(ListenerEvent::ParticipantLeft(participant.clone()));
    }

    fn on_exception(&self, message: &str) {
        self.record(ListenerEvent::Exception(message.to_string()));
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub async fn assert_eventually(timeout: Duration, condition: impl Fn() -> bool) {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    with_timeout(timeout, poll).await;
}

/// Awaits `future`, panicking after `timeout`.
pub async fn with_timeout<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| panic!("timed out after {timeout:?}"))
}
