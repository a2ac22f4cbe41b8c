use smallvec::SmallVec;

use crate::identity::{ParticipantIdentity, ParticipantLabel};
use crate::track::{RemoteTrack, TrackKind, TrackSid};

/// A remote participant with at least one subscribed track.
///
/// Holds at most one track per kind. A participant whose last track goes away is dropped from
/// the session, so a `RemoteParticipant` is never empty.
#[derive(Clone)]
pub struct RemoteParticipant {
    identity: ParticipantIdentity,
    label: ParticipantLabel,
    tracks: SmallVec<[RemoteTrack; 2]>,
}

impl RemoteParticipant {
    pub(crate) fn new(identity: ParticipantIdentity, label: ParticipantLabel) -> Self {
        Self {
            identity,
            label,
            tracks: SmallVec::new(),
        }
    }

    /// Returns the participant's identity.
    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    /// Returns the presentation label derived from the participant's metadata.
    pub fn label(&self) -> &ParticipantLabel {
        &self.label
    }

    /// Returns the subscribed track of the given kind.
    pub fn track(&self, kind: TrackKind) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Returns all subscribed tracks.
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    /// Stores a track, returning the track of the same kind it replaced.
    pub(crate) fn insert_track(&mut self, track: RemoteTrack) -> Option<RemoteTrack> {
        match self.tracks.iter_mut().find(|t| t.kind == track.kind) {
            Some(slot) => Some(std::mem::replace(slot, track)),
            None => {
                self.tracks.push(track);
                None
            }
        }
    }

    /// Removes the track with `sid`, if this participant holds it.
    pub(crate) fn remove_track(&mut self, sid: &TrackSid) -> Option<RemoteTrack> {
        let index = self.tracks.iter().position(|t| &t.sid == sid)?;
        Some(self.tracks.remove(index))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl std::fmt::Debug for RemoteParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: SmallVec<[TrackKind; 2]> = self.tracks.iter().map(|t| t.kind).collect();
        write!(
            f,
            "RemoteParticipant {{ identity: {:?}, tracks: {kinds:?} }}",
            self.identity
        )
    }
}
