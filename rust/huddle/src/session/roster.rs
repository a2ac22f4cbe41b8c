use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, info};

use super::participant::RemoteParticipant;
use crate::identity::{ParticipantIdentity, ParticipantLabel};
use crate::track::{RemoteTrack, TrackSid};
use crate::transport::RemoteParticipantInfo;

/// The outcome of removing a remote track.
#[derive(Debug)]
pub(crate) struct TrackRemoval {
    pub track: RemoteTrack,
    /// Set when the track was the participant's last one and the participant was dropped.
    pub participant_left: bool,
}

/// The remote participants currently visible in a session, in arrival order.
///
/// A participant enters the roster with its first subscribed track and leaves it with its last,
/// so every entry has at least one track.
#[derive(Default)]
pub(crate) struct Roster {
    participants: IndexMap<ParticipantIdentity, RemoteParticipant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscribed track, creating the participant entry if needed.
    ///
    /// Returns the track of the same kind that was replaced, if any.
    pub fn insert_track(
        &mut self,
        info: &RemoteParticipantInfo,
        track: RemoteTrack,
    ) -> Option<RemoteTrack> {
        let participant = self
            .participants
            .entry(info.identity.clone())
            .or_insert_with(|| {
                info!("participant {} is now visible", info.identity);
                let label = ParticipantLabel::from_metadata(&info.identity, info.metadata.as_deref());
                RemoteParticipant::new(info.identity.clone(), label)
            });
        let replaced = participant.insert_track(track);
        if let Some(replaced) = &replaced {
            debug!(
                "replaced {} track {} of {}",
                replaced.kind, replaced.sid, info.identity
            );
        }
        replaced
    }

    /// Removes a track. Unknown participants or tracks are ignored.
    pub fn remove_track(
        &mut self,
        identity: &ParticipantIdentity,
        sid: &TrackSid,
    ) -> Option<TrackRemoval> {
        let participant = self.participants.get_mut(identity)?;
        let track = participant.remove_track(sid)?;
        let participant_left = participant.is_empty();
        if participant_left {
            self.participants.shift_remove(identity);
            info!("participant {identity} has no more tracks");
        }
        Some(TrackRemoval {
            track,
            participant_left,
        })
    }

    /// Removes a participant with all of its tracks.
    pub fn remove_participant(&mut self, identity: &ParticipantIdentity) -> Option<RemoteParticipant> {
        let removed = self.participants.shift_remove(identity)?;
        info!("removed participant {identity}");
        Some(removed)
    }

    /// Removes every participant.
    pub fn drain(&mut self) -> SmallVec<[RemoteParticipant; 8]> {
        self.participants.drain(..).map(|(_, p)| p).collect()
    }

    pub fn get(&self, identity: &ParticipantIdentity) -> Option<&RemoteParticipant> {
        self.participants.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.values()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::track::{TrackHandle, TrackKind};

    fn make_info(name: &str) -> RemoteParticipantInfo {
        RemoteParticipantInfo {
            identity: ParticipantIdentity::from(name),
            metadata: Some(format!(r#"{{"clientData":"{name}","role":"talker"}}"#)),
        }
    }

    fn make_track(sid: &str, kind: TrackKind) -> RemoteTrack {
        RemoteTrack {
            sid: TrackSid::from(sid),
            kind,
            name: kind.to_string(),
            handle: TrackHandle::new(()),
        }
    }

    // ---- subscription ----

    #[test]
    fn first_track_creates_participant() {
        let mut roster = Roster::new();
        assert!(roster.is_empty());
        let alice = make_info("alice");
        assert!(roster
            .insert_track(&alice, make_track("TR_1", TrackKind::Video))
            .is_none());
        assert_eq!(roster.len(), 1);
        let participant = roster.get(&alice.identity).unwrap();
        assert_eq!(participant.label().display_name, "alice");
        assert_eq!(participant.label().role, Some(Role::Talker));
        assert_eq!(participant.tracks().len(), 1);
    }

    #[test]
    fn audio_and_video_share_one_entry() {
        let mut roster = Roster::new();
        let alice = make_info("alice");
        roster.insert_track(&alice, make_track("TR_1", TrackKind::Video));
        roster.insert_track(&alice, make_track("TR_2", TrackKind::Audio));
        assert_eq!(roster.len(), 1);
        let participant = roster.get(&alice.identity).unwrap();
        assert_eq!(participant.track(TrackKind::Video).unwrap().sid.0, "TR_1");
        assert_eq!(participant.track(TrackKind::Audio).unwrap().sid.0, "TR_2");
    }

    #[test]
    fn same_kind_replaces_previous_track() {
        let mut roster = Roster::new();
        let alice = make_info("alice");
        roster.insert_track(&alice, make_track("TR_1", TrackKind::Video));
        let replaced = roster
            .insert_track(&alice, make_track("TR_3", TrackKind::Video))
            .unwrap();
        assert_eq!(replaced.sid.0, "TR_1");
        let participant = roster.get(&alice.identity).unwrap();
        assert_eq!(participant.tracks().len(), 1);
        assert_eq!(participant.track(TrackKind::Video).unwrap().sid.0, "TR_3");
    }

    // ---- removal ----

    #[test]
    fn removing_last_track_drops_participant() {
        let mut roster = Roster::new();
        let alice = make_info("alice");
        roster.insert_track(&alice, make_track("TR_1", TrackKind::Video));
        roster.insert_track(&alice, make_track("TR_2", TrackKind::Audio));

        let removal = roster
            .remove_track(&alice.identity, &TrackSid::from("TR_1"))
            .unwrap();
        assert!(!removal.participant_left);
        assert_eq!(roster.len(), 1);

        let removal = roster
            .remove_track(&alice.identity, &TrackSid::from("TR_2"))
            .unwrap();
        assert!(removal.participant_left);
        assert!(roster.is_empty());
    }

    #[test]
    fn removing_replaced_track_is_noop() {
        let mut roster = Roster::new();
        let alice = make_info("alice");
        roster.insert_track(&alice, make_track("TR_1", TrackKind::Video));
        roster.insert_track(&alice, make_track("TR_3", TrackKind::Video));
        assert!(roster
            .remove_track(&alice.identity, &TrackSid::from("TR_1"))
            .is_none());
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn removing_unknown_participant_is_noop() {
        let mut roster = Roster::new();
        let ghost = ParticipantIdentity::from("ghost");
        assert!(roster.remove_track(&ghost, &TrackSid::from("TR_9")).is_none());
        assert!(roster.remove_participant(&ghost).is_none());
    }

    #[test]
    fn remove_participant_takes_all_tracks() {
        let mut roster = Roster::new();
        let alice = make_info("alice");
        let bob = make_info("bob");
        roster.insert_track(&alice, make_track("TR_1", TrackKind::Video));
        roster.insert_track(&alice, make_track("TR_2", TrackKind::Audio));
        roster.insert_track(&bob, make_track("TR_3", TrackKind::Video));

        let removed = roster.remove_participant(&alice.identity).unwrap();
        assert_eq!(removed.tracks().len(), 2);
        let remaining: Vec<_> = roster.iter().map(|p| p.identity().as_str()).collect();
        assert_eq!(remaining, vec!["bob"]);
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut roster = Roster::new();
        for name in ["carol", "alice", "bob"] {
            roster.insert_track(&make_info(name), make_track(name, TrackKind::Video));
        }
        let drained: Vec<_> = roster
            .drain()
            .iter()
            .map(|p| p.identity().to_string())
            .collect();
        assert_eq!(drained, vec!["carol", "alice", "bob"]);
        assert!(roster.is_empty());
    }
}
