//! Tile layout for renderers.
//!
//! A renderer shows one video tile per participant with video and one (invisible) audio sink
//! per remote audio track. [`layout`] computes that list from a [`SessionSnapshot`], so a
//! renderer can redraw from scratch whenever the session changes.

use std::fmt;

use crate::identity::{ParticipantIdentity, ParticipantLabel};
use crate::session::SessionSnapshot;
use crate::track::{TrackKind, TrackSid};

/// Whose media a tile shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOwner {
    /// The local participant.
    Local,
    /// A remote participant.
    Remote(ParticipantIdentity),
}

/// One rendered element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Whose media this is.
    pub owner: TileOwner,
    /// Video tile or audio sink.
    pub kind: TrackKind,
    /// Track to attach.
    pub sid: TrackSid,
    /// Name and role shown on the tile.
    pub label: ParticipantLabel,
}

impl Tile {
    /// Returns the caption, e.g. `"Alice (talker)"`.
    pub fn caption(&self) -> String {
        self.label.caption()
    }

    /// Returns true for the local participant's tile.
    pub fn is_local(&self) -> bool {
        self.owner == TileOwner::Local
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.caption())?;
        if self.is_local() {
            f.write_str(" [you]")?;
        }
        Ok(())
    }
}

/// Lays out the tiles for a snapshot.
///
/// The local video tile comes first, when local video is published. Remote participants follow
/// in arrival order, each with its video tile and then its audio sink.
pub fn layout(snapshot: &SessionSnapshot) -> Vec<Tile> {
    let mut tiles = Vec::with_capacity(1 + 2 * snapshot.participants.len());

    let local_video = snapshot.publication.as_ref().and_then(|p| p.video());
    if let (Some(video), Some(identity)) = (local_video, &snapshot.identity) {
        tiles.push(Tile {
            owner: TileOwner::Local,
            kind: TrackKind::Video,
            sid: video.sid.clone(),
            label: ParticipantLabel {
                display_name: identity.display_name().to_string(),
                role: snapshot.role,
            },
        });
    }

    for participant in &snapshot.participants {
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if let Some(track) = participant.track(kind) {
                tiles.push(Tile {
                    owner: TileOwner::Remote(participant.identity().clone()),
                    kind,
                    sid: track.sid.clone(),
                    label: participant.label().clone(),
                });
            }
        }
    }
    tiles
}

/// Renders tiles one per line, for text frontends.
pub fn render(tiles: &[Tile]) -> String {
    tiles
        .iter()
        .map(Tile::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{CaptureConstraints, MediaDevices, SyntheticDevices};
    use crate::identity::{Identity, Role};
    use crate::session::{LocalPublication, PublishedTrack, RemoteParticipant, SessionState};
    use crate::track::{RemoteTrack, TrackHandle};

    fn remote(identity: &str, metadata: &str, kinds: &[TrackKind]) -> RemoteParticipant {
        let identity = ParticipantIdentity::from(identity);
        let label = ParticipantLabel::from_metadata(&identity, Some(metadata));
        let mut participant = RemoteParticipant::new(identity.clone(), label);
        for kind in kinds {
            participant.insert_track(RemoteTrack {
                sid: TrackSid(format!("TR_{identity}_{kind}")),
                kind: *kind,
                name: kind.to_string(),
                handle: TrackHandle::new(()),
            });
        }
        participant
    }

    async fn local_publication(constraints: CaptureConstraints) -> LocalPublication {
        let media = SyntheticDevices::default()
            .capture(&constraints)
            .await
            .unwrap();
        let tracks = media.tracks().iter().map(|track| PublishedTrack {
            sid: TrackSid(format!("TR_local_{}", track.kind())),
            track: track.clone(),
        });
        LocalPublication::new(tracks, constraints)
    }

    #[test]
    fn idle_session_has_no_tiles() {
        assert!(layout(&SessionSnapshot::default()).is_empty());
    }

    #[tokio::test]
    async fn local_tile_comes_first() {
        let snapshot = SessionSnapshot {
            state: SessionState::Connected,
            identity: Some(Identity::with_label("Alice", "alice-00ff")),
            role: Some(Role::Talker),
            publication: Some(local_publication(CaptureConstraints::default()).await),
            participants: vec![
                remote("bob-0001", r#"{"clientData":"Bob","role":"talker"}"#, &[
                    TrackKind::Audio,
                    TrackKind::Video,
                ]),
                remote("carol-0002", "carol", &[TrackKind::Audio]),
            ],
            ..SessionSnapshot::default()
        };
        let tiles = layout(&snapshot);
        assert!(tiles[0].is_local());
        assert_eq!(tiles[0].sid, TrackSid::from("TR_local_video"));
        assert_eq!(
            tiles[1].owner,
            TileOwner::Remote(ParticipantIdentity::from("bob-0001"))
        );
        insta::assert_snapshot!(render(&tiles), @r"
        video Alice (talker) [you]
        video Bob (talker)
        audio Bob (talker)
        audio carol-0002
        ");
    }

    #[tokio::test]
    async fn audio_only_publication_has_no_local_tile() {
        let constraints = CaptureConstraints {
            video: false,
            ..CaptureConstraints::default()
        };
        let snapshot = SessionSnapshot {
            state: SessionState::Connected,
            identity: Some(Identity::with_label("Alice", "alice-00ff")),
            role: Some(Role::Talker),
            publication: Some(local_publication(constraints).await),
            ..SessionSnapshot::default()
        };
        assert!(layout(&snapshot).is_empty());
    }

    #[test]
    fn watcher_sees_only_remote_tiles() {
        let snapshot = SessionSnapshot {
            state: SessionState::Connected,
            identity: Some(Identity::with_label("Dave", "dave-0003")),
            role: Some(Role::Watcher),
            participants: vec![remote(
                "eve-0004",
                r#"{"clientData":"Eve","role":"talker"}"#,
                &[TrackKind::Video],
            )],
            ..SessionSnapshot::default()
        };
        insta::assert_snapshot!(render(&layout(&snapshot)), @"video Eve (talker)");
    }
}
