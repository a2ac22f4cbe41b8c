use smallvec::SmallVec;

use crate::devices::{CaptureConstraints, DeviceId};
use crate::track::{LocalTrack, TrackKind, TrackSid};

/// A local track together with the id the server assigned it.
#[derive(Debug, Clone)]
pub struct PublishedTrack {
    /// Server-assigned id.
    pub sid: TrackSid,
    /// The capturing track.
    pub track: LocalTrack,
}

/// The local media currently published in a session.
#[derive(Debug, Clone)]
pub struct LocalPublication {
    tracks: SmallVec<[PublishedTrack; 2]>,
    constraints: CaptureConstraints,
}

impl LocalPublication {
    pub(crate) fn new(
        tracks: impl IntoIterator<Item = PublishedTrack>,
        constraints: CaptureConstraints,
    ) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
            constraints,
        }
    }

    /// Returns every published track.
    pub fn tracks(&self) -> &[PublishedTrack] {
        &self.tracks
    }

    /// Returns the published track of the given kind.
    pub fn track(&self, kind: TrackKind) -> Option<&PublishedTrack> {
        self.tracks.iter().find(|t| t.track.kind() == kind)
    }

    /// Returns the published video track.
    pub fn video(&self) -> Option<&PublishedTrack> {
        self.track(TrackKind::Video)
    }

    /// Returns the published audio track.
    pub fn audio(&self) -> Option<&PublishedTrack> {
        self.track(TrackKind::Audio)
    }

    /// Returns the camera currently capturing.
    pub fn video_device(&self) -> Option<&DeviceId> {
        self.video().map(|t| &t.track.device().id)
    }

    /// Returns the constraints the publication was captured with.
    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    /// Swaps in a new video track, returning the one it replaced.
    pub(crate) fn replace_video(&mut self, video: PublishedTrack) -> Option<PublishedTrack> {
        self.constraints.video_device = Some(video.track.device().id.clone());
        match self
            .tracks
            .iter_mut()
            .find(|t| t.track.kind() == TrackKind::Video)
        {
            Some(slot) => Some(std::mem::replace(slot, video)),
            None => {
                self.tracks.push(video);
                None
            }
        }
    }

    /// Drops the video track without a replacement.
    pub(crate) fn remove_video(&mut self) -> Option<PublishedTrack> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.track.kind() == TrackKind::Video)?;
        Some(self.tracks.remove(index))
    }

    /// Stops every track.
    pub(crate) fn stop(&self) {
        for published in &self.tracks {
            published.track.stop();
        }
    }
}
