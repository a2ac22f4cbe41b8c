//! Media tracks, local and remote.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::devices::DeviceInfo;
use crate::SessionError;

/// The kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    /// Microphone or other audio.
    Audio,
    /// Camera or other video.
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        })
    }
}

/// Server-assigned identifier of a published track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackSid(pub String);

impl fmt::Display for TrackSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackSid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An opaque, transport-specific handle to a media stream, which a renderer can downcast.
#[derive(Clone)]
pub struct TrackHandle(Arc<dyn Any + Send + Sync>);

impl TrackHandle {
    /// Wraps a transport-specific value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the wrapped value, if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle").finish_non_exhaustive()
    }
}

/// A subscribed track published by a remote participant.
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// Server-assigned identifier.
    pub sid: TrackSid,
    /// Media kind.
    pub kind: TrackKind,
    /// Name given by the publisher.
    pub name: String,
    /// Stream handle for rendering.
    pub handle: TrackHandle,
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// 640x480, the default publishing resolution.
    pub const VGA: Self = Self {
        width: 640,
        height: 480,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SessionError::Configuration(format!("invalid resolution '{s}'"));
        let (width, height) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = width.trim().parse().map_err(|_| invalid())?;
        let height = height.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Settings a capture source actually produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackSettings {
    /// Frame size, for video tracks.
    pub resolution: Option<Resolution>,
    /// Frames per second, for video tracks.
    pub frame_rate: Option<u32>,
}

/// The producing side of a local track.
pub trait CaptureSource: Send + Sync {
    /// Stops capturing and releases the device. Must be idempotent.
    fn stop(&self);

    /// Returns true while the source holds the device.
    fn is_live(&self) -> bool;

    /// Returns the underlying value for transports that feed it into their own pipeline.
    fn as_any(&self) -> &dyn Any;
}

/// Identifies a local track for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalTrackId(u64);

impl fmt::Display for LocalTrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

static NEXT_LOCAL_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// A track produced by a local capture device.
///
/// Clones share the same source; stopping any clone stops them all.
#[derive(Clone)]
pub struct LocalTrack(Arc<LocalTrackInner>);

struct LocalTrackInner {
    id: LocalTrackId,
    kind: TrackKind,
    name: String,
    device: DeviceInfo,
    settings: TrackSettings,
    source: Arc<dyn CaptureSource>,
}

impl LocalTrack {
    /// Creates a local track around a capture source.
    pub fn new(
        kind: TrackKind,
        name: impl Into<String>,
        device: DeviceInfo,
        settings: TrackSettings,
        source: Arc<dyn CaptureSource>,
    ) -> Self {
        let id = LocalTrackId(NEXT_LOCAL_TRACK_ID.fetch_add(1, Ordering::Relaxed));
        Self(Arc::new(LocalTrackInner {
            id,
            kind,
            name: name.into(),
            device,
            settings,
            source,
        }))
    }

    /// Returns the track's process-unique id.
    pub fn id(&self) -> LocalTrackId {
        self.0.id
    }

    /// Returns the media kind.
    pub fn kind(&self) -> TrackKind {
        self.0.kind
    }

    /// Returns the track name announced to other participants.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the device the track captures from.
    pub fn device(&self) -> &DeviceInfo {
        &self.0.device
    }

    /// Returns the settings the source produced.
    pub fn settings(&self) -> TrackSettings {
        self.0.settings
    }

    /// Returns the capture source.
    pub fn source(&self) -> &Arc<dyn CaptureSource> {
        &self.0.source
    }

    /// Stops capture and releases the device.
    pub fn stop(&self) {
        self.0.source.stop();
    }

    /// Returns true while the device is held.
    pub fn is_live(&self) -> bool {
        self.0.source.is_live()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("device", &self.0.device.id)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolution() {
        let r: Resolution = "1280x720".parse().unwrap();
        assert_eq!(r, Resolution { width: 1280, height: 720 });
        assert_eq!(r.to_string(), "1280x720");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
        assert!("wide x tall".parse::<Resolution>().is_err());
    }

    #[test]
    fn track_handle_downcasts() {
        let handle = TrackHandle::new(42_u32);
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        assert!(handle.downcast_ref::<String>().is_none());
    }
}
