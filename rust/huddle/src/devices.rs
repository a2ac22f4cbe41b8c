//! Local capture devices.
//!
//! The session manager never talks to hardware directly. It enumerates and opens devices
//! through a [`MediaDevices`] implementation, which lets a host application plug in its own
//! capture stack. [`SyntheticDevices`] produces generated media and is used by the CLI and the
//! test suites.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::identity::Role;
use crate::track::{CaptureSource, LocalTrack, Resolution, TrackKind, TrackSettings};

/// Identifier of a capture device, stable for as long as the device is plugged in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of media device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// A camera.
    VideoInput,
    /// A microphone.
    AudioInput,
    /// A speaker or headset.
    AudioOutput,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::VideoInput => "video input",
            DeviceKind::AudioInput => "audio input",
            DeviceKind::AudioOutput => "audio output",
        })
    }
}

/// An enumerated media device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device identifier.
    pub id: DeviceId,
    /// Device kind.
    pub kind: DeviceKind,
    /// Human-readable label.
    pub label: String,
}

impl DeviceInfo {
    /// Creates a device description.
    pub fn new(id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            id: DeviceId(id.into()),
            kind,
            label: label.into(),
        }
    }
}

/// What to capture when publishing local media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Capture from a microphone.
    pub audio: bool,
    /// Capture from a camera.
    pub video: bool,
    /// Requested video resolution.
    pub resolution: Resolution,
    /// Requested video frame rate.
    pub frame_rate: u32,
    /// Camera to open. `None` selects the first available camera.
    pub video_device: Option<DeviceId>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            resolution: Resolution::VGA,
            frame_rate: 30,
            video_device: None,
        }
    }
}

impl CaptureConstraints {
    /// Narrows these constraints to what a participant in `role` publishes on join.
    #[must_use]
    pub fn for_role(mut self, role: Role) -> Self {
        if role == Role::Watcher {
            self.audio = false;
            self.video = false;
        }
        self
    }

    /// Returns true if any media is requested.
    pub fn requests_media(&self) -> bool {
        self.audio || self.video
    }
}

/// An error from the local capture stack.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MediaError {
    /// The user or platform denied access to capture devices.
    #[error("permission to capture media was denied")]
    PermissionDenied,
    /// The requested device does not exist (any more).
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),
    /// No device of the required kind is available.
    #[error("no {0} device available")]
    NoDevice(DeviceKind),
    /// Neither audio nor video was requested.
    #[error("no media requested")]
    NothingRequested,
    /// The platform failed to enumerate or open devices.
    #[error("capture backend error: {0}")]
    Backend(String),
}

/// Local media captured for one publication.
#[derive(Debug, Default)]
pub struct LocalMedia {
    tracks: SmallVec<[LocalTrack; 2]>,
}

impl LocalMedia {
    /// Creates local media from captured tracks.
    pub fn new(tracks: impl IntoIterator<Item = LocalTrack>) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
        }
    }

    /// Returns the captured tracks.
    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Consumes the media, returning its tracks.
    pub fn into_tracks(self) -> SmallVec<[LocalTrack; 2]> {
        self.tracks
    }

    /// Stops every track.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Access to the platform's capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Lists the available devices.
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, MediaError>;

    /// Opens the devices selected by `constraints` and starts capture.
    async fn capture(&self, constraints: &CaptureConstraints) -> Result<LocalMedia, MediaError>;
}

/// A device set that generates media instead of reading hardware.
///
/// Devices can be added and removed at runtime and permission can be revoked, which makes this
/// useful for exercising device-switch and failure paths.
pub struct SyntheticDevices {
    devices: RwLock<Vec<DeviceInfo>>,
    permission_denied: AtomicBool,
    live_captures: Arc<AtomicUsize>,
}

impl SyntheticDevices {
    /// Creates a device set from an explicit list.
    pub fn new(devices: impl IntoIterator<Item = DeviceInfo>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().collect()),
            permission_denied: AtomicBool::new(false),
            live_captures: Arc::default(),
        }
    }

    /// Creates a device set with `cameras` cameras and one microphone.
    pub fn with_cameras(cameras: usize) -> Self {
        let mut devices: Vec<_> = (0..cameras)
            .map(|i| {
                DeviceInfo::new(
                    format!("synthetic-camera-{i}"),
                    DeviceKind::VideoInput,
                    format!("Synthetic Camera {i}"),
                )
            })
            .collect();
        devices.push(DeviceInfo::new(
            "synthetic-microphone-0",
            DeviceKind::AudioInput,
            "Synthetic Microphone",
        ));
        Self::new(devices)
    }

    /// Plugs in a device.
    pub fn add_device(&self, device: DeviceInfo) {
        self.devices.write().push(device);
    }

    /// Unplugs a device. Tracks already capturing from it keep running.
    pub fn remove_device(&self, id: &DeviceId) {
        self.devices.write().retain(|d| &d.id != id);
    }

    /// Makes subsequent captures fail with [`MediaError::PermissionDenied`].
    pub fn set_permission_denied(&self, denied: bool) {
        self.permission_denied.store(denied, Ordering::Relaxed);
    }

    /// Returns the number of sources currently holding a device.
    pub fn live_captures(&self) -> usize {
        self.live_captures.load(Ordering::Relaxed)
    }

    fn pick(&self, kind: DeviceKind, wanted: Option<&DeviceId>) -> Result<DeviceInfo, MediaError> {
        let devices = self.devices.read();
        match wanted {
            Some(id) => devices
                .iter()
                .find(|d| &d.id == id && d.kind == kind)
                .cloned()
                .ok_or_else(|| MediaError::DeviceNotFound(id.clone())),
            None => devices
                .iter()
                .find(|d| d.kind == kind)
                .cloned()
                .ok_or(MediaError::NoDevice(kind)),
        }
    }

    fn open(&self, kind: TrackKind, device: DeviceInfo, settings: TrackSettings) -> LocalTrack {
        self.live_captures.fetch_add(1, Ordering::Relaxed);
        let source = SyntheticSource {
            device: device.id.clone(),
            live: AtomicBool::new(true),
            live_captures: self.live_captures.clone(),
        };
        let name = match kind {
            TrackKind::Audio => "microphone",
            TrackKind::Video => "camera",
        };
        debug!("opened synthetic {kind} source on {}", device.id);
        LocalTrack::new(kind, name, device, settings, Arc::new(source))
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::with_cameras(1)
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        Ok(self.devices.read().clone())
    }

    async fn capture(&self, constraints: &CaptureConstraints) -> Result<LocalMedia, MediaError> {
        if self.permission_denied.load(Ordering::Relaxed) {
            return Err(MediaError::PermissionDenied);
        }
        if !constraints.requests_media() {
            return Err(MediaError::NothingRequested);
        }

        // Resolve every device before opening any, so a failure leaves nothing running.
        let camera = constraints
            .video
            .then(|| self.pick(DeviceKind::VideoInput, constraints.video_device.as_ref()))
            .transpose()?;
        let microphone = constraints
            .audio
            .then(|| self.pick(DeviceKind::AudioInput, None))
            .transpose()?;

        let mut tracks = Vec::with_capacity(2);
        if let Some(device) = microphone {
            tracks.push(self.open(TrackKind::Audio, device, TrackSettings::default()));
        }
        if let Some(device) = camera {
            let settings = TrackSettings {
                resolution: Some(constraints.resolution),
                frame_rate: Some(constraints.frame_rate),
            };
            tracks.push(self.open(TrackKind::Video, device, settings));
        }
        Ok(LocalMedia::new(tracks))
    }
}

/// A generated media source.
///
/// Transports that push real frames can downcast to this to learn which synthetic device the
/// track belongs to.
#[derive(Debug)]
pub struct SyntheticSource {
    device: DeviceId,
    live: AtomicBool,
    live_captures: Arc<AtomicUsize>,
}

impl SyntheticSource {
    /// Returns the device this source generates media for.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

impl CaptureSource for SyntheticSource {
    fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.live_captures.fetch_sub(1, Ordering::Relaxed);
            debug!("stopped synthetic source on {}", self.device);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
