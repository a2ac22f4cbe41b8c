//! [LiveKit](https://livekit.io/) transport, built on the LiveKit Rust SDK.
//!
//! Local tracks are published from native sources. Video from a [`SyntheticSource`] is fed a
//! moving test pattern at the track's frame rate; audio sources publish silence.
//!
//! [`SyntheticSource`]: crate::devices::SyntheticSource

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{
    LocalAudioTrack, LocalTrack as LkLocalTrack, LocalVideoTrack, RemoteParticipant,
    RemoteTrack as LkRemoteTrack, RemoteTrackPublication, Room, RoomEvent, RoomOptions,
    TrackSource,
};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::video_frame::{I420Buffer, VideoFrame, VideoRotation};
use livekit::webrtc::video_source::native::NativeVideoSource;
use livekit::webrtc::video_source::{RtcVideoSource, VideoResolution};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConnectOptions, Connection, DisconnectReason, EventReceiver, EventSender,
    RemoteParticipantInfo, Transport, TransportError, TransportEvent,
};
use crate::identity::ParticipantIdentity;
use crate::token::Credential;
use crate::track::{LocalTrack, RemoteTrack, Resolution, TrackHandle, TrackKind, TrackSid};

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_MS: u32 = 1000;
const DEFAULT_FRAME_RATE: u32 = 30;

/// Connects to a LiveKit server.
#[derive(Debug, Default, Clone)]
pub struct LivekitTransport {}

impl LivekitTransport {
    /// Creates a transport.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LivekitTransport {
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Connection>, EventReceiver), TransportError> {
        let mut room_options = RoomOptions::default();
        room_options.auto_subscribe = options.auto_subscribe;
        let (room, room_events) = Room::connect(url, credential.token(), room_options)
            .await
            .map_err(|e| TransportError::ConnectionRefused(e.to_string()))?;

        let local = room.local_participant();
        info!("connected to livekit room as {}", local.identity().0);
        if let Some(metadata) = options.metadata {
            if let Err(e) = local.set_metadata(metadata).await {
                warn!("failed to set participant metadata: {e}");
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(LivekitConnection {
            room,
            state: Mutex::default(),
        });
        tokio::spawn(forward_room_events(
            Arc::downgrade(&connection),
            room_events,
            tx,
        ));
        Ok((connection, rx))
    }
}

#[derive(Default)]
struct ConnectionState {
    /// Local publications by sid, with the token that stops their frame feeder.
    published: HashMap<TrackSid, (livekit::id::TrackSid, CancellationToken)>,
    /// Remote publications we are subscribed to.
    subscriptions: HashMap<TrackSid, RemoteTrackPublication>,
}

struct LivekitConnection {
    room: Room,
    state: Mutex<ConnectionState>,
}

impl LivekitConnection {
    fn stop_feeders(&self) {
        let mut state = self.state.lock();
        for (_, (_, feeder)) in state.published.drain() {
            feeder.cancel();
        }
    }
}

#[async_trait]
impl Connection for LivekitConnection {
    fn local_identity(&self) -> ParticipantIdentity {
        ParticipantIdentity(self.room.local_participant().identity().0)
    }

    async fn publish(&self, track: &LocalTrack) -> Result<TrackSid, TransportError> {
        let feeder = CancellationToken::new();
        let (lk_track, source) = match track.kind() {
            TrackKind::Video => {
                let resolution = track.settings().resolution.unwrap_or(Resolution::VGA);
                let source = NativeVideoSource::new(VideoResolution {
                    width: resolution.width,
                    height: resolution.height,
                });
                tokio::spawn(feed_test_pattern(
                    source.clone(),
                    resolution,
                    track.settings().frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
                    track.clone(),
                    feeder.clone(),
                ));
                let lk_track = LocalVideoTrack::create_video_track(
                    track.name(),
                    RtcVideoSource::Native(source),
                );
                (LkLocalTrack::Video(lk_track), TrackSource::Camera)
            }
            TrackKind::Audio => {
                let source = NativeAudioSource::new(
                    AudioSourceOptions::default(),
                    AUDIO_SAMPLE_RATE,
                    AUDIO_CHANNELS,
                    AUDIO_QUEUE_MS,
                );
                let lk_track = LocalAudioTrack::create_audio_track(
                    track.name(),
                    RtcAudioSource::Native(source),
                );
                (LkLocalTrack::Audio(lk_track), TrackSource::Microphone)
            }
        };

        let options = TrackPublishOptions {
            source,
            ..TrackPublishOptions::default()
        };
        let publication = match self
            .room
            .local_participant()
            .publish_track(lk_track, options)
            .await
        {
            Ok(publication) => publication,
            Err(e) => {
                feeder.cancel();
                return Err(TransportError::Other(Box::new(e)));
            }
        };
        let lk_sid = publication.sid();
        let sid = TrackSid(lk_sid.to_string());
        debug!("published {} track {sid}", track.kind());
        self.state
            .lock()
            .published
            .insert(sid.clone(), (lk_sid, feeder));
        Ok(sid)
    }

    async fn unpublish(&self, sid: &TrackSid) -> Result<(), TransportError> {
        let (lk_sid, feeder) = self
            .state
            .lock()
            .published
            .remove(sid)
            .ok_or_else(|| TransportError::UnknownTrack(sid.clone()))?;
        feeder.cancel();
        self.room
            .local_participant()
            .unpublish_track(&lk_sid)
            .await
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        Ok(())
    }

    async fn unsubscribe(&self, sid: &TrackSid) -> Result<(), TransportError> {
        let publication = self
            .state
            .lock()
            .subscriptions
            .remove(sid)
            .ok_or_else(|| TransportError::UnknownTrack(sid.clone()))?;
        publication.set_subscribed(false);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_feeders();
        // Without an explicit close the server keeps the participant around until it times out.
        self.room
            .close()
            .await
            .map_err(|e| TransportError::Other(Box::new(e)))
    }
}

fn participant_info(participant: &RemoteParticipant) -> RemoteParticipantInfo {
    let metadata = participant.metadata();
    RemoteParticipantInfo {
        identity: ParticipantIdentity(participant.identity().0),
        metadata: (!metadata.is_empty()).then_some(metadata),
    }
}

fn track_kind(track: &LkRemoteTrack) -> TrackKind {
    match track {
        LkRemoteTrack::Audio(_) => TrackKind::Audio,
        LkRemoteTrack::Video(_) => TrackKind::Video,
    }
}

fn disconnect_reason(name: &str) -> DisconnectReason {
    match name {
        "CLIENT_INITIATED" => DisconnectReason::ClientInitiated,
        "SERVER_SHUTDOWN" => DisconnectReason::ServerShutdown,
        "PARTICIPANT_REMOVED" => DisconnectReason::ParticipantRemoved,
        "ROOM_DELETED" | "ROOM_CLOSED" => DisconnectReason::RoomDeleted,
        "DUPLICATE_IDENTITY" => DisconnectReason::DuplicateIdentity,
        "SIGNAL_CLOSE" | "CONNECTION_TIMEOUT" | "MEDIA_FAILURE" => {
            DisconnectReason::ConnectionLost
        }
        _ => DisconnectReason::Unknown,
    }
}

/// Translates room events until the room disconnects or the connection is dropped.
async fn forward_room_events(
    connection: Weak<LivekitConnection>,
    mut room_events: mpsc::UnboundedReceiver<RoomEvent>,
    events: EventSender,
) {
    while let Some(event) = room_events.recv().await {
        let Some(connection) = connection.upgrade() else {
            break;
        };
        let translated = match event {
            RoomEvent::ParticipantConnected(participant) => Some(
                TransportEvent::ParticipantConnected(participant_info(&participant)),
            ),
            RoomEvent::ParticipantDisconnected(participant) => Some(
                TransportEvent::ParticipantDisconnected(ParticipantIdentity(
                    participant.identity().0,
                )),
            ),
            RoomEvent::TrackSubscribed {
                track,
                publication,
                participant,
            } => {
                let sid = TrackSid(publication.sid().to_string());
                let remote = RemoteTrack {
                    sid: sid.clone(),
                    kind: track_kind(&track),
                    name: publication.name(),
                    handle: TrackHandle::new(track),
                };
                connection
                    .state
                    .lock()
                    .subscriptions
                    .insert(sid, publication);
                Some(TransportEvent::TrackSubscribed {
                    participant: participant_info(&participant),
                    track: remote,
                })
            }
            RoomEvent::TrackUnsubscribed {
                track,
                publication,
                participant,
            } => {
                let sid = TrackSid(publication.sid().to_string());
                connection.state.lock().subscriptions.remove(&sid);
                Some(TransportEvent::TrackUnsubscribed {
                    participant: ParticipantIdentity(participant.identity().0),
                    sid,
                    kind: track_kind(&track),
                })
            }
            RoomEvent::TrackSubscriptionFailed {
                participant,
                error,
                track_sid,
            } => Some(TransportEvent::Exception {
                message: format!(
                    "failed to subscribe to {track_sid} of {}: {error}",
                    participant.identity().0
                ),
            }),
            RoomEvent::Reconnecting => Some(TransportEvent::Exception {
                message: "connection interrupted, reconnecting".to_string(),
            }),
            RoomEvent::Disconnected { reason } => {
                connection.stop_feeders();
                let reason = disconnect_reason(reason.as_str_name());
                let _ = events.send(TransportEvent::Disconnected { reason });
                break;
            }
            _ => None,
        };
        if let Some(event) = translated {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!("stopped forwarding room events");
}

/// Pushes a scrolling luma ramp into `source` until cancelled or the capture stops.
async fn feed_test_pattern(
    source: NativeVideoSource,
    resolution: Resolution,
    frame_rate: u32,
    track: LocalTrack,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs(1) / frame_rate.max(1);
    let mut interval = tokio::time::interval(period);
    let mut frame = VideoFrame {
        rotation: VideoRotation::VideoRotation0,
        timestamp_us: 0,
        buffer: I420Buffer::new(resolution.width, resolution.height),
    };
    let width = resolution.width as usize;
    let mut frame_index: u64 = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if !track.is_live() {
            break;
        }
        let (y, u, v) = frame.buffer.data_mut();
        for (i, luma) in y.iter_mut().enumerate() {
            *luma = ((i % width) as u64).wrapping_add(frame_index) as u8;
        }
        u.fill(128);
        v.fill(128);
        frame.timestamp_us = (frame_index as i64).saturating_mul(period.as_micros() as i64);
        source.capture_frame(&frame);
        frame_index = frame_index.wrapping_add(1);
    }
    debug!("stopped test pattern for {}", track.id());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_server_disconnect_reasons() {
        assert_eq!(
            disconnect_reason("CLIENT_INITIATED"),
            DisconnectReason::ClientInitiated
        );
        assert_eq!(
            disconnect_reason("PARTICIPANT_REMOVED"),
            DisconnectReason::ParticipantRemoved
        );
        assert_eq!(
            disconnect_reason("ROOM_DELETED"),
            DisconnectReason::RoomDeleted
        );
        assert_eq!(
            disconnect_reason("SIGNAL_CLOSE"),
            DisconnectReason::ConnectionLost
        );
        assert_eq!(disconnect_reason("SOMETHING_NEW"), DisconnectReason::Unknown);
    }
}
