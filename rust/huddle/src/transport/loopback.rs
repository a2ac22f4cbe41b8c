//! An in-process room server.
//!
//! [`LoopbackHub`] plays the part of an SFU: it admits connections carrying a token it issued,
//! forwards published tracks to every other participant in the room and reports arrivals and
//! departures. It is used by the CLI demo mode and by the test suites, which also drive its
//! failure hooks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::{
    ConnectOptions, Connection, DisconnectReason, EventReceiver, EventSender, RemoteParticipantInfo,
    Transport, TransportError, TransportEvent,
};
use crate::identity::{Identity, ParticipantIdentity, RoomId};
use crate::token::{Credential, TokenError, TokenProvider};
use crate::track::{LocalTrack, RemoteTrack, TrackHandle, TrackKind, TrackSid};

/// URL carried by loopback credentials.
pub const LOOPBACK_URL: &str = "loopback://hub";

struct Grant {
    room: String,
    identity: ParticipantIdentity,
}

struct Published {
    kind: TrackKind,
    name: String,
    handle: TrackHandle,
}

struct Member {
    info: RemoteParticipantInfo,
    events: EventSender,
    connection_id: u64,
    auto_subscribe: bool,
    published: IndexMap<TrackSid, Published>,
    subscribed: HashSet<TrackSid>,
}

impl Member {
    fn send(&self, event: TransportEvent) {
        // The receiver is gone once the client stops listening; nothing to deliver to.
        let _ = self.events.send(event);
    }
}

type Room = IndexMap<ParticipantIdentity, Member>;

#[derive(Default)]
struct HubState {
    next_id: u64,
    grants: HashMap<String, Grant>,
    rooms: HashMap<String, Room>,
    refuse_next_connect: Option<String>,
}

impl HubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn remote_track(sid: &TrackSid, published: &Published) -> RemoteTrack {
    RemoteTrack {
        sid: sid.clone(),
        kind: published.kind,
        name: published.name.clone(),
        handle: published.handle.clone(),
    }
}

/// Delivers every track already in the room to a newly admitted subscriber.
fn subscribe_existing(room: &mut Room, subscriber: &ParticipantIdentity) {
    let available: Vec<(RemoteParticipantInfo, RemoteTrack)> = room
        .iter()
        .filter(|(identity, _)| *identity != subscriber)
        .flat_map(|(_, member)| {
            member
                .published
                .iter()
                .map(move |(sid, published)| (member.info.clone(), remote_track(sid, published)))
        })
        .collect();
    let Some(member) = room.get_mut(subscriber) else {
        return;
    };
    for (participant, track) in available {
        member.subscribed.insert(track.sid.clone());
        member.send(TransportEvent::TrackSubscribed { participant, track });
    }
}

fn fan_out_publish(room: &mut Room, publisher: &ParticipantIdentity, sid: &TrackSid) {
    let Some(member) = room.get(publisher) else {
        return;
    };
    let Some(published) = member.published.get(sid) else {
        return;
    };
    let info = member.info.clone();
    let track = remote_track(sid, published);
    for (identity, member) in room.iter_mut() {
        if identity == publisher || !member.auto_subscribe {
            continue;
        }
        member.subscribed.insert(sid.clone());
        member.send(TransportEvent::TrackSubscribed {
            participant: info.clone(),
            track: track.clone(),
        });
    }
}

fn fan_out_unpublish(
    room: &mut Room,
    publisher: &ParticipantIdentity,
    sid: &TrackSid,
    kind: TrackKind,
) {
    for member in room.values_mut() {
        if member.subscribed.remove(sid) {
            member.send(TransportEvent::TrackUnsubscribed {
                participant: publisher.clone(),
                sid: sid.clone(),
                kind,
            });
        }
    }
}

/// Removes a member, withdrawing its tracks from everyone else.
fn remove_member(room: &mut Room, identity: &ParticipantIdentity) -> Option<Member> {
    let member = room.shift_remove(identity)?;
    for (sid, published) in &member.published {
        fan_out_unpublish(room, identity, sid, published.kind);
    }
    for other in room.values() {
        other.send(TransportEvent::ParticipantDisconnected(identity.clone()));
    }
    Some(member)
}

/// An in-process SFU.
pub struct LoopbackHub {
    state: Mutex<HubState>,
    paused: watch::Sender<bool>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::default(),
            paused: watch::Sender::new(false),
        })
    }

    /// Issues a single-use token admitting `identity` to `room`.
    pub fn issue_token(&self, room: &RoomId, identity: &ParticipantIdentity) -> Credential {
        let mut state = self.state.lock();
        let token = format!("loopback-{}", state.next_id());
        state.grants.insert(
            token.clone(),
            Grant {
                room: room.to_string(),
                identity: identity.clone(),
            },
        );
        Credential::new(token).with_url(LOOPBACK_URL)
    }

    /// Makes the next connection attempt fail with `reason`.
    pub fn refuse_next_connect(&self, reason: impl Into<String>) {
        self.state.lock().refuse_next_connect = Some(reason.into());
    }

    /// Holds connection attempts until [`resume_connects`](Self::resume_connects) is called.
    pub fn pause_connects(&self) {
        self.paused.send_replace(true);
    }

    /// Releases held connection attempts.
    pub fn resume_connects(&self) {
        self.paused.send_replace(false);
    }

    /// Returns the identities connected to `room`, in arrival order.
    pub fn participants(&self, room: &RoomId) -> Vec<ParticipantIdentity> {
        self.state
            .lock()
            .rooms
            .get(room.as_str())
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the tracks `identity` has published in `room`.
    pub fn published_tracks(
        &self,
        room: &RoomId,
        identity: &ParticipantIdentity,
    ) -> Vec<(TrackSid, TrackKind)> {
        self.state
            .lock()
            .rooms
            .get(room.as_str())
            .and_then(|r| r.get(identity))
            .map(|m| m.published.iter().map(|(s, p)| (s.clone(), p.kind)).collect())
            .unwrap_or_default()
    }

    /// Removes a participant as a moderator would. Returns false if it was not connected.
    pub fn remove_participant(&self, room: &RoomId, identity: &ParticipantIdentity) -> bool {
        let mut state = self.state.lock();
        let Some(members) = state.rooms.get_mut(room.as_str()) else {
            return false;
        };
        let Some(member) = remove_member(members, identity) else {
            return false;
        };
        info!("removed {identity} from {room}");
        member.send(TransportEvent::Disconnected {
            reason: DisconnectReason::ParticipantRemoved,
        });
        true
    }

    /// Reports a non-fatal error to one participant.
    pub fn raise_exception(
        &self,
        room: &RoomId,
        identity: &ParticipantIdentity,
        message: impl Into<String>,
    ) {
        let state = self.state.lock();
        if let Some(member) = state.rooms.get(room.as_str()).and_then(|r| r.get(identity)) {
            member.send(TransportEvent::Exception {
                message: message.into(),
            });
        }
    }

    /// Closes a room, disconnecting everyone in it.
    pub fn close_room(&self, room: &RoomId) {
        let Some(members) = self.state.lock().rooms.remove(room.as_str()) else {
            return;
        };
        info!("closed room {room}");
        for member in members.values() {
            member.send(TransportEvent::Disconnected {
                reason: DisconnectReason::RoomDeleted,
            });
        }
    }

    fn admit(
        self: &Arc<Self>,
        credential: &Credential,
        options: ConnectOptions,
    ) -> Result<(LoopbackConnection, EventReceiver), TransportError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.refuse_next_connect.take() {
            return Err(TransportError::ConnectionRefused(reason));
        }
        let grant = state
            .grants
            .remove(credential.token())
            .ok_or_else(|| TransportError::InvalidCredential("unknown token".to_string()))?;
        let connection_id = state.next_id();
        let room = state.rooms.entry(grant.room.clone()).or_default();

        if let Some(previous) = remove_member(room, &grant.identity) {
            previous.send(TransportEvent::Disconnected {
                reason: DisconnectReason::DuplicateIdentity,
            });
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let info = RemoteParticipantInfo {
            identity: grant.identity.clone(),
            metadata: options.metadata,
        };
        for member in room.values() {
            let _ = events.send(TransportEvent::ParticipantConnected(member.info.clone()));
            member.send(TransportEvent::ParticipantConnected(info.clone()));
        }
        room.insert(
            grant.identity.clone(),
            Member {
                info,
                events,
                connection_id,
                auto_subscribe: options.auto_subscribe,
                published: IndexMap::new(),
                subscribed: HashSet::new(),
            },
        );
        if options.auto_subscribe {
            subscribe_existing(room, &grant.identity);
        }
        debug!("{} joined loopback room {}", grant.identity, grant.room);

        let connection = LoopbackConnection {
            hub: self.clone(),
            room: grant.room,
            identity: grant.identity,
            connection_id,
        };
        Ok((connection, receiver))
    }
}

/// Connects to a [`LoopbackHub`].
#[derive(Clone)]
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
    /// Creates a transport for `hub`.
    pub fn new(hub: Arc<LoopbackHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        _url: &str,
        credential: &Credential,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Connection>, EventReceiver), TransportError> {
        let mut paused = self.hub.paused.subscribe();
        paused
            .wait_for(|paused| !*paused)
            .await
            .map_err(|_| TransportError::Closed)?;
        let (connection, events) = self.hub.admit(credential, options)?;
        Ok((Arc::new(connection), events))
    }
}

struct LoopbackConnection {
    hub: Arc<LoopbackHub>,
    room: String,
    identity: ParticipantIdentity,
    connection_id: u64,
}

impl LoopbackConnection {
    /// Runs `f` against this connection's room, if the connection is still admitted.
    fn with_room<R>(
        &self,
        f: impl FnOnce(&mut HubState) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut state = self.hub.state.lock();
        let admitted = state
            .rooms
            .get(&self.room)
            .and_then(|r| r.get(&self.identity))
            .is_some_and(|m| m.connection_id == self.connection_id);
        if !admitted {
            return Err(TransportError::Closed);
        }
        f(&mut state)
    }

    fn room_mut<'a>(&self, state: &'a mut HubState) -> Result<&'a mut Room, TransportError> {
        state.rooms.get_mut(&self.room).ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn local_identity(&self) -> ParticipantIdentity {
        self.identity.clone()
    }

    async fn publish(&self, track: &LocalTrack) -> Result<TrackSid, TransportError> {
        self.with_room(|state| {
            let sid = TrackSid(format!("TR_{}", state.next_id()));
            let room = self.room_mut(state)?;
            let member = room.get_mut(&self.identity).ok_or(TransportError::Closed)?;
            member.published.insert(
                sid.clone(),
                Published {
                    kind: track.kind(),
                    name: track.name().to_string(),
                    handle: TrackHandle::new(track.clone()),
                },
            );
            fan_out_publish(room, &self.identity, &sid);
            debug!("{} published {} as {sid}", self.identity, track.kind());
            Ok(sid)
        })
    }

    async fn unpublish(&self, sid: &TrackSid) -> Result<(), TransportError> {
        self.with_room(|state| {
            let room = self.room_mut(state)?;
            let member = room.get_mut(&self.identity).ok_or(TransportError::Closed)?;
            let published = member
                .published
                .shift_remove(sid)
                .ok_or_else(|| TransportError::UnknownTrack(sid.clone()))?;
            fan_out_unpublish(room, &self.identity, sid, published.kind);
            Ok(())
        })
    }

    async fn unsubscribe(&self, sid: &TrackSid) -> Result<(), TransportError> {
        self.with_room(|state| {
            let room = self.room_mut(state)?;
            let publisher = room
                .iter()
                .find_map(|(identity, m)| m.published.get(sid).map(|p| (identity.clone(), p.kind)));
            let member = room.get_mut(&self.identity).ok_or(TransportError::Closed)?;
            if !member.subscribed.remove(sid) {
                return Err(TransportError::UnknownTrack(sid.clone()));
            }
            if let Some((participant, kind)) = publisher {
                member.send(TransportEvent::TrackUnsubscribed {
                    participant,
                    sid: sid.clone(),
                    kind,
                });
            }
            Ok(())
        })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let removed = self.with_room(|state| {
            let room = self.room_mut(state)?;
            Ok(remove_member(room, &self.identity))
        });
        if let Ok(Some(member)) = removed {
            debug!("{} left loopback room {}", self.identity, self.room);
            member.send(TransportEvent::Disconnected {
                reason: DisconnectReason::ClientInitiated,
            });
        }
        Ok(())
    }
}

/// Issues tokens from a [`LoopbackHub`] without any HTTP round trip.
pub struct LoopbackTokenProvider {
    hub: Arc<LoopbackHub>,
    refuse_next: Mutex<Option<String>>,
}

impl LoopbackTokenProvider {
    /// Creates a provider for `hub`.
    pub fn new(hub: Arc<LoopbackHub>) -> Self {
        Self {
            hub,
            refuse_next: Mutex::new(None),
        }
    }

    /// Makes the next token request fail with `reason`.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        *self.refuse_next.lock() = Some(reason.into());
    }
}

#[async_trait]
impl TokenProvider for LoopbackTokenProvider {
    async fn fetch_token(
        &self,
        room: &RoomId,
        identity: &Identity,
    ) -> Result<Credential, TokenError> {
        if let Some(reason) = self.refuse_next.lock().take() {
            return Err(TokenError::Rejected(reason));
        }
        Ok(self.hub.issue_token(room, identity.label()))
    }
}
