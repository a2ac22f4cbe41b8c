//! The session manager.
//!
//! [`SessionManager`] owns everything a session creates: the transport connection, the local
//! publication and the roster of remote participants. Operations that change local media are
//! serialized; [`leave`](SessionManager::leave) is not, so it can preempt an operation in
//! flight. Every join gets a fresh epoch, and an operation whose epoch has been superseded by a
//! leave discards its result and reports [`SessionError::Aborted`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ServerUrls, SessionConfig};
use crate::context::{JoinDefaults, RoomTicket};
use crate::devices::{
    CaptureConstraints, DeviceId, DeviceInfo, DeviceKind, MediaDevices, MediaError,
    SyntheticDevices,
};
use crate::identity::{Identity, Role, RoomId};
use crate::listener::SessionListener;
use crate::token::TokenProvider;
use crate::track::TrackKind;
use crate::transport::{ConnectOptions, Connection, DisconnectReason, Transport};
use crate::SessionError;

mod participant;
mod publication;
mod pump;
mod roster;
mod snapshot;

pub use participant::RemoteParticipant;
pub use publication::{LocalPublication, PublishedTrack};
pub use snapshot::{SessionSnapshot, SessionState};

use roster::Roster;

/// The result of [`SessionManager::switch_video_source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Video is now captured from this device.
    Switched(DeviceInfo),
    /// There was no other camera to switch to; the current one stays.
    Unchanged,
}

#[derive(Debug, Clone, Copy)]
enum LeaveCause {
    Local,
    Remote(DisconnectReason),
}

enum LeaveStart {
    Idle,
    /// Another leave is tearing down the session with this epoch.
    InProgress(u64),
    Teardown(Teardown),
}

/// Everything a leave has to release, detached from the session state.
struct Teardown {
    connection: Option<Arc<dyn Connection>>,
    publication: Option<LocalPublication>,
    participants: SmallVec<[RemoteParticipant; 8]>,
    cause: LeaveCause,
    epoch: u64,
}

impl Teardown {
    /// The connection to clean up on, if it is still usable.
    fn live_connection(&self) -> Option<&Arc<dyn Connection>> {
        match self.cause {
            LeaveCause::Local => self.connection.as_ref(),
            LeaveCause::Remote(_) => None,
        }
    }

    async fn run(self, shared: &Shared) {
        let connection = self.live_connection();

        if let Some(publication) = &self.publication {
            if let Some(connection) = connection {
                for published in publication.tracks() {
                    if let Err(e) = connection.unpublish(&published.sid).await {
                        debug!("failed to unpublish {}: {e}", published.sid);
                    }
                }
            }
            shared.release_publication(publication);
        }

        if let Some(connection) = connection {
            for participant in &self.participants {
                for track in participant.tracks() {
                    if let Err(e) = connection.unsubscribe(&track.sid).await {
                        debug!("failed to unsubscribe {}: {e}", track.sid);
                    }
                }
            }
        }
        shared.release_participants(&self.participants);

        if let Some(connection) = connection {
            info!("disconnecting from room");
            if let Err(e) = connection.disconnect().await {
                warn!("failed to disconnect: {e}");
            }
        }
        shared.finish_leave(self.cause, self.epoch);
    }

    /// Releases local state without touching the network.
    fn abandon(self, shared: &Shared) {
        if let Some(publication) = &self.publication {
            shared.release_publication(publication);
        }
        shared.release_participants(&self.participants);
        shared.finish_leave(self.cause, self.epoch);
    }
}

struct Core {
    state: SessionState,
    epoch: u64,
    room: Option<RoomId>,
    identity: Option<Identity>,
    role: Option<Role>,
    connection: Option<Arc<dyn Connection>>,
    publication: Option<LocalPublication>,
    roster: Roster,
    pump_cancel: Option<CancellationToken>,
    defaults: JoinDefaults,
}

impl Core {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            room: self.room.clone(),
            identity: self.identity.clone(),
            role: self.role,
            publication: self.publication.clone(),
            participants: self.roster.iter().cloned().collect(),
        }
    }

    fn require(&self, operation: &'static str, state: SessionState) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.room = None;
        self.identity = None;
        self.role = None;
        self.connection = None;
        self.publication = None;
        self.roster = Roster::new();
        if let Some(cancel) = self.pump_cancel.take() {
            cancel.cancel();
        }
    }
}

struct Shared {
    config: SessionConfig,
    urls: ServerUrls,
    token_provider: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
    devices: Arc<dyn MediaDevices>,
    listener: Option<Arc<dyn SessionListener>>,
    core: Mutex<Core>,
    snapshot: ArcSwap<SessionSnapshot>,
    state_tx: watch::Sender<SessionState>,
    /// Epoch of the last finished teardown.
    left_tx: watch::Sender<u64>,
    /// Serializes operations that change local media.
    media_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    /// Mutates the core state, then publishes the new snapshot and any state change.
    fn update<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let (result, changed) = {
            let mut core = self.core.lock();
            let before = core.state;
            let result = f(&mut core);
            self.snapshot.store(Arc::new(core.snapshot()));
            let changed = (core.state != before).then_some(core.state);
            if let Some(state) = changed {
                self.state_tx.send_replace(state);
            }
            (result, changed)
        };
        if let Some(state) = changed {
            debug!("session state: {state}");
            self.notify(|l| l.on_state_changed(state));
        }
        result
    }

    fn notify(&self, f: impl FnOnce(&dyn SessionListener)) {
        if let Some(listener) = &self.listener {
            f(listener.as_ref());
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.core.lock().epoch == epoch
    }

    /// Reports `Aborted` instead of `error` once a leave has superseded `epoch`.
    fn unless_left(&self, epoch: u64, error: SessionError) -> SessionError {
        if self.is_current(epoch) {
            error
        } else {
            SessionError::Aborted
        }
    }

    /// Returns the epoch of the connected session.
    fn connected_epoch(&self, operation: &'static str) -> Result<u64, SessionError> {
        let core = self.core.lock();
        core.require(operation, SessionState::Connected)?;
        Ok(core.epoch)
    }

    /// Returns the connection of session `epoch`, if it is still connected.
    fn connection_for(
        &self,
        epoch: u64,
        operation: &'static str,
    ) -> Result<Arc<dyn Connection>, SessionError> {
        let core = self.core.lock();
        if core.epoch != epoch {
            return Err(SessionError::Aborted);
        }
        core.require(operation, SessionState::Connected)?;
        core.connection.clone().ok_or(SessionError::InvalidState {
            operation,
            state: core.state,
        })
    }

    /// Returns `Idle` after a failed join, unless a leave already took over.
    fn abandon_join(&self, epoch: u64, error: SessionError) -> SessionError {
        let abandoned = self.update(|core| {
            if core.epoch != epoch {
                return false;
            }
            core.reset();
            true
        });
        if abandoned {
            error
        } else {
            SessionError::Aborted
        }
    }

    async fn establish(
        self: &Arc<Self>,
        epoch: u64,
        identity: &Identity,
        room: &RoomId,
        role: Role,
    ) -> Result<(), SessionError> {
        let credential = match self.token_provider.fetch_token(room, identity).await {
            Ok(credential) => credential,
            Err(e) => return Err(self.abandon_join(epoch, SessionError::CredentialUnavailable(e))),
        };
        if !self.is_current(epoch) {
            return Err(SessionError::Aborted);
        }

        let url = credential.url().unwrap_or(&self.urls.media_server).to_string();
        let options = ConnectOptions {
            metadata: Some(identity.metadata(role)),
            ..ConnectOptions::default()
        };
        debug!("connecting to {url}");
        let (connection, events) = match self.transport.connect(&url, &credential, options).await {
            Ok(connected) => connected,
            Err(e) => {
                return Err(self.abandon_join(epoch, SessionError::TransportConnectFailed(e)))
            }
        };

        let cancel = CancellationToken::new();
        let adopted = self.update(|core| {
            if core.epoch != epoch {
                return false;
            }
            core.connection = Some(connection.clone());
            core.pump_cancel = Some(cancel.clone());
            core.state = SessionState::Connected;
            true
        });
        if !adopted {
            info!("session was left while connecting; closing connection");
            if let Err(e) = connection.disconnect().await {
                debug!("failed to close abandoned connection: {e}");
            }
            return Err(SessionError::Aborted);
        }
        tokio::spawn(pump::run(Arc::downgrade(self), epoch, events, cancel));

        let constraints = self.config.constraints().clone().for_role(role);
        if constraints.requests_media() {
            if let Err(e) = self.publish(epoch, constraints).await {
                return match self.begin_leave(Some(epoch), LeaveCause::Local) {
                    LeaveStart::Teardown(teardown) => {
                        teardown.run(self).await;
                        Err(e)
                    }
                    LeaveStart::Idle | LeaveStart::InProgress(_) => Err(SessionError::Aborted),
                };
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        epoch: u64,
        constraints: CaptureConstraints,
    ) -> Result<LocalPublication, SessionError> {
        let _media = self.media_lock.lock().await;
        let connection = self.connection_for(epoch, "publish local media")?;

        if let Some(previous) = self.update(|core| core.publication.take()) {
            debug!("replacing existing local publication");
            for published in previous.tracks() {
                if let Err(e) = connection.unpublish(&published.sid).await {
                    warn!("failed to unpublish {}: {e}", published.sid);
                }
            }
            self.release_publication(&previous);
        }

        let media = self
            .devices
            .capture(&constraints)
            .await
            .map_err(|e| self.unless_left(epoch, SessionError::LocalMediaUnavailable(e)))?;
        let mut published: SmallVec<[PublishedTrack; 2]> = SmallVec::new();
        for track in media.tracks() {
            match connection.publish(track).await {
                Ok(sid) => {
                    debug!("published {} track as {sid}", track.kind());
                    published.push(PublishedTrack {
                        sid,
                        track: track.clone(),
                    });
                }
                Err(e) => {
                    for done in &published {
                        if let Err(e) = connection.unpublish(&done.sid).await {
                            debug!("failed to unpublish {}: {e}", done.sid);
                        }
                    }
                    media.stop();
                    return Err(self.unless_left(epoch, SessionError::Transport(e)));
                }
            }
        }

        let publication = LocalPublication::new(published, constraints);
        let adopted = self.update(|core| {
            if core.epoch != epoch || core.state != SessionState::Connected {
                return false;
            }
            core.publication = Some(publication.clone());
            true
        });
        if !adopted {
            for done in publication.tracks() {
                if let Err(e) = connection.unpublish(&done.sid).await {
                    debug!("failed to unpublish {}: {e}", done.sid);
                }
            }
            publication.stop();
            return Err(SessionError::Aborted);
        }
        info!(
            "publishing {} local track(s)",
            publication.tracks().len()
        );
        self.notify(|l| l.on_local_published(&publication));
        Ok(publication)
    }

    async fn switch_video(
        &self,
        epoch: u64,
        target: Option<DeviceId>,
    ) -> Result<SwitchOutcome, SessionError> {
        let _media = self.media_lock.lock().await;
        let connection = self.connection_for(epoch, "switch video source")?;
        let (current, constraints) = {
            let core = self.core.lock();
            let publication = core
                .publication
                .as_ref()
                .ok_or(SessionError::NoLocalPublication)?;
            let video = publication
                .video()
                .cloned()
                .ok_or(SessionError::NoLocalPublication)?;
            (video, publication.constraints().clone())
        };

        let cameras: SmallVec<[DeviceInfo; 4]> = self
            .devices
            .enumerate()
            .await
            .map_err(SessionError::Media)?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect();
        if cameras.len() <= 1 {
            debug!("no other camera to switch to");
            return Ok(SwitchOutcome::Unchanged);
        }
        let current_device = current.track.device().id.clone();
        let next = match target {
            Some(id) if id == current_device => return Ok(SwitchOutcome::Unchanged),
            Some(id) => match cameras.iter().find(|d| d.id == id) {
                Some(device) => device.clone(),
                None => {
                    return Err(SessionError::LocalMediaUnavailable(
                        MediaError::DeviceNotFound(id),
                    ))
                }
            },
            None => next_camera(&cameras, &current_device).clone(),
        };

        let replacement = CaptureConstraints {
            audio: false,
            video: true,
            video_device: Some(next.id.clone()),
            ..constraints
        };
        let media = self
            .devices
            .capture(&replacement)
            .await
            .map_err(|e| self.unless_left(epoch, SessionError::LocalMediaUnavailable(e)))?;
        let Some(new_track) = media
            .tracks()
            .iter()
            .find(|t| t.kind() == TrackKind::Video)
            .cloned()
        else {
            media.stop();
            return Err(SessionError::LocalMediaUnavailable(MediaError::NoDevice(
                DeviceKind::VideoInput,
            )));
        };

        if let Err(e) = connection.unpublish(&current.sid).await {
            media.stop();
            return Err(self.unless_left(epoch, SessionError::Transport(e)));
        }
        let sid = match connection.publish(&new_track).await {
            Ok(sid) => sid,
            Err(e) => {
                media.stop();
                warn!("failed to publish video from {}, restoring {current_device}: {e}", next.id);
                self.restore_video(epoch, connection.as_ref(), current).await;
                return Err(self.unless_left(epoch, SessionError::Transport(e)));
            }
        };
        current.track.stop();

        let published = PublishedTrack {
            sid,
            track: new_track,
        };
        let updated = self.update(|core| {
            if core.epoch != epoch {
                return None;
            }
            let publication = core.publication.as_mut()?;
            publication.replace_video(published.clone());
            Some(publication.clone())
        });
        let Some(updated) = updated else {
            if let Err(e) = connection.unpublish(&published.sid).await {
                debug!("failed to unpublish {}: {e}", published.sid);
            }
            published.track.stop();
            return Err(SessionError::Aborted);
        };
        info!("switched camera to {} ({})", next.label, next.id);
        self.notify(|l| l.on_local_published(&updated));
        Ok(SwitchOutcome::Switched(next))
    }

    /// Puts the previous video track back after a failed switch.
    async fn restore_video(&self, epoch: u64, connection: &dyn Connection, previous: PublishedTrack) {
        let restored = match connection.publish(&previous.track).await {
            Ok(sid) => Some(PublishedTrack {
                sid,
                track: previous.track.clone(),
            }),
            Err(e) => {
                warn!("failed to restore previous video: {e}");
                previous.track.stop();
                None
            }
        };
        let updated = self.update(|core| {
            if core.epoch != epoch {
                return None;
            }
            let publication = core.publication.as_mut()?;
            match restored {
                Some(restored) => {
                    publication.replace_video(restored);
                }
                None => {
                    publication.remove_video();
                }
            }
            Some(publication.clone())
        });
        if let Some(updated) = updated {
            self.notify(|l| l.on_local_published(&updated));
        }
    }

    /// Detaches the session state for teardown.
    fn begin_leave(&self, epoch: Option<u64>, cause: LeaveCause) -> LeaveStart {
        self.update(|core| {
            if epoch.is_some_and(|epoch| epoch != core.epoch) {
                return LeaveStart::Idle;
            }
            match core.state {
                SessionState::Idle => LeaveStart::Idle,
                SessionState::Disconnecting => LeaveStart::InProgress(core.epoch),
                SessionState::Connecting | SessionState::Connected => {
                    core.epoch += 1;
                    core.state = SessionState::Disconnecting;
                    if let Some(cancel) = core.pump_cancel.take() {
                        cancel.cancel();
                    }
                    LeaveStart::Teardown(Teardown {
                        connection: core.connection.take(),
                        publication: core.publication.take(),
                        participants: core.roster.drain(),
                        cause,
                        epoch: core.epoch,
                    })
                }
            }
        })
    }

    fn release_publication(&self, publication: &LocalPublication) {
        publication.stop();
        self.notify(|l| l.on_local_unpublished(publication));
    }

    fn release_participants(&self, participants: &[RemoteParticipant]) {
        for participant in participants {
            for track in participant.tracks() {
                self.notify(|l| l.on_track_unsubscribed(participant.identity(), track));
            }
            self.notify(|l| l.on_participant_left(participant.identity()));
        }
    }

    fn finish_leave(&self, cause: LeaveCause, epoch: u64) {
        let defaults = JoinDefaults::fresh(self.config.default_room_id());
        let room = self.update(|core| {
            let room = core.room.take();
            core.reset();
            core.defaults = defaults;
            room
        });
        self.left_tx.send_replace(epoch);
        match (cause, room) {
            (LeaveCause::Local, Some(room)) => info!("left {room}"),
            (LeaveCause::Remote(reason), Some(room)) => info!("left {room}: {reason}"),
            (_, None) => info!("left session"),
        }
    }
}

/// Picks the camera after `current` in enumeration order, wrapping around.
fn next_camera<'a>(cameras: &'a [DeviceInfo], current: &DeviceId) -> &'a DeviceInfo {
    match cameras.iter().position(|d| &d.id == current) {
        Some(index) => &cameras[(index + 1) % cameras.len()],
        None => &cameras[0],
    }
}

/// Drives one client through conferencing sessions.
///
/// The manager is cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Starts building a manager.
    pub fn builder(config: SessionConfig) -> SessionManagerBuilder {
        SessionManagerBuilder::new(config)
    }

    /// Joins `room` as `identity`.
    ///
    /// Fetches a credential, connects, and (for [`Role::Talker`]) publishes camera and
    /// microphone with the configured constraints. On failure the manager is back in
    /// [`SessionState::Idle`] with nothing left open. If [`leave`](Self::leave) is called while
    /// the join is in flight, the join undoes its own work and returns
    /// [`SessionError::Aborted`]. An identity with a blank display name is rejected with
    /// [`SessionError::InvalidJoinForm`].
    pub async fn join(
        &self,
        identity: Identity,
        room: RoomId,
        role: Role,
    ) -> Result<(), SessionError> {
        if identity.display_name().trim().is_empty() {
            return Err(SessionError::InvalidJoinForm(
                "participant name is required".to_string(),
            ));
        }
        let epoch = self.shared.update(|core| {
            core.require("join", SessionState::Idle)?;
            core.epoch += 1;
            core.state = SessionState::Connecting;
            core.room = Some(room.clone());
            core.identity = Some(identity.clone());
            core.role = Some(role);
            Ok::<_, SessionError>(core.epoch)
        })?;
        info!("joining {room} as {} ({role})", identity.label());

        let result = self.shared.establish(epoch, &identity, &room, role).await;
        match &result {
            Ok(()) => info!("joined {room}"),
            Err(e) => warn!("failed to join {room}: {e}"),
        }
        result
    }

    /// Joins the room named by a validated join form.
    pub async fn join_ticket(&self, ticket: &RoomTicket) -> Result<(), SessionError> {
        self.join(ticket.identity(), ticket.room.clone(), ticket.role)
            .await
    }

    /// Captures and publishes local media, replacing any current publication.
    pub async fn publish_local_media(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<LocalPublication, SessionError> {
        let epoch = self.shared.connected_epoch("publish local media")?;
        self.shared.publish(epoch, constraints).await
    }

    /// Moves the published video to another camera.
    ///
    /// With no `target`, the camera after the current one in enumeration order is used. If
    /// there is at most one camera this does nothing. If the new camera cannot be published,
    /// the previous one is put back and the error is returned.
    pub async fn switch_video_source(
        &self,
        target: Option<DeviceId>,
    ) -> Result<SwitchOutcome, SessionError> {
        let epoch = self.shared.connected_epoch("switch video source")?;
        self.shared.switch_video(epoch, target).await
    }

    /// Leaves the session, releasing everything it holds.
    ///
    /// Does nothing when idle. If another leave is already tearing down, waits for it.
    pub async fn leave(&self) {
        match self.shared.begin_leave(None, LeaveCause::Local) {
            LeaveStart::Idle => debug!("leave: no active session"),
            LeaveStart::InProgress(epoch) => {
                let mut left = self.shared.left_tx.subscribe();
                let _ = left.wait_for(|left| *left >= epoch).await;
            }
            LeaveStart::Teardown(teardown) => teardown.run(&self.shared).await,
        }
    }

    /// Starts a leave without waiting for it, e.g. from a shutdown hook.
    ///
    /// The session is `Disconnecting` (or already `Idle`) when this returns. Inside a tokio
    /// runtime the teardown runs on a spawned task, whose handle is returned. Outside one,
    /// local media is released immediately and the connection is dropped without a goodbye.
    pub fn begin_shutdown(&self) -> Option<JoinHandle<()>> {
        let LeaveStart::Teardown(teardown) = self.shared.begin_leave(None, LeaveCause::Local)
        else {
            return None;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = self.shared.clone();
                Some(runtime.spawn(async move { teardown.run(&shared).await }))
            }
            Err(_) => {
                teardown.abandon(&self.shared);
                None
            }
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.snapshot.load().state
    }

    /// Returns a consistent view of the session.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// Returns a receiver that observes state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns the suggested join form values. Regenerated after every leave.
    pub fn join_defaults(&self) -> JoinDefaults {
        self.shared.core.lock().defaults.clone()
    }
}

/// Builds a [`SessionManager`].
#[must_use]
pub struct SessionManagerBuilder {
    config: SessionConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
    transport: Option<Arc<dyn Transport>>,
    devices: Option<Arc<dyn MediaDevices>>,
    listener: Option<Arc<dyn SessionListener>>,
}

impl SessionManagerBuilder {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            token_provider: None,
            transport: None,
            devices: None,
            listener: None,
        }
    }

    /// Sets the credential source. Required.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Sets the media transport. Required.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the capture devices. Defaults to [`SyntheticDevices`] with one camera.
    pub fn devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Sets a listener for session events.
    pub fn listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Builds the manager.
    ///
    /// Returns an error if no token provider or transport was set.
    pub fn build(self) -> Result<SessionManager, SessionError> {
        let token_provider = self.token_provider.ok_or_else(|| {
            SessionError::Configuration("no token provider configured".to_string())
        })?;
        let transport = self
            .transport
            .ok_or_else(|| SessionError::Configuration("no transport configured".to_string()))?;
        let devices = self
            .devices
            .unwrap_or_else(|| Arc::new(SyntheticDevices::default()));
        let urls = self.config.server_urls();
        let defaults = JoinDefaults::fresh(self.config.default_room_id());
        let core = Core {
            state: SessionState::Idle,
            epoch: 0,
            room: None,
            identity: None,
            role: None,
            connection: None,
            publication: None,
            roster: Roster::new(),
            pump_cancel: None,
            defaults,
        };
        Ok(SessionManager {
            shared: Arc::new(Shared {
                config: self.config,
                urls,
                token_provider,
                transport,
                devices,
                listener: self.listener,
                core: Mutex::new(core),
                snapshot: ArcSwap::from_pointee(SessionSnapshot::default()),
                state_tx: watch::Sender::new(SessionState::Idle),
                left_tx: watch::Sender::new(0),
                media_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}
