use std::sync::Weak;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LeaveCause, LeaveStart, Shared};
use crate::identity::ParticipantIdentity;
use crate::track::{RemoteTrack, TrackSid};
use crate::transport::{DisconnectReason, EventReceiver, RemoteParticipantInfo, TransportEvent};

/// Drains a connection's events, one at a time, until cancelled or disconnected.
pub(super) async fn run(
    shared: Weak<Shared>,
    epoch: u64,
    mut events: EventReceiver,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let Some(event) = event else {
            warn!("transport event stream ended");
            shared
                .remote_disconnect(epoch, DisconnectReason::ConnectionLost)
                .await;
            break;
        };
        debug!("transport event: {event:?}");
        if !shared.handle_event(epoch, event).await {
            break;
        }
    }
    debug!("stopped listening for transport events");
}

impl Shared {
    /// Applies one event. Returns false once the connection is gone.
    async fn handle_event(&self, epoch: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::ParticipantConnected(info) => {
                info!("entered the room: {}", info.identity);
            }
            TransportEvent::TrackSubscribed { participant, track } => {
                self.track_subscribed(epoch, &participant, track);
            }
            TransportEvent::TrackUnsubscribed {
                participant, sid, ..
            } => {
                self.track_unsubscribed(epoch, &participant, &sid);
            }
            TransportEvent::ParticipantDisconnected(identity) => {
                self.participant_disconnected(epoch, &identity);
            }
            TransportEvent::Exception { message } => {
                warn!("transport exception: {message}");
                self.notify(|l| l.on_exception(&message));
            }
            TransportEvent::Disconnected { reason } if reason.is_client_initiated() => {
                debug!("connection closed by this client");
                return false;
            }
            TransportEvent::Disconnected { reason } => {
                info!("disconnected: {reason}");
                self.remote_disconnect(epoch, reason).await;
                return false;
            }
        }
        true
    }

    fn track_subscribed(&self, epoch: u64, info: &RemoteParticipantInfo, track: RemoteTrack) {
        let outcome = self.update(|core| {
            if core.epoch != epoch {
                return None;
            }
            let replaced = core.roster.insert_track(info, track.clone());
            let participant = core.roster.get(&info.identity).cloned()?;
            debug!("{} remote participant(s) visible", core.roster.len());
            Some((participant, replaced))
        });
        let Some((participant, replaced)) = outcome else {
            return;
        };
        if let Some(replaced) = replaced {
            self.notify(|l| l.on_track_unsubscribed(participant.identity(), &replaced));
        }
        info!(
            "subscribed to {} track {} of {}",
            track.kind, track.sid, info.identity
        );
        self.notify(|l| l.on_track_subscribed(&participant, &track));
    }

    fn track_unsubscribed(&self, epoch: u64, identity: &ParticipantIdentity, sid: &TrackSid) {
        let removal = self.update(|core| {
            if core.epoch != epoch {
                return None;
            }
            core.roster.remove_track(identity, sid)
        });
        let Some(removal) = removal else {
            debug!("ignoring unsubscribe of unknown track {sid}");
            return;
        };
        self.notify(|l| l.on_track_unsubscribed(identity, &removal.track));
        if removal.participant_left {
            self.notify(|l| l.on_participant_left(identity));
        }
    }

    fn participant_disconnected(&self, epoch: u64, identity: &ParticipantIdentity) {
        let removed = self.update(|core| {
            if core.epoch != epoch {
                return None;
            }
            core.roster.remove_participant(identity)
        });
        match removed {
            Some(participant) => self.release_participants(&[participant]),
            None => debug!("participant {identity} left without visible tracks"),
        }
    }

    /// Tears the session down after the server ended the connection.
    async fn remote_disconnect(&self, epoch: u64, reason: DisconnectReason) {
        if let LeaveStart::Teardown(teardown) =
            self.begin_leave(Some(epoch), LeaveCause::Remote(reason))
        {
            teardown.run(self).await;
        }
    }
}
