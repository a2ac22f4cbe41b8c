//! Support for end-to-end tests: a mock token server and session clients wired to a loopback
//! hub through real HTTP token flows.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use huddle::testutil::{assert_eventually, RecordingListener};
use huddle::token::{LivekitTokenProvider, OpenViduTokenProvider};
use huddle::transport::loopback::{LoopbackHub, LoopbackTransport};
use huddle::{
    Identity, ParticipantIdentity, Role, RoomId, SessionConfig, SessionError, SessionManager,
    SyntheticDevices, TokenProvider,
};

pub mod mock_server;

use mock_server::TokenServerHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Which token flow a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlow {
    OpenVidu,
    Livekit,
}

/// A session manager with recording hooks.
pub struct TestClient {
    pub manager: SessionManager,
    pub listener: Arc<RecordingListener>,
    pub devices: Arc<SyntheticDevices>,
    pub identity: Identity,
}

impl TestClient {
    /// Builds a client that fetches tokens from `server` and connects to `hub`.
    pub fn new(
        name: &str,
        hub: &Arc<LoopbackHub>,
        server: &TokenServerHandle,
        flow: TokenFlow,
        cameras: usize,
    ) -> Result<Self> {
        let config = SessionConfig::new()
            .token_server_url(server.url())
            .token_timeout(TIMEOUT);
        let client = config.token_client()?;
        let token_provider: Arc<dyn TokenProvider> = match flow {
            TokenFlow::OpenVidu => Arc::new(OpenViduTokenProvider::new(client)),
            TokenFlow::Livekit => Arc::new(LivekitTokenProvider::new(client)),
        };
        let listener = RecordingListener::new();
        let devices = Arc::new(SyntheticDevices::with_cameras(cameras));
        let manager = SessionManager::builder(config)
            .token_provider(token_provider)
            .transport(Arc::new(LoopbackTransport::new(hub.clone())))
            .devices(devices.clone())
            .listener(listener.clone())
            .build()?;
        Ok(Self {
            manager,
            listener,
            devices,
            identity: Identity::with_label(name, format!("{}-test", name.to_lowercase())),
        })
    }

    pub fn label(&self) -> &ParticipantIdentity {
        self.identity.label()
    }

    pub async fn join(&self, room: &RoomId, role: Role) -> Result<(), SessionError> {
        self.manager
            .join(self.identity.clone(), room.clone(), role)
            .await
    }

    /// Waits until `count` remote participants with `tracks` tracks each are visible.
    pub async fn wait_for_peers(&self, count: usize, tracks: usize) {
        let manager = self.manager.clone();
        assert_eventually(TIMEOUT, move || {
            let snapshot = manager.snapshot();
            snapshot.participants.len() == count
                && snapshot
                    .participants
                    .iter()
                    .all(|p| p.tracks().len() == tracks)
        })
        .await;
    }
}
