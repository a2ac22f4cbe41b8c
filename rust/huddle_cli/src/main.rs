//! Joins a conferencing room from the terminal.
//!
//! With the default loopback transport, a few demo peers join the same in-process room so there
//! is something to look at. Type `help` once connected for the available commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use huddle::devices::DeviceId;
use huddle::tiles;
use huddle::token::{LivekitTokenProvider, OpenViduTokenProvider};
use huddle::transport::loopback::{LoopbackHub, LoopbackTokenProvider, LoopbackTransport};
use huddle::{
    Identity, JoinForm, ParticipantIdentity, RemoteParticipant, RemoteTrack, Role,
    SessionConfig, SessionListener, SessionManager, SessionState, SwitchOutcome,
    SyntheticDevices, TicketStore, TokenProvider, Transport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// In-process room with demo peers.
    Loopback,
    /// A LiveKit server.
    Livekit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Two-step OpenVidu session/connection flow.
    Openvidu,
    /// Single-step LiveKit token flow.
    Livekit,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Display name. Defaults to a random `ParticipantN`.
    #[arg(long)]
    name: Option<String>,
    /// Room to join. Defaults to the configured default room.
    #[arg(long)]
    room: Option<String>,
    /// Join as a talker (publish camera and microphone) or a watcher.
    #[arg(long, default_value = "talker")]
    mode: Role,
    /// Media transport.
    #[arg(long, value_enum, default_value_t = TransportKind::Loopback)]
    transport: TransportKind,
    /// Token server flavor, for the livekit transport.
    #[arg(long, value_enum, default_value_t = Backend::Openvidu)]
    backend: Backend,
    /// Host running the token and media servers.
    #[arg(long)]
    hostname: Option<String>,
    /// Token server URL. Overrides the host-derived default.
    #[arg(long)]
    token_url: Option<String>,
    /// Media server URL. Overrides the host-derived default.
    #[arg(long)]
    media_url: Option<String>,
    /// Demo peers joining the loopback room.
    #[arg(long, default_value_t = 2)]
    peers: usize,
    /// Synthetic cameras to offer.
    #[arg(long, default_value_t = 2)]
    cameras: usize,
}

impl Cli {
    fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::new();
        if let Some(hostname) = &self.hostname {
            config = config.hostname(hostname);
        }
        if let Some(url) = &self.token_url {
            config = config.token_server_url(url);
        }
        if let Some(url) = &self.media_url {
            config = config.media_server_url(url);
        }
        config
    }
}

/// Logs session events for the terminal.
struct ConsoleListener;

impl SessionListener for ConsoleListener {
    fn on_state_changed(&self, state: SessionState) {
        info!("session {state}");
    }

    fn on_track_subscribed(&self, participant: &RemoteParticipant, track: &RemoteTrack) {
        info!("attach {} from {}", track.kind, participant.label().caption());
    }

    fn on_track_unsubscribed(&self, participant: &ParticipantIdentity, track: &RemoteTrack) {
        info!("detach {} from {participant}", track.kind);
    }

    fn on_participant_left(&self, participant: &ParticipantIdentity) {
        info!("{participant} left");
    }

    fn on_exception(&self, message: &str) {
        warn!("transport exception: {message}");
    }
}

type Backends = (Arc<dyn TokenProvider>, Arc<dyn Transport>, Option<Arc<LoopbackHub>>);

fn backends(cli: &Cli, config: &SessionConfig) -> Result<Backends> {
    match cli.transport {
        TransportKind::Loopback => {
            let hub = LoopbackHub::new();
            Ok((
                Arc::new(LoopbackTokenProvider::new(hub.clone())),
                Arc::new(LoopbackTransport::new(hub.clone())),
                Some(hub),
            ))
        }
        TransportKind::Livekit => {
            let client = config.token_client()?;
            let provider: Arc<dyn TokenProvider> = match cli.backend {
                Backend::Openvidu => Arc::new(OpenViduTokenProvider::new(client)),
                Backend::Livekit => Arc::new(LivekitTokenProvider::new(client)),
            };
            Ok((provider, livekit_transport()?, None))
        }
    }
}

#[cfg(feature = "livekit")]
fn livekit_transport() -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(huddle::transport::livekit_room::LivekitTransport::new()))
}

#[cfg(not(feature = "livekit"))]
fn livekit_transport() -> Result<Arc<dyn Transport>> {
    anyhow::bail!("this build has no livekit support; rebuild with `--features livekit`")
}

/// Joins `count` talkers to the loopback room, returning their managers.
async fn spawn_peers(
    hub: &Arc<LoopbackHub>,
    config: &SessionConfig,
    room: &huddle::RoomId,
    count: usize,
) -> Result<Vec<SessionManager>> {
    let mut peers = Vec::with_capacity(count);
    for i in 0..count {
        let peer = SessionManager::builder(config.clone())
            .token_provider(Arc::new(LoopbackTokenProvider::new(hub.clone())))
            .transport(Arc::new(LoopbackTransport::new(hub.clone())))
            .build()?;
        peer.join(Identity::new(format!("Peer{i}")), room.clone(), Role::Talker)
            .await
            .with_context(|| format!("demo peer {i} failed to join"))?;
        peers.push(peer);
    }
    Ok(peers)
}

enum Command {
    Continue,
    Quit,
}

async fn run_command(manager: &SessionManager, line: &str) -> Command {
    let mut words = line.split_whitespace();
    match words.next() {
        None => {}
        Some("tiles") => {
            let tiles = tiles::layout(&manager.snapshot());
            if tiles.is_empty() {
                println!("(no tiles)");
            } else {
                println!("{}", tiles::render(&tiles));
            }
        }
        Some("switch") => {
            let target = words.next().map(DeviceId::from);
            match manager.switch_video_source(target).await {
                Ok(SwitchOutcome::Switched(device)) => println!("now using {}", device.label),
                Ok(SwitchOutcome::Unchanged) => println!("camera unchanged"),
                Err(e) => println!("switch failed: {e}"),
            }
        }
        Some("state") => println!("{}", manager.state()),
        Some("leave" | "quit" | "exit") => return Command::Quit,
        Some("help") => println!("commands: tiles, switch [device], state, leave"),
        Some(other) => println!("unknown command {other:?}; try `help`"),
    }
    Command::Continue
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let cli = Cli::parse();
    let config = cli.config();
    let (token_provider, transport, hub) = backends(&cli, &config)?;
    let devices = Arc::new(SyntheticDevices::with_cameras(cli.cameras));
    let manager = SessionManager::builder(config.clone())
        .token_provider(token_provider)
        .transport(transport)
        .devices(devices)
        .listener(Arc::new(ConsoleListener))
        .build()?;

    let mut form = JoinForm::from_defaults(&manager.join_defaults());
    if let Some(name) = &cli.name {
        form.participant_name.clone_from(name);
    }
    if let Some(room) = &cli.room {
        form.room.clone_from(room);
    }
    form.role = cli.mode;
    let ticket = form.validate()?;
    let tickets = TicketStore::new();
    tickets.set(ticket.clone());

    let peers = match &hub {
        Some(hub) => spawn_peers(hub, &config, &ticket.room, cli.peers).await?,
        None => Vec::new(),
    };

    manager
        .join_ticket(&ticket)
        .await
        .with_context(|| format!("failed to join {}", ticket.room))?;
    println!("joined {} as {}; type `help` for commands", ticket.room, ticket.participant_name);

    let mut state = manager.watch_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, leaving");
                if let Some(teardown) = manager.begin_shutdown() {
                    _ = teardown.await;
                }
                break;
            }
            changed = state.wait_for(|s| *s == SessionState::Idle) => {
                if changed.is_ok() {
                    println!("disconnected from {}", ticket.room);
                }
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    manager.leave().await;
                    break;
                };
                if let Command::Quit = run_command(&manager, &line).await {
                    manager.leave().await;
                    break;
                }
            }
        }
    }
    tickets.clear();

    for peer in peers {
        peer.leave().await;
    }
    Ok(())
}
