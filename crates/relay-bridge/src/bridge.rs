use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::types::ProjectConfig;
use relay_protocol::codec::encode;
use relay_protocol::envelope::{
    AckPayload, ByePayload, Capabilities, Envelope, EnvelopeBody, HelloPayload, PongPayload,
    SendPayload, BROADCAST,
};
use relay_protocol::FrameParser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::connection::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
use crate::error::BridgeError;

const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(5);

/// Handshake identity and reconnect policy for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub agent_name: String,
    pub reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            agent_name: "__BridgeClient".into(),
            reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: None,
        }
    }
}

impl From<&relay_core::config::BridgeConfig> for BridgeOptions {
    fn from(cfg: &relay_core::config::BridgeConfig) -> Self {
        Self {
            agent_name: cfg.agent_name.clone(),
            reconnect: cfg.reconnect,
            reconnect_delay_ms: cfg.reconnect_delay_ms,
            max_reconnect_delay_ms: cfg.max_reconnect_delay_ms,
            max_reconnect_attempts: cfg.max_reconnect_attempts,
        }
    }
}

/// Events a caller observes out-of-band from the synchronous call surface.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    StateChanged { project_id: String, connected: bool },
    Delivered {
        project_id: String,
        from: Option<String>,
        body: String,
        envelope_id: String,
    },
}

#[derive(Debug, Clone)]
struct LeadEntry {
    name: String,
    #[allow(dead_code)]
    connected: bool,
}

struct ConnHandle {
    config: ProjectConfig,
    ready: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    sm: Arc<AsyncMutex<ConnectionStateMachine>>,
    task: JoinHandle<()>,
}

/// Fan-out client that maintains one connection per configured project,
/// performs the HELLO/WELCOME handshake on each, and routes messages to
/// named agents, project leads, or everyone at once.
pub struct Bridge {
    options: BridgeOptions,
    connections: AsyncMutex<HashMap<String, ConnHandle>>,
    leads: AsyncMutex<HashMap<String, LeadEntry>>,
    shutdown: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                options,
                connections: AsyncMutex::new(HashMap::new()),
                leads: AsyncMutex::new(HashMap::new()),
                shutdown: Arc::new(AtomicBool::new(false)),
                events_tx,
            },
            events_rx,
        )
    }

    /// Opens every configured project concurrently. Succeeds only once every
    /// project has reached `Ready`. Projects that already reached `Ready`
    /// before a later project failed are left connected — the caller is
    /// expected to call [`Bridge::disconnect`] to clean up (see DESIGN.md).
    pub async fn connect(&self, projects: Vec<ProjectConfig>) -> Result<(), BridgeError> {
        let mut pending = Vec::with_capacity(projects.len());

        for project in projects {
            let ready = Arc::new(AtomicBool::new(false));
            let sm = Arc::new(AsyncMutex::new(ConnectionStateMachine::new()));
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (first_tx, first_rx) = oneshot::channel();

            let task = tokio::spawn(connection_task(
                project.clone(),
                self.options.clone(),
                ready.clone(),
                sm.clone(),
                self.shutdown.clone(),
                outbound_rx,
                self.events_tx.clone(),
                first_tx,
            ));

            let handle = ConnHandle {
                config: project.clone(),
                ready,
                outbound: outbound_tx,
                sm,
                task,
            };
            self.connections.lock().await.insert(project.id.clone(), handle);
            pending.push(first_rx);
        }

        let mut first_error = None;
        for first_rx in pending {
            match first_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => continue,
            };
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Sends `body` to `to` on `project_id`. `to == "lead"` resolves through
    /// the registered lead directory, falling back to the project's
    /// configured lead name. Returns `false` (never errors) if the project
    /// is unknown, not yet `Ready`, or the write fails.
    pub async fn send_to_project(&self, project_id: &str, to: &str, body: &str) -> bool {
        let resolved_lead = if to == "lead" {
            self.leads.lock().await.get(project_id).map(|l| l.name.clone())
        } else {
            None
        };

        let connections = self.connections.lock().await;
        let Some(conn) = connections.get(project_id) else {
            return false;
        };
        if !conn.ready.load(Ordering::SeqCst) {
            return false;
        }

        let to_name = if to == "lead" {
            resolved_lead.unwrap_or_else(|| conn.config.lead_name.clone())
        } else {
            to.to_string()
        };

        let envelope = Envelope::new(now_millis(), EnvelopeBody::Send(SendPayload::message(body)))
            .to(to_name)
            .from(self.options.agent_name.clone());

        match encode(&envelope) {
            Ok(bytes) => conn.outbound.send(bytes).is_ok(),
            Err(_) => false,
        }
    }

    /// Sends `body` to the `"lead"` alias of every project. Not-ready
    /// projects are skipped (their send naturally returns false).
    pub async fn broadcast_to_leads(&self, body: &str) {
        let ids: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        for id in ids {
            self.send_to_project(&id, "lead", body).await;
        }
    }

    /// Sends `body` to every agent (`to = "*"`) in every `Ready` project.
    pub async fn broadcast_all(&self, body: &str) {
        let connections = self.connections.lock().await;
        for conn in connections.values() {
            if !conn.ready.load(Ordering::SeqCst) {
                continue;
            }
            let envelope =
                Envelope::new(now_millis(), EnvelopeBody::Send(SendPayload::message(body)))
                    .to(BROADCAST)
                    .from(self.options.agent_name.clone());
            if let Ok(bytes) = encode(&envelope) {
                let _ = conn.outbound.send(bytes);
            }
        }
    }

    /// Upserts `lead_name` as the current lead for `project_id`. Does not
    /// validate that the project exists.
    pub async fn register_lead(&self, project_id: &str, lead_name: &str) {
        let connected = self
            .connections
            .lock()
            .await
            .get(project_id)
            .map(|c| c.ready.load(Ordering::SeqCst))
            .unwrap_or(false);
        self.leads.lock().await.insert(
            project_id.to_string(),
            LeadEntry {
                name: lead_name.to_string(),
                connected,
            },
        );
    }

    pub async fn get_connected_projects(&self) -> Vec<String> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|(_, c)| c.ready.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// For tests and diagnostics: the lifecycle state of one project's
    /// connection, if it has ever been opened.
    pub async fn connection_state(&self, project_id: &str) -> Option<ConnectionState> {
        let connections = self.connections.lock().await;
        let conn = connections.get(project_id)?;
        let state = conn.sm.lock().await.state();
        Some(state)
    }

    /// Sets the shutdown latch (inhibiting further reconnects), best-effort
    /// sends BYE on every connection, and clears all state. Idempotent: a
    /// second call observes an already-empty table and does nothing further.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut connections = self.connections.lock().await;
        for (_, conn) in connections.drain() {
            let bye = Envelope::new(now_millis(), EnvelopeBody::Bye(ByePayload {}))
                .from(self.options.agent_name.clone());
            if let Ok(bytes) = encode(&bye) {
                let _ = conn.outbound.send(bytes);
            }
            conn.task.abort();
        }
        self.leads.lock().await.clear();
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn to_io_err(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

async fn note(sm: &AsyncMutex<ConnectionStateMachine>, event: ConnectionEvent) {
    if let Err(e) = sm.lock().await.transition(event) {
        tracing::debug!(%e, "connection state machine observed an out-of-band event");
    }
}

#[allow(clippy::too_many_arguments)]
async fn connection_task(
    project: ProjectConfig,
    options: BridgeOptions,
    ready: Arc<AtomicBool>,
    sm: Arc<AsyncMutex<ConnectionStateMachine>>,
    shutdown: Arc<AtomicBool>,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    first_attempt_tx: oneshot::Sender<Result<(), BridgeError>>,
) {
    let mut first_attempt_tx = Some(first_attempt_tx);
    let mut attempts: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        if attempts == 0 {
            note(&sm, ConnectionEvent::Open).await;
        } else {
            note(&sm, ConnectionEvent::ReconnectAttemptStarted).await;
        }

        if !project.socket_path.exists() {
            let err = BridgeError::SocketMissing {
                project_id: project.id.clone(),
                path: project.socket_path.display().to_string(),
            };
            if let Some(tx) = first_attempt_tx.take() {
                let _ = tx.send(Err(err));
                return;
            }
            if !schedule_backoff(&options, &mut attempts, &project.id).await {
                return;
            }
            continue;
        }

        let handshake = tokio::time::timeout(HANDSHAKE_DEADLINE, handshake_once(&project, &options)).await;

        let (mut read_half, mut write_half, mut parser) = match handshake {
            Ok(Ok(opened)) => {
                note(&sm, ConnectionEvent::TransportOpen).await;
                note(&sm, ConnectionEvent::WelcomeReceived).await;
                opened
            }
            Ok(Err(io_err)) => {
                note(&sm, ConnectionEvent::TransportOpen).await;
                note(&sm, ConnectionEvent::TransportClosed).await;
                let err = BridgeError::TransportError {
                    project_id: project.id.clone(),
                    source: io_err,
                };
                if let Some(tx) = first_attempt_tx.take() {
                    let _ = tx.send(Err(err));
                    return;
                }
                if !schedule_backoff(&options, &mut attempts, &project.id).await {
                    return;
                }
                continue;
            }
            Err(_elapsed) => {
                note(&sm, ConnectionEvent::TransportOpen).await;
                note(&sm, ConnectionEvent::HandshakeTimedOut).await;
                let err = BridgeError::ConnectionTimeout {
                    project_id: project.id.clone(),
                    secs: HANDSHAKE_DEADLINE.as_secs(),
                };
                if let Some(tx) = first_attempt_tx.take() {
                    let _ = tx.send(Err(err));
                    return;
                }
                if !schedule_backoff(&options, &mut attempts, &project.id).await {
                    return;
                }
                continue;
            }
        };

        ready.store(true, Ordering::SeqCst);
        attempts = 0;
        let _ = events_tx.send(BridgeEvent::StateChanged {
            project_id: project.id.clone(),
            connected: true,
        });
        if let Some(tx) = first_attempt_tx.take() {
            let _ = tx.send(Ok(()));
        }

        serve(
            &project,
            &mut read_half,
            &mut write_half,
            &mut parser,
            &mut outbound_rx,
            &events_tx,
        )
        .await;

        ready.store(false, Ordering::SeqCst);
        note(&sm, ConnectionEvent::TransportClosed).await;
        let _ = events_tx.send(BridgeEvent::StateChanged {
            project_id: project.id.clone(),
            connected: false,
        });

        if shutdown.load(Ordering::SeqCst) || !options.reconnect {
            return;
        }
        note(&sm, ConnectionEvent::ReconnectScheduled).await;
        if !schedule_backoff(&options, &mut attempts, &project.id).await {
            return;
        }
    }
}

/// Increments the attempt counter, abandons (returning `false` without
/// sleeping) once it exceeds `max_reconnect_attempts`, otherwise sleeps for
/// an exponential backoff capped at `max_reconnect_delay_ms`:
/// `min(reconnect_delay * 2^(attempts-1), max)`, computed in 64-bit and
/// clamped before any narrowing. Checked on every attempt, not only the
/// first one after a post-Ready close.
async fn schedule_backoff(options: &BridgeOptions, attempts: &mut u32, project_id: &str) -> bool {
    *attempts += 1;
    if let Some(max) = options.max_reconnect_attempts {
        if *attempts > max {
            tracing::warn!(project = %project_id, "reconnect attempts exhausted");
            return false;
        }
    }
    let exp = attempts.saturating_sub(1).min(63);
    let delay = options
        .reconnect_delay_ms
        .saturating_mul(1u64 << exp)
        .min(options.max_reconnect_delay_ms);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    true
}

async fn handshake_once(
    project: &ProjectConfig,
    options: &BridgeOptions,
) -> io::Result<(OwnedReadHalf, OwnedWriteHalf, FrameParser)> {
    let stream = UnixStream::connect(&project.socket_path).await?;
    let (mut read_half, mut write_half) = stream.into_split();

    let hello = Envelope::new(
        now_millis(),
        EnvelopeBody::Hello(HelloPayload {
            agent: options.agent_name.clone(),
            cli: "bridge".into(),
            capabilities: Capabilities::default(),
        }),
    )
    .from(options.agent_name.clone());
    let bytes = encode(&hello).map_err(to_io_err)?;
    write_half.write_all(&bytes).await?;

    let mut parser = FrameParser::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "transport closed during handshake",
            ));
        }
        for envelope in parser.push_bytes(&buf[..n]) {
            if matches!(envelope.body, EnvelopeBody::Welcome(_)) {
                return Ok((read_half, write_half, parser));
            }
            tracing::debug!(
                project = %project.id,
                kind = envelope.body.type_name(),
                "ignoring frame received before WELCOME"
            );
        }
    }
}

async fn serve(
    project: &ProjectConfig,
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
    parser: &mut FrameParser,
    outbound_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    events_tx: &mpsc::UnboundedSender<BridgeEvent>,
) {
    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            read_result = read_half.read(&mut buf) => {
                match read_result {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        for envelope in parser.push_bytes(&buf[..n]) {
                            if let Err(e) = handle_inbound(project, envelope, write_half, events_tx).await {
                                tracing::warn!(project = %project.id, error = %e, "failed to handle inbound envelope");
                            }
                        }
                    }
                }
            }
            maybe_bytes = outbound_rx.recv() => {
                match maybe_bytes {
                    Some(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

async fn handle_inbound(
    project: &ProjectConfig,
    envelope: Envelope,
    write_half: &mut OwnedWriteHalf,
    events_tx: &mpsc::UnboundedSender<BridgeEvent>,
) -> io::Result<()> {
    match envelope.body {
        EnvelopeBody::Deliver(deliver) => {
            let ack = Envelope::new(
                now_millis(),
                EnvelopeBody::Ack(AckPayload {
                    ack_id: deliver.id.clone(),
                    seq: deliver.delivery.seq,
                }),
            );
            let bytes = encode(&ack).map_err(to_io_err)?;
            write_half.write_all(&bytes).await?;
            let _ = events_tx.send(BridgeEvent::Delivered {
                project_id: project.id.clone(),
                from: envelope.from.clone(),
                body: deliver.payload.body,
                envelope_id: deliver.id,
            });
        }
        EnvelopeBody::Ping(ping) => {
            let pong = Envelope::new(now_millis(), EnvelopeBody::Pong(PongPayload { nonce: ping.nonce }));
            let bytes = encode(&pong).map_err(to_io_err)?;
            write_half.write_all(&bytes).await?;
        }
        // WELCOME is idempotent after Ready; unknown types are ignored.
        _ => {}
    }
    Ok(())
}
