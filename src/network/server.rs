//! WebSocket Duel Server
//!
//! Async WebSocket server for duel connections. Accepts connections,
//! resolves identities, and routes session events through the registries,
//! broadcasting the updated session view after every successful mutation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::game::choice::Choice;
use crate::network::broadcast::Broadcaster;
use crate::network::identity::{Identity, IdentityRegistry};
use crate::network::protocol::{ClientMessage, ServerMessage, SessionView};
use crate::network::session::{
    GameSession, JoinOutcome, SessionCode, SessionError, SessionRegistry,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long an abandoned session may idle before it is purged.
    pub idle_session_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            idle_session_timeout: Duration::from_secs(600),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything absent or unparseable.
    ///
    /// Recognized: `PORT`, `ROSHAMBO_MAX_CONNECTIONS`,
    /// `ROSHAMBO_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_parse::<u16>("PORT") {
            config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }
        if let Some(max) = env_parse::<usize>("ROSHAMBO_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse::<u64>("ROSHAMBO_IDLE_TIMEOUT_SECS") {
            config.idle_session_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Duel server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Per-connection context, threaded through every handler.
///
/// Replaces ambient closure state: which identity and session this
/// connection acts as is updated only through registry calls.
#[derive(Default)]
struct ConnContext {
    /// Identity resolved for this connection, if any.
    identity: Option<Identity>,
    /// Session this connection last created or joined.
    session: Option<SessionCode>,
}

/// The duel server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Durable identities and their connection bindings.
    identities: Arc<IdentityRegistry>,
    /// Live sessions by code.
    sessions: Arc<SessionRegistry>,
    /// Full-view fan-out after mutations.
    broadcaster: Arc<Broadcaster>,
    /// Live connection count, for the admission limit.
    active_connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new duel server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let identities = Arc::new(IdentityRegistry::new());

        Self {
            config,
            broadcaster: Arc::new(Broadcaster::new(identities.clone())),
            identities,
            sessions: Arc::new(SessionRegistry::new()),
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Run the server until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Duel server listening on {}", self.config.bind_addr);

        // Spawn session GC task
        let cleanup_sessions = self.sessions.clone();
        let cleanup_identities = self.identities.clone();
        let idle_timeout = self.config.idle_session_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_sessions, cleanup_identities, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.active_connections.load(Ordering::Relaxed)
                                >= self.config.max_connections
                            {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let identities = self.identities.clone();
        let sessions = self.sessions.clone();
        let broadcaster = self.broadcaster.clone();
        let active = self.active_connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        active.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    active.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut ctx = ConnContext::default();

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::OperationFailed {
                                            message: "Invalid message format".to_string(),
                                        }).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    &mut ctx,
                                    client_msg,
                                    &identities,
                                    &sessions,
                                    &broadcaster,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            // Release the identity binding unless a reconnect already
            // replaced it with a newer connection.
            if let Some(identity) = &ctx.identity {
                identities.unbind(&identity.id, &msg_tx).await;
            }

            active.fetch_sub(1, Ordering::Relaxed);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Dispatch a client message to its handler.
    async fn handle_client_message(
        ctx: &mut ConnContext,
        msg: ClientMessage,
        identities: &Arc<IdentityRegistry>,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Identify { id, name } => {
                Self::handle_identify(ctx, id, name, identities, sender).await;
            }
            ClientMessage::CreateSession => {
                Self::handle_create(ctx, sessions, sender).await;
            }
            ClientMessage::JoinSession { code } => {
                Self::handle_join(ctx, code, sessions, broadcaster, sender).await;
            }
            ClientMessage::SubmitChoice { choice } => {
                Self::handle_submit(ctx, choice, sessions, broadcaster, sender).await;
            }
            ClientMessage::Continue => {
                Self::handle_continue(ctx, sessions, broadcaster, sender).await;
            }
            ClientMessage::Reset => {
                Self::handle_reset(ctx, sessions, broadcaster, sender).await;
            }
            ClientMessage::SetName { name } => {
                Self::handle_set_name(ctx, name, identities, sessions, broadcaster, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong { timestamp }).await;
            }
        }
    }

    /// Handle identification.
    async fn handle_identify(
        ctx: &mut ConnContext,
        id: Option<String>,
        name: Option<String>,
        identities: &Arc<IdentityRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        // Re-identifying without a token keeps this connection's identity.
        let supplied = id.or_else(|| ctx.identity.as_ref().map(|i| i.id.to_uuid_string()));

        let identity = identities
            .resolve(supplied.as_deref(), name.as_deref(), sender.clone())
            .await;

        debug!(
            "Connection identified as {} ({})",
            identity.name,
            identity.id.short_hex()
        );

        let _ = sender
            .send(ServerMessage::Identified {
                id: identity.id.to_uuid_string(),
                name: identity.name.clone(),
            })
            .await;

        ctx.identity = Some(identity);
    }

    /// Handle session creation.
    async fn handle_create(
        ctx: &mut ConnContext,
        sessions: &Arc<SessionRegistry>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let identity = match &ctx.identity {
            Some(identity) => identity.clone(),
            None => {
                let _ = sender.send(ServerMessage::IdentityMissing).await;
                return;
            }
        };

        let code = sessions.create(identity.id, &identity.name).await;
        info!("Session {} created by {}", code, identity.id.short_hex());

        ctx.session = Some(code.clone());
        let _ = sender.send(ServerMessage::SessionCreated { code }).await;
    }

    /// Handle a join (or rejoin) by code.
    async fn handle_join(
        ctx: &mut ConnContext,
        code: String,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let identity = match &ctx.identity {
            Some(identity) => identity.clone(),
            None => {
                let _ = sender.send(ServerMessage::IdentityMissing).await;
                return;
            }
        };

        match sessions.join(&code, identity.id, &identity.name).await {
            Ok((session, outcome)) => {
                let s = session.read().await;
                ctx.session = Some(s.code.clone());

                let view = SessionView::of(&s.code, &s.state);
                let _ = sender
                    .send(ServerMessage::SessionJoined { session: view })
                    .await;

                match outcome {
                    JoinOutcome::Joined => {
                        info!("{} joined session {}", identity.id.short_hex(), s.code);
                        broadcaster.session_update(&s).await;
                    }
                    JoinOutcome::Rejoined => {
                        debug!("{} rejoined session {}", identity.id.short_hex(), s.code);
                    }
                }
            }
            Err(SessionError::NotFound) => {
                let _ = sender.send(ServerMessage::SessionNotFound).await;
            }
            Err(SessionError::Full) => {
                debug!("Join rejected, session {} is full", code);
                let _ = sender.send(ServerMessage::SessionFull).await;
            }
        }
    }

    /// Handle a choice submission.
    async fn handle_submit(
        ctx: &mut ConnContext,
        choice: Choice,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let identity = match &ctx.identity {
            Some(identity) => identity.clone(),
            None => {
                let _ = sender.send(ServerMessage::IdentityMissing).await;
                return;
            }
        };
        let session = match Self::current_session(ctx, sessions).await {
            Some(session) => session,
            None => {
                let _ = sender.send(ServerMessage::SessionNotFound).await;
                return;
            }
        };

        let mut s = session.write().await;
        match s.state.submit_choice(&identity.id, choice) {
            Ok(resolved) => {
                s.touch();
                if resolved {
                    debug!("Session {} round resolved", s.code);
                }
                broadcaster.session_update(&s).await;
            }
            Err(e) => {
                let _ = sender
                    .send(ServerMessage::OperationFailed {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Handle a continue: next round, scores retained.
    async fn handle_continue(
        ctx: &mut ConnContext,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if ctx.identity.is_none() {
            let _ = sender.send(ServerMessage::IdentityMissing).await;
            return;
        }
        let session = match Self::current_session(ctx, sessions).await {
            Some(session) => session,
            None => {
                let _ = sender.send(ServerMessage::SessionNotFound).await;
                return;
            }
        };

        let mut s = session.write().await;
        s.state.continue_round();
        s.touch();
        broadcaster.session_update(&s).await;
    }

    /// Handle a reset: wipe choices, result, and scores.
    async fn handle_reset(
        ctx: &mut ConnContext,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if ctx.identity.is_none() {
            let _ = sender.send(ServerMessage::IdentityMissing).await;
            return;
        }
        let session = match Self::current_session(ctx, sessions).await {
            Some(session) => session,
            None => {
                let _ = sender.send(ServerMessage::SessionNotFound).await;
                return;
            }
        };

        let mut s = session.write().await;
        s.state.reset();
        s.touch();
        broadcaster.session_update(&s).await;
    }

    /// Handle a rename of the identity and its seat.
    async fn handle_set_name(
        ctx: &mut ConnContext,
        name: String,
        identities: &Arc<IdentityRegistry>,
        sessions: &Arc<SessionRegistry>,
        broadcaster: &Broadcaster,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let identity = match &ctx.identity {
            Some(identity) => identity.clone(),
            None => {
                let _ = sender.send(ServerMessage::IdentityMissing).await;
                return;
            }
        };

        let renamed = match identities.rename(&identity.id, &name).await {
            Some(renamed) => renamed,
            None => {
                let _ = sender
                    .send(ServerMessage::OperationFailed {
                        message: "Invalid name".to_string(),
                    })
                    .await;
                return;
            }
        };

        let _ = sender
            .send(ServerMessage::Identified {
                id: renamed.id.to_uuid_string(),
                name: renamed.name.clone(),
            })
            .await;

        if let Some(session) = Self::current_session(ctx, sessions).await {
            let mut s = session.write().await;
            if s.state.rename_player(&renamed.id, &renamed.name) {
                s.touch();
                broadcaster.session_update(&s).await;
            }
        }

        ctx.identity = Some(renamed);
    }

    /// Resolve the session this connection acts in, if it still exists.
    async fn current_session(
        ctx: &ConnContext,
        sessions: &Arc<SessionRegistry>,
    ) -> Option<Arc<tokio::sync::RwLock<GameSession>>> {
        let code = ctx.session.as_deref()?;
        sessions.get(code).await
    }

    /// Run the session GC loop.
    async fn run_cleanup_loop(
        sessions: Arc<SessionRegistry>,
        identities: Arc<IdentityRegistry>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let purged = sessions.cleanup(&identities, idle_timeout).await;
            for code in purged {
                info!("Purged abandoned session {}", code);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.count().await
    }
}
