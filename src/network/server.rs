//! WebSocket Game Server
//!
//! Async WebSocket server for trivia duel clients.
//! Decodes client frames and routes them to the connection hub and the
//! question and leaderboard services.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::ConnectionId;
use crate::network::hub::ConnectionHub;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::reaper::{ReaperConfig, SessionReaper};
use crate::network::store::SessionStore;
use crate::services::leaderboard::{InMemoryLeaderboard, Leaderboard};
use crate::services::questions::{QuestionBank, QuestionError, QuestionSource};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    pub outbound_buffer: usize,
    /// Session reaper settings.
    pub reaper: ReaperConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            outbound_buffer: 64,
            reaper: ReaperConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("GAME_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("GAME_MAX_CONNECTIONS", defaults.max_connections),
            outbound_buffer: env_or("GAME_OUTBOUND_BUFFER", defaults.outbound_buffer).max(1),
            reaper: ReaperConfig::from_env(),
            version: defaults.version,
        }
    }
}

/// Parse `key` from the environment, keeping `default` when it is unset or
/// malformed.
pub(crate) fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring {}={:?}: {}", key, raw, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Resolve once shutdown has been signalled, or the signal is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

// =============================================================================
// MESSAGE ROUTING
// =============================================================================

/// Turns decoded client messages into hub and service calls.
#[derive(Clone)]
pub struct MessageRouter {
    hub: Arc<ConnectionHub>,
    questions: Arc<dyn QuestionSource>,
    leaderboard: Arc<dyn Leaderboard>,
}

impl MessageRouter {
    /// Create a router.
    pub fn new(
        hub: Arc<ConnectionHub>,
        questions: Arc<dyn QuestionSource>,
        leaderboard: Arc<dyn Leaderboard>,
    ) -> Self {
        Self { hub, questions, leaderboard }
    }

    /// Handle one message from `connection`. Returns the direct reply, if
    /// any. Group pushes go through the hub.
    pub async fn handle(&self, connection: ConnectionId, msg: ClientMessage) -> Option<ServerMessage> {
        let reply = match msg {
            ClientMessage::CreateGame { player_name } => {
                match self.hub.create_game(connection, &player_name).await {
                    Ok(game_id) => ServerMessage::GameCreated { game_id: game_id.to_string() },
                    Err(e) => ServerMessage::Error(e.to_server_error()),
                }
            }
            ClientMessage::JoinGame(req) => match self.hub.join_game(connection, req).await {
                Ok(result) => ServerMessage::JoinResult(result),
                Err(e) => ServerMessage::Error(e.to_server_error()),
            },
            ClientMessage::StartGame { game_id } => {
                return self.hub.start_game(connection, &game_id).await
                    .err()
                    .map(|e| ServerMessage::Error(e.to_server_error()));
            }
            ClientMessage::UpdateScore(req) => {
                return self.hub.update_score(connection, req).await
                    .err()
                    .map(|e| ServerMessage::Error(e.to_server_error()));
            }
            ClientMessage::EndGame { game_id } => {
                return self.hub.end_game(connection, &game_id).await
                    .err()
                    .map(|e| ServerMessage::Error(e.to_server_error()));
            }
            ClientMessage::GetGame { game_id } => match self.hub.get_game(&game_id).await {
                Ok(state) => ServerMessage::GameState { state },
                Err(e) => ServerMessage::Error(e.to_server_error()),
            },
            ClientMessage::GenerateQuestions { topic, count } => {
                match self.questions.generate_questions(&topic, count).await {
                    Ok(questions) => ServerMessage::Questions { topic, questions },
                    Err(e) => {
                        debug!("Question request from {} failed: {}", connection, e);
                        ServerMessage::Error(question_error(&e))
                    }
                }
            }
            ClientMessage::SubmitScore { entry } => {
                self.leaderboard.add_score(entry);
                ServerMessage::ScoreRecorded
            }
            ClientMessage::TopScores { category, count } => {
                let entries = self.leaderboard.top_scores(&category, count);
                ServerMessage::Leaderboard { category, entries }
            }
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: unix_millis(),
            },
        };
        Some(reply)
    }
}

fn question_error(err: &QuestionError) -> ServerError {
    let code = match err {
        QuestionError::UnknownTopic(_) => ErrorCode::UnknownTopic,
        QuestionError::InvalidCount(_) => ErrorCode::InvalidCount,
        QuestionError::Unavailable(_) => ErrorCode::InternalError,
    };
    ServerError::new(code, err.to_string())
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// SERVER
// =============================================================================

/// Releases a connection slot when the connection task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session store.
    store: Arc<SessionStore>,
    /// Connection hub.
    hub: Arc<ConnectionHub>,
    /// Message routing.
    router: MessageRouter,
    /// Open connections.
    live_connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: watch::Sender<bool>,
}

impl GameServer {
    /// Create a server with the built-in question bank and an in-memory
    /// leaderboard.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(QuestionBank::default()),
            Arc::new(InMemoryLeaderboard::new()),
        )
    }

    /// Create a server over explicit collaborators.
    pub fn with_services(
        config: ServerConfig,
        questions: Arc<dyn QuestionSource>,
        leaderboard: Arc<dyn Leaderboard>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let store = Arc::new(SessionStore::new());
        let hub = Arc::new(ConnectionHub::new(store.clone()));
        let router = MessageRouter::new(hub.clone(), questions, leaderboard);

        Self {
            config,
            store,
            hub,
            router,
            live_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);

        let reaper = SessionReaper::new(self.store.clone(), self.config.reaper.clone());
        let reaper_handle = tokio::spawn(reaper.run(self.shutdown_tx.subscribe()));

        let janitor_handle = tokio::spawn(
            self.hub.clone().run_group_janitor(self.store.subscribe_removals(), self.shutdown_tx.subscribe()),
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.live_connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Both watch the same signal
        let _ = reaper_handle.await;
        let _ = janitor_handle.await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.live_connections.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(self.live_connections.clone());

        let hub = self.hub.clone();
        let router = self.router.clone();
        let buffer = self.config.outbound_buffer;
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = Self::serve_connection(stream, addr, hub, router, buffer, shutdown_rx).await {
                error!("Connection {} failed: {}", addr, e);
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<ConnectionHub>,
        router: MessageRouter,
        buffer: usize,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), GameServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);

        let connection = ConnectionId::new();
        hub.register(connection, msg_tx.clone());
        info!("Client {} connected as {}", addr, connection);

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
                let closing = matches!(msg, ServerMessage::Shutdown { .. });
                if ws_sender.send(Message::Text(text)).await.is_err() || closing {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        // Handle incoming messages
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", connection, e);
                                    let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                        ErrorCode::InvalidInput,
                                        "Invalid message format",
                                    ))).await;
                                    continue;
                                }
                            };

                            // Abandon the call if the writer has gone away
                            let reply = tokio::select! {
                                reply = router.handle(connection, client_msg) => reply,
                                _ = msg_tx.closed() => break,
                            };

                            if let Some(reply) = reply {
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                ErrorCode::InvalidInput,
                                "Binary frames are not supported",
                            ))).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", connection);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for {}: {}", connection, e);
                            break;
                        }
                        // Ping/pong frames are answered by tungstenite
                        _ => {}
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        hub.disconnect(connection).await;
        drop(msg_tx);

        // Let the writer flush what is queued, the shutdown notice included
        if tokio::time::timeout(std::time::Duration::from_secs(1), sender_task).await.is_err() {
            debug!("Writer for {} did not drain in time", connection);
        }

        info!("Client {} cleaned up", connection);
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.live_connections.load(Ordering::SeqCst)
    }

    /// Live sessions.
    pub fn session_count(&self) -> usize {
        self.store.session_count()
    }
}
