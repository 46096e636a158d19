//! Connection Hub
//!
//! The RPC surface clients call. Each call is translated into a
//! [`SessionStore`] operation and the resulting snapshot is pushed to the
//! game's group: the set of connections subscribed to that game.
//!
//! Fan-out happens after the store call returns, on a detached snapshot,
//! with non-blocking sends. A slow or gone subscriber loses that message and
//! nothing else.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::core::{ConnectionId, GameCode};
use crate::game::player::PlayerInfo;
use crate::game::session::{JoinError, PlayerNumber, SessionError};
use crate::network::protocol::{
    ErrorCode, GameStateDto, JoinGameRequest, JoinGameResult, ServerError, ServerMessage,
    UpdateScoreRequest,
};
use crate::network::server::wait_for_shutdown;
use crate::network::store::{Departure, SessionRemoved, SessionStore};

/// Hub errors surfaced to the calling connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Display name empty after trimming.
    #[error("Player name must not be empty")]
    InvalidPlayerName,

    /// Store rejected the operation.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl HubError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            HubError::InvalidPlayerName => ErrorCode::InvalidPlayerName,
            HubError::Session(err) => match err {
                SessionError::NotFound => ErrorCode::GameNotFound,
                SessionError::Unauthorized => ErrorCode::Unauthorized,
                SessionError::AlreadyStarted => ErrorCode::AlreadyStarted,
                SessionError::NotStarted => ErrorCode::NotStarted,
                SessionError::AlreadyEnded => ErrorCode::AlreadyEnded,
                SessionError::InvalidPlayerNumber(_) => ErrorCode::InvalidPlayerNumber,
            },
        }
    }

    /// Error frame for the caller.
    pub fn to_server_error(&self) -> ServerError {
        ServerError::new(self.code(), self.to_string())
    }
}

/// Routes calls into the store and pushes state to game groups.
pub struct ConnectionHub {
    /// Session store.
    store: Arc<SessionStore>,
    /// Outbound queue of every registered connection.
    connections: DashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    /// Game code to subscribed connections.
    groups: DashMap<GameCode, BTreeSet<ConnectionId>>,
    /// Connection to the group it is subscribed to.
    memberships: DashMap<ConnectionId, GameCode>,
}

impl ConnectionHub {
    /// Create a hub over `store`.
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            connections: DashMap::new(),
            groups: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Attach a connection's outbound queue.
    pub fn register(&self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.connections.insert(connection, sender);
    }

    /// Connection dropped. Never fails and never broadcasts.
    pub async fn disconnect(&self, connection: ConnectionId) -> Departure {
        let departure = self.store.on_disconnected(connection).await;

        if let Departure::Abandoned(game_id) = &departure {
            self.groups.remove_if(game_id, |game_id, _| !self.store.contains(game_id));
        }

        self.leave_group(&connection);
        self.connections.remove(&connection);
        debug!("{} disconnected: {:?}", connection, departure);
        departure
    }

    /// Open a lobby. Only the code comes back; nobody else is listening yet.
    pub async fn create_game(&self, connection: ConnectionId, player_name: &str) -> Result<GameCode, HubError> {
        let player = PlayerInfo::from_name(player_name).ok_or(HubError::InvalidPlayerName)?;
        let session = self.store.create_session(player, connection).await;
        self.enter_group(session.id(), connection);

        Ok(session.id().clone())
    }

    /// Take the second slot. Failures are answered to the caller only.
    pub async fn join_game(
        &self,
        connection: ConnectionId,
        request: JoinGameRequest,
    ) -> Result<JoinGameResult, HubError> {
        let player = PlayerInfo::from_name(&request.player_name).ok_or(HubError::InvalidPlayerName)?;
        let Some(game_id) = GameCode::parse(&request.game_id) else {
            debug!("{} tried to join malformed code {:?}", connection, request.game_id);
            return Ok(JoinGameResult::rejected(JoinError::NotFound));
        };

        let session = match self.store.try_join_session(&game_id, player, connection).await {
            Ok(session) => session,
            Err(reason) => {
                debug!("{} could not join {}: {}", connection, game_id, reason);
                return Ok(JoinGameResult::rejected(reason));
            }
        };

        if !self.enter_group(&game_id, connection) {
            debug!("Game {} was abandoned right after {} joined", game_id, connection);
            return Ok(JoinGameResult::joined());
        }

        let state = GameStateDto::from(&session);
        let name = session.player2().map(|p| p.name.clone()).unwrap_or_default();
        self.broadcast(&game_id, ServerMessage::GameUpdated { state });
        self.broadcast(&game_id, ServerMessage::PlayerJoined { name });

        Ok(JoinGameResult::joined())
    }

    /// Host-only start.
    pub async fn start_game(&self, connection: ConnectionId, game_id: &str) -> Result<GameStateDto, HubError> {
        let game_id = parse_code(game_id)?;

        let session = match self.store.start_game(&game_id, &connection).await {
            Ok(session) => session,
            Err(SessionError::Unauthorized) => {
                warn!("{} tried to start game {} without being host", connection, game_id);
                return Err(SessionError::Unauthorized.into());
            }
            Err(err) => return Err(err.into()),
        };

        let state = GameStateDto::from(&session);
        self.broadcast(&game_id, ServerMessage::GameStarted { state: state.clone() });
        Ok(state)
    }

    /// Push a score for either player.
    pub async fn update_score(
        &self,
        connection: ConnectionId,
        request: UpdateScoreRequest,
    ) -> Result<GameStateDto, HubError> {
        let game_id = parse_code(&request.game_id)?;
        let player = PlayerNumber::try_from(request.player_number)?;

        let session = self.store.update_score(&game_id, player, request.score).await?;
        debug!("{} set {:?} score in {}", connection, player, game_id);

        let state = GameStateDto::from(&session);
        self.broadcast(&game_id, ServerMessage::ScoreUpdated { state: state.clone() });
        Ok(state)
    }

    /// Mark a started game completed.
    pub async fn end_game(&self, connection: ConnectionId, game_id: &str) -> Result<GameStateDto, HubError> {
        let game_id = parse_code(game_id)?;
        let session = self.store.end_game(&game_id, &connection).await?;

        let state = GameStateDto::from(&session);
        self.broadcast(&game_id, ServerMessage::GameEnded { state: state.clone() });
        Ok(state)
    }

    /// Current state of a game.
    pub async fn get_game(&self, game_id: &str) -> Result<GameStateDto, HubError> {
        let game_id = parse_code(game_id)?;
        self.store
            .get_session(&game_id)
            .await
            .map(|session| GameStateDto::from(&session))
            .ok_or(HubError::Session(SessionError::NotFound))
    }

    /// Push `message` to every connection in the game's group. Returns how
    /// many queues accepted it.
    pub fn broadcast(&self, game_id: &GameCode, message: ServerMessage) -> usize {
        let members: Vec<ConnectionId> = match self.groups.get(game_id) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for member in members {
            let Some(sender) = self.connections.get(&member).map(|s| s.value().clone()) else {
                continue;
            };

            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {}, dropping update for game {}", member, game_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("{} already closed, skipping update for game {}", member, game_id);
                }
            }
        }
        delivered
    }

    /// Drop groups of removed sessions until shutdown.
    pub async fn run_group_janitor(
        self: Arc<Self>,
        mut removals: broadcast::Receiver<SessionRemoved>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = removals.recv() => match event {
                    Ok(removed) => {
                        // The code may already belong to a new session
                        self.groups.remove_if(&removed.game_id, |game_id, _| !self.store.contains(game_id));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Group janitor lagged by {} removals, pruning", skipped);
                        self.prune_groups();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        info!("Group janitor stopped");
    }

    /// Drop every group whose session is gone.
    pub fn prune_groups(&self) {
        self.groups.retain(|game_id, _| self.store.contains(game_id));
    }

    /// Members of a game's group.
    pub fn group_size(&self, game_id: &GameCode) -> usize {
        self.groups.get(game_id).map(|g| g.len()).unwrap_or(0)
    }

    /// Groups currently held.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Move `connection` into the group of `game_id`, leaving any other.
    ///
    /// The session may be removed between the store call and this point,
    /// after its group was already dropped. The store's index is checked
    /// after subscribing, and a connection it no longer places in this game
    /// is taken out again. Returns whether the subscription stands.
    fn enter_group(&self, game_id: &GameCode, connection: ConnectionId) -> bool {
        if let Some(previous) = self.memberships.insert(connection, game_id.clone()) {
            if previous != *game_id {
                self.remove_member(&previous, &connection);
            }
        }
        self.groups.entry(game_id.clone()).or_default().insert(connection);

        if self.store.connection_game(&connection).as_ref() != Some(game_id) {
            self.leave_group(&connection);
            return false;
        }
        true
    }

    fn leave_group(&self, connection: &ConnectionId) {
        if let Some((_, game_id)) = self.memberships.remove(connection) {
            self.remove_member(&game_id, connection);
        }
    }

    fn remove_member(&self, game_id: &GameCode, connection: &ConnectionId) {
        self.groups.remove_if_mut(game_id, |_, members| {
            members.remove(connection);
            members.is_empty()
        });
    }
}

/// Malformed codes cannot name a live game.
fn parse_code(raw: &str) -> Result<GameCode, HubError> {
    GameCode::parse(raw).ok_or(HubError::Session(SessionError::NotFound))
}
