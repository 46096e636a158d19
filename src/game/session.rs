//! Game Session State
//!
//! Authoritative in-memory record of one two-player match.
//!
//! A session is mutated only through its owner's per-session lock (see
//! `network::store`), so every method here assumes exclusive access and
//! validates the whole transition before changing anything.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::{ConnectionId, GameCode};
use crate::game::player::PlayerInfo;

/// Session life-cycle phase, derived from the session's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Host is waiting, second slot empty.
    Created,
    /// Second player joined, not started.
    Open,
    /// Start time set.
    InProgress,
    /// End time set.
    Completed,
}

/// Which of the two score slots an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerNumber {
    /// The host.
    One,
    /// The joining player.
    Two,
}

impl TryFrom<u8> for PlayerNumber {
    type Error = SessionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayerNumber::One),
            2 => Ok(PlayerNumber::Two),
            other => Err(SessionError::InvalidPlayerNumber(other)),
        }
    }
}

/// Routine reasons a join attempt does not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// No live session has this code.
    #[error("Game not found")]
    NotFound,

    /// The second slot is taken.
    #[error("Game is full")]
    AlreadyFull,

    /// The host already started the game.
    #[error("Game already started")]
    AlreadyStarted,
}

/// Session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live session has this code.
    #[error("Game not found")]
    NotFound,

    /// Caller lacks the capability for this operation.
    #[error("Not authorized for this game")]
    Unauthorized,

    /// Start time is already set.
    #[error("Game already started")]
    AlreadyStarted,

    /// Operation needs a started game.
    #[error("Game not started")]
    NotStarted,

    /// End time is already set.
    #[error("Game already ended")]
    AlreadyEnded,

    /// Player number outside 1..=2.
    #[error("Invalid player number {0}")]
    InvalidPlayerNumber(u8),
}

/// One two-player match.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: GameCode,
    player1: PlayerInfo,
    player2: Option<PlayerInfo>,
    /// Cleared once the host leaves a started game.
    host_connection: Option<ConnectionId>,
    guest_connection: Option<ConnectionId>,
    created_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    player1_score: i32,
    player2_score: i32,
    /// Set under the session lock right before the store drops the entry.
    closed: bool,
}

impl GameSession {
    /// Create a lobby owned by `host_connection`.
    pub fn new(
        id: GameCode,
        host: PlayerInfo,
        host_connection: ConnectionId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player1: host,
            player2: None,
            host_connection: Some(host_connection),
            guest_connection: None,
            created_at,
            start_time: None,
            end_time: None,
            player1_score: 0,
            player2_score: 0,
            closed: false,
        }
    }

    /// Game code.
    pub fn id(&self) -> &GameCode {
        &self.id
    }

    /// The host player.
    pub fn player1(&self) -> &PlayerInfo {
        &self.player1
    }

    /// The joining player, if any.
    pub fn player2(&self) -> Option<&PlayerInfo> {
        self.player2.as_ref()
    }

    /// Connection that created the session, while it is still bound.
    pub fn host_connection(&self) -> Option<ConnectionId> {
        self.host_connection
    }

    /// Connection that filled the second slot.
    pub fn guest_connection(&self) -> Option<ConnectionId> {
        self.guest_connection
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the host started the game.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// When the game was ended.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Score for one slot.
    pub fn score(&self, player: PlayerNumber) -> i32 {
        match player {
            PlayerNumber::One => self.player1_score,
            PlayerNumber::Two => self.player2_score,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        if self.end_time.is_some() {
            SessionPhase::Completed
        } else if self.start_time.is_some() {
            SessionPhase::InProgress
        } else if self.player2.is_some() {
            SessionPhase::Open
        } else {
            SessionPhase::Created
        }
    }

    /// Whether the game has been started.
    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }

    /// Whether the game has been ended.
    pub fn is_over(&self) -> bool {
        self.end_time.is_some()
    }

    /// Whether the store has already dropped this session.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True only for the exact connection that created the session.
    pub fn is_host(&self, connection: &ConnectionId) -> bool {
        self.host_connection.as_ref() == Some(connection)
    }

    /// True for the host or the joined player.
    pub fn is_participant(&self, connection: &ConnectionId) -> bool {
        self.is_host(connection) || self.guest_connection.as_ref() == Some(connection)
    }

    /// Connections currently bound to this session.
    pub fn participants(&self) -> impl Iterator<Item = ConnectionId> {
        self.host_connection.into_iter().chain(self.guest_connection)
    }

    /// Unbind `connection` from its slot. The player's name and score stay,
    /// but the connection loses every capability in this session.
    pub fn release(&mut self, connection: &ConnectionId) -> bool {
        if self.host_connection.as_ref() == Some(connection) {
            self.host_connection = None;
            true
        } else if self.guest_connection.as_ref() == Some(connection) {
            self.guest_connection = None;
            true
        } else {
            false
        }
    }

    /// Fill the second slot.
    pub fn join(&mut self, player: PlayerInfo, connection: ConnectionId) -> Result<(), JoinError> {
        if self.closed {
            return Err(JoinError::NotFound);
        }

        if self.player2.is_some() || self.is_host(&connection) {
            return Err(JoinError::AlreadyFull);
        }

        if self.is_started() {
            return Err(JoinError::AlreadyStarted);
        }

        self.player2 = Some(player);
        self.guest_connection = Some(connection);
        Ok(())
    }

    /// Start the game on behalf of `connection`.
    pub fn start(&mut self, connection: &ConnectionId, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::NotFound);
        }

        if !self.is_host(connection) {
            return Err(SessionError::Unauthorized);
        }

        if self.is_started() {
            return Err(SessionError::AlreadyStarted);
        }

        self.start_time = Some(now);
        Ok(())
    }

    /// End a started game on behalf of either participant.
    pub fn end(&mut self, connection: &ConnectionId, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::NotFound);
        }

        if !self.is_participant(connection) {
            return Err(SessionError::Unauthorized);
        }

        if !self.is_started() {
            return Err(SessionError::NotStarted);
        }

        if self.is_over() {
            return Err(SessionError::AlreadyEnded);
        }

        self.end_time = Some(now);
        Ok(())
    }

    /// Overwrite one slot's score. Accepted in every phase.
    pub fn set_score(&mut self, player: PlayerNumber, score: i32) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::NotFound);
        }

        match player {
            PlayerNumber::One => self.player1_score = score,
            PlayerNumber::Two => self.player2_score = score,
        }
        Ok(())
    }

    /// Timestamp the reaper ages the session by: end, else start, else
    /// creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.end_time
            .or(self.start_time)
            .unwrap_or(self.created_at)
    }

    /// Strictly older than `cutoff`.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity() < cutoff
    }

    /// Mark the session as removed. Later mutations report `NotFound`.
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }
}
