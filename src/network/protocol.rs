//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object tagged by `"type"`; payload fields are
//! camelCase.

use serde::{Serialize, Deserialize};

use crate::game::session::{GameSession, JoinError};
use crate::services::leaderboard::LeaderboardEntry;
use crate::services::questions::Question;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open a new lobby hosted by this connection.
    CreateGame {
        /// Host display name.
        player_name: String,
    },

    /// Take the second slot of an existing lobby.
    JoinGame(JoinGameRequest),

    /// Host-only: begin the match.
    StartGame {
        /// Game code.
        game_id: String,
    },

    /// Push a player's score.
    UpdateScore(UpdateScoreRequest),

    /// Either participant: mark the match completed.
    EndGame {
        /// Game code.
        game_id: String,
    },

    /// Fetch the current state of a game.
    GetGame {
        /// Game code.
        game_id: String,
    },

    /// Ask the question source for a round of questions.
    GenerateQuestions {
        /// Quiz topic.
        topic: String,
        /// Number of questions wanted.
        count: usize,
    },

    /// Record a finished player's score on the leaderboard.
    SubmitScore {
        /// Entry to record.
        entry: LeaderboardEntry,
    },

    /// Read the best scores of a category.
    TopScores {
        /// Leaderboard category.
        category: String,
        /// Maximum entries returned.
        count: usize,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    /// Code of the lobby to join.
    pub game_id: String,
    /// Joining player's display name.
    pub player_name: String,
}

/// Score update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScoreRequest {
    /// Game code.
    pub game_id: String,
    /// 1 for the host, 2 for the joined player.
    pub player_number: u8,
    /// New absolute score.
    pub score: i32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
///
/// `GameUpdated`, `PlayerJoined`, `GameStarted`, `ScoreUpdated` and
/// `GameEnded` are pushed to every connection in a game's group; the rest
/// are direct replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Lobby created.
    GameCreated {
        /// Code to share with the opponent.
        game_id: String,
    },

    /// Outcome of a join request.
    JoinResult(JoinGameResult),

    /// Reply to `GetGame`.
    GameState {
        /// Current state.
        state: GameStateDto,
    },

    /// Full state after a player joined.
    GameUpdated {
        /// Current state.
        state: GameStateDto,
    },

    /// Name of the player who just joined.
    PlayerJoined {
        /// Display name.
        name: String,
    },

    /// The host started the match.
    GameStarted {
        /// Current state.
        state: GameStateDto,
    },

    /// A score changed.
    ScoreUpdated {
        /// Current state.
        state: GameStateDto,
    },

    /// The match was ended.
    GameEnded {
        /// Final state.
        state: GameStateDto,
    },

    /// Questions for a round.
    Questions {
        /// Topic requested.
        topic: String,
        /// Generated questions.
        questions: Vec<Question>,
    },

    /// Leaderboard entry stored.
    ScoreRecorded,

    /// Best scores of a category.
    Leaderboard {
        /// Category requested.
        category: String,
        /// Entries, best first.
        entries: Vec<LeaderboardEntry>,
    },

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server time in Unix milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Join outcome as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameResult {
    /// Whether the caller now holds the second slot.
    pub success: bool,
    /// `None` on success.
    pub fail_reason: FailReason,
}

impl JoinGameResult {
    /// Successful join.
    pub fn joined() -> Self {
        Self { success: true, fail_reason: FailReason::None }
    }

    /// Rejected join.
    pub fn rejected(reason: JoinError) -> Self {
        Self { success: false, fail_reason: reason.into() }
    }
}

/// Why a join did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Join succeeded.
    None,
    /// Unknown game code.
    NotFound,
    /// Second slot taken.
    AlreadyFull,
    /// Game already started.
    AlreadyStarted,
}

impl From<JoinError> for FailReason {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::NotFound => FailReason::NotFound,
            JoinError::AlreadyFull => FailReason::AlreadyFull,
            JoinError::AlreadyStarted => FailReason::AlreadyStarted,
        }
    }
}

/// Snapshot of a session sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    /// Game code.
    pub game_id: String,
    /// Host display name.
    pub player1_name: String,
    /// Joined player's display name, null while waiting.
    pub player2_name: Option<String>,
    /// Host score.
    pub player1_score: i32,
    /// Joined player's score.
    pub player2_score: i32,
    /// Start time is set.
    pub is_game_started: bool,
    /// End time is set.
    pub is_game_over: bool,
}

impl From<&GameSession> for GameStateDto {
    fn from(session: &GameSession) -> Self {
        use crate::game::session::PlayerNumber;

        Self {
            game_id: session.id().to_string(),
            player1_name: session.player1().name.clone(),
            player2_name: session.player2().map(|p| p.name.clone()),
            player1_score: session.score(PlayerNumber::One),
            player2_score: session.score(PlayerNumber::Two),
            is_game_started: session.is_started(),
            is_game_over: session.is_over(),
        }
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidInput,
    /// Display name empty after trimming.
    InvalidPlayerName,
    /// Player number outside 1..=2.
    InvalidPlayerNumber,
    /// Unknown game code.
    GameNotFound,
    /// Caller lacks the capability (e.g. non-host start).
    Unauthorized,
    /// Game already started.
    AlreadyStarted,
    /// Game not started yet.
    NotStarted,
    /// Game already ended.
    AlreadyEnded,
    /// Question source has no such topic.
    UnknownTopic,
    /// Requested count out of range.
    InvalidCount,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::core::{ConnectionId, GameCode};
    use crate::game::player::PlayerInfo;
    use crate::game::session::PlayerNumber;

    #[test]
    fn test_join_request_wire_shape() {
        let msg = ClientMessage::from_json(
            r#"{"type":"join_game","gameId":"ABC123","playerName":"Bob"}"#,
        ).unwrap();

        if let ClientMessage::JoinGame(req) = msg {
            assert_eq!(req.game_id, "ABC123");
            assert_eq!(req.player_name, "Bob");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_inline_fields_are_camel_case() {
        let msg = ClientMessage::from_json(
            r#"{"type":"create_game","playerName":"Alice"}"#,
        ).unwrap();
        assert!(matches!(msg, ClientMessage::CreateGame { ref player_name } if player_name == "Alice"));

        let msg = ClientMessage::from_json(
            r#"{"type":"update_score","gameId":"ABC123","playerNumber":2,"score":7}"#,
        ).unwrap();
        if let ClientMessage::UpdateScore(req) = msg {
            assert_eq!(req.player_number, 2);
            assert_eq!(req.score, 7);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"steal_host","gameId":"ABC123"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_state_dto_from_session() {
        let host = ConnectionId::new();
        let mut session = GameSession::new(
            GameCode::parse("ABC123").unwrap(),
            PlayerInfo::from_name("Alice").unwrap(),
            host,
            Utc::now(),
        );

        let dto = GameStateDto::from(&session);
        assert_eq!(dto.game_id, "ABC123");
        assert_eq!(dto.player2_name, None);
        assert!(!dto.is_game_started);

        session.join(PlayerInfo::from_name("Bob").unwrap(), ConnectionId::new()).unwrap();
        session.start(&host, Utc::now()).unwrap();
        session.set_score(PlayerNumber::Two, 300).unwrap();

        let dto = GameStateDto::from(&session);
        assert_eq!(dto.player2_name.as_deref(), Some("Bob"));
        assert_eq!(dto.player2_score, 300);
        assert!(dto.is_game_started);
        assert!(!dto.is_game_over);
    }

    #[test]
    fn test_state_push_json() {
        let msg = ServerMessage::ScoreUpdated {
            state: GameStateDto {
                game_id: "ABC123".into(),
                player1_name: "Alice".into(),
                player2_name: None,
                player1_score: 1,
                player2_score: 0,
                is_game_started: true,
                is_game_over: false,
            },
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"score_updated""#));
        assert!(json.contains(r#""player2Name":null"#));
        assert!(json.contains(r#""isGameStarted":true"#));
    }

    #[test]
    fn test_join_result_json() {
        let json = ServerMessage::JoinResult(JoinGameResult::rejected(JoinError::AlreadyFull))
            .to_json()
            .unwrap();
        assert!(json.contains(r#""success":false"#));
        assert!(json.contains(r#""failReason":"already_full""#));

        let json = ServerMessage::JoinResult(JoinGameResult::joined()).to_json().unwrap();
        assert!(json.contains(r#""failReason":"none""#));
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::Error(ServerError::new(ErrorCode::Unauthorized, "Only the host can start"));
        let json = msg.to_json().unwrap();
        assert!(json.contains("unauthorized"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, ServerMessage::Error(ServerError { code: ErrorCode::Unauthorized, .. })));
    }
}
