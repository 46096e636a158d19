//! Network Layer
//!
//! Everything that is shared between connections: the session store, the
//! hub that fans state out to game groups, the reaper, and the WebSocket
//! server in front of them.

pub mod hub;
pub mod protocol;
pub mod reaper;
pub mod server;
pub mod store;

pub use hub::{ConnectionHub, HubError};
pub use protocol::{
    ClientMessage, ServerMessage, GameStateDto, JoinGameRequest, JoinGameResult,
    FailReason, UpdateScoreRequest, ErrorCode,
};
pub use reaper::{ReaperConfig, SessionReaper};
pub use server::{GameServer, GameServerError, MessageRouter, ServerConfig};
pub use store::{Departure, RemovalReason, SessionRemoved, SessionStore};
