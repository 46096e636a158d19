//! Core primitives.
//!
//! Identifier types and the clock shared by the session layer.

pub mod clock;
pub mod code;
pub mod connection;

// Re-export core types
pub use clock::{Clock, SystemClock};
pub use code::{CodeSource, GameCode, RandomCodes, GAME_CODE_LEN};
pub use connection::ConnectionId;
