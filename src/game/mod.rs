//! Game Domain Module
//!
//! Session entity and player identity. No I/O and no locking here; the
//! network layer owns concurrency.
//!
//! ## Module Structure
//!
//! - `player`: Display names and initials
//! - `session`: The two-player session record and its transitions

pub mod player;
pub mod session;

// Re-export key types
pub use player::{PlayerInfo, MAX_NAME_LEN};
pub use session::{GameSession, JoinError, PlayerNumber, SessionError, SessionPhase};
