//! # Trivia Duel Server
//!
//! Lobby and session coordination for two-player trivia duels over
//! WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TRIVIA DUEL SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Identifiers and time                     │
//! │  ├── code.rs      - Six-character game codes                 │
//! │  ├── connection.rs- Connection identifiers                   │
//! │  └── clock.rs     - Injectable wall clock                    │
//! │                                                              │
//! │  game/            - Session domain (no I/O)                  │
//! │  ├── player.rs    - Display names and initials               │
//! │  └── session.rs   - Session record and transitions           │
//! │                                                              │
//! │  network/         - Shared state and transport               │
//! │  ├── store.rs     - Concurrent session store                 │
//! │  ├── hub.rs       - RPC surface and group fan-out            │
//! │  ├── reaper.rs    - Stale session sweep                      │
//! │  ├── protocol.rs  - Message types                            │
//! │  └── server.rs    - WebSocket server                         │
//! │                                                              │
//! │  services/        - External collaborators                   │
//! │  ├── questions.rs - Question source                          │
//! │  └── leaderboard.rs - Score storage                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every session mutation happens under that session's own lock, and
//! removal tombstones the session before it leaves the map. Two clients
//! racing for the second slot, or a join racing the host's disconnect,
//! always resolve to exactly one outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod services;

// Re-export commonly used types
pub use core::{ConnectionId, GameCode};
pub use game::{GameSession, JoinError, PlayerInfo, PlayerNumber, SessionError};
pub use network::{ConnectionHub, GameServer, ServerConfig, SessionStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
