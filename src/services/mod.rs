//! External Collaborators
//!
//! Narrow interfaces to the services the session core does not own.
//! Only the transport layer talks to these.

pub mod leaderboard;
pub mod questions;

pub use leaderboard::{InMemoryLeaderboard, Leaderboard, LeaderboardEntry};
pub use questions::{Question, QuestionBank, QuestionError, QuestionSource};
