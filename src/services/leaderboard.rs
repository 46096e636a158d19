//! Leaderboard Store
//!
//! Key-sorted score storage per category. Persistence is somebody else's
//! problem; the in-memory store keeps what a single process has seen.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Serialize, Deserialize};

/// Largest page returned by `top_scores`.
pub const MAX_LEADERBOARD_PAGE: usize = 100;

/// One recorded result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Display name at the time of the game.
    pub player_name: String,
    /// Category, usually the quiz topic.
    pub category: String,
    /// Final score.
    pub score: i32,
}

/// Score storage.
pub trait Leaderboard: Send + Sync {
    /// Record a result.
    fn add_score(&self, entry: LeaderboardEntry);

    /// Best `count` results of `category`, highest first. Ties keep
    /// submission order.
    fn top_scores(&self, category: &str, count: usize) -> Vec<LeaderboardEntry>;
}

/// Ordering key: score descending, then submission order.
type RankKey = (Reverse<i32>, u64);

/// Process-local leaderboard. Each category keeps only the entries a full
/// page can show.
#[derive(Debug, Default)]
pub struct InMemoryLeaderboard {
    categories: DashMap<String, BTreeMap<RankKey, LeaderboardEntry>>,
    sequence: AtomicU64,
}

impl InMemoryLeaderboard {
    /// Empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }

    fn category_key(category: &str) -> String {
        category.trim().to_lowercase()
    }
}

impl Leaderboard for InMemoryLeaderboard {
    fn add_score(&self, entry: LeaderboardEntry) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut board = self.categories.entry(Self::category_key(&entry.category)).or_default();
        board.insert((Reverse(entry.score), seq), entry);

        while board.len() > MAX_LEADERBOARD_PAGE {
            board.pop_last();
        }
    }

    fn top_scores(&self, category: &str, count: usize) -> Vec<LeaderboardEntry> {
        let count = count.min(MAX_LEADERBOARD_PAGE);
        self.categories
            .get(&Self::category_key(category))
            .map(|board| board.values().take(count).cloned().collect())
            .unwrap_or_default()
    }
}
