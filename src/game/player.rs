//! Player Identity
//!
//! A player is only a display name bound to a connection. There is no
//! account behind it.

use serde::{Serialize, Deserialize};

/// Longest display name kept, in characters.
pub const MAX_NAME_LEN: usize = 20;

/// Display name plus the initials shown on compact score boards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Normalized display name.
    pub name: String,
    /// One or two upper-case letters derived from the name.
    pub initials: String,
}

impl PlayerInfo {
    /// Build from a raw, client-supplied name.
    ///
    /// The name is trimmed and cut to [`MAX_NAME_LEN`] characters.
    /// Returns `None` if nothing is left.
    pub fn from_name(raw: &str) -> Option<Self> {
        let name: String = raw.trim().chars().take(MAX_NAME_LEN).collect();
        let name = name.trim_end().to_string();
        if name.is_empty() {
            return None;
        }

        let initials = initials_of(&name);
        Some(Self { name, initials })
    }
}

/// First letter of the first two words, or the first two characters of a
/// single-word name.
fn initials_of(name: &str) -> String {
    let mut words = name.split_whitespace();
    let initials: String = match (words.next(), words.next()) {
        (Some(first), Some(second)) => first.chars().take(1).chain(second.chars().take(1)).collect(),
        (Some(only), None) => only.chars().take(2).collect(),
        _ => String::new(),
    };
    initials.to_uppercase()
}
