//! Game Codes
//!
//! Short, human-shareable identifiers for lobbies. Codes are typed in by the
//! second player, so the generator avoids characters that read alike.

use std::fmt;
use rand::Rng;
use serde::{Serialize, Deserialize};

/// Length of a game code.
pub const GAME_CODE_LEN: usize = 6;

/// Characters used by generated codes (no `0/O` or `1/I`).
pub const GAME_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A six-character game code, always upper-case ASCII alphanumerics.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(String);

impl GameCode {
    /// Normalize a client-supplied code.
    ///
    /// Surrounding whitespace is ignored and letters are upper-cased.
    /// Returns `None` when the result is not a well-formed code.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == GAME_CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate game codes.
///
/// Candidates need not be unique; the session store retries until an
/// insert-if-absent succeeds.
pub trait CodeSource: Send + Sync {
    /// Produce the next candidate code.
    fn next_code(&self) -> GameCode;
}

/// Uniformly random codes drawn from [`GAME_CODE_ALPHABET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> GameCode {
        let mut rng = rand::thread_rng();
        let code = (0..GAME_CODE_LEN)
            .map(|_| GAME_CODE_ALPHABET[rng.gen_range(0..GAME_CODE_ALPHABET.len())] as char)
            .collect();
        GameCode(code)
    }
}

/// Replays a fixed list of codes, repeating the last one forever.
#[cfg(test)]
pub struct ScriptedCodes {
    codes: std::sync::Mutex<std::collections::VecDeque<GameCode>>,
}

#[cfg(test)]
impl ScriptedCodes {
    /// Script the given codes in order.
    pub fn new(codes: &[&str]) -> Self {
        let codes = codes
            .iter()
            .map(|c| GameCode::parse(c).expect("scripted code must be well-formed"))
            .collect();
        Self { codes: std::sync::Mutex::new(codes) }
    }
}

#[cfg(test)]
impl CodeSource for ScriptedCodes {
    fn next_code(&self) -> GameCode {
        let mut codes = self.codes.lock().unwrap();
        if codes.len() > 1 {
            codes.pop_front().unwrap()
        } else {
            codes.front().cloned().unwrap()
        }
    }
}
