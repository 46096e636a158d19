//! Session Store
//!
//! Concurrent map of live sessions plus the connection index used for host
//! authorization and disconnect cleanup.
//!
//! ## Locking
//!
//! Each session sits behind its own `RwLock`; unrelated sessions never
//! contend. Map guards are never held across an `.await`: handles are
//! cloned out first. Removal always happens under the session's write lock:
//! the session is tombstoned, the map entry is dropped only if it still holds
//! the same handle, and the index entries of its participants are dropped
//! only if they still point at this code. Anything that raced the removal
//! and then acquires the lock sees the tombstone and reports `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::core::{Clock, CodeSource, ConnectionId, GameCode, RandomCodes, SystemClock};
use crate::game::player::PlayerInfo;
use crate::game::session::{GameSession, JoinError, PlayerNumber, SessionError};

/// Capacity of the removal notification channel.
const REMOVAL_CHANNEL_CAPACITY: usize = 256;

/// Shared handle to one session.
pub type SharedSession = Arc<RwLock<GameSession>>;

/// Why a session left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// A participant disconnected before the game started.
    Abandoned,
    /// Purged by age.
    Expired,
    /// Removed on request.
    Explicit,
}

/// Published whenever a session is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRemoved {
    /// Code of the removed session.
    pub game_id: GameCode,
    /// What removed it.
    pub reason: RemovalReason,
}

/// What a departing connection left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The connection was not in a live game.
    NotInGame,
    /// The game had not started and was removed.
    Abandoned(GameCode),
    /// The game had started and stays until it is reaped.
    Left(GameCode),
}

/// All live sessions.
pub struct SessionStore {
    /// Game code to session.
    sessions: DashMap<GameCode, SharedSession>,
    /// Connection to the game it participates in.
    connections: DashMap<ConnectionId, GameCode>,
    /// Candidate code generator.
    codes: Box<dyn CodeSource>,
    /// Timestamp source.
    clock: Arc<dyn Clock>,
    /// Removal notifications.
    removals: broadcast::Sender<SessionRemoved>,
}

impl SessionStore {
    /// Store with random codes and the system clock.
    pub fn new() -> Self {
        Self::with_parts(Box::new(RandomCodes), Arc::new(SystemClock))
    }

    /// Store with an explicit code source and clock.
    pub fn with_parts(codes: Box<dyn CodeSource>, clock: Arc<dyn Clock>) -> Self {
        let (removals, _) = broadcast::channel(REMOVAL_CHANNEL_CAPACITY);

        Self {
            sessions: DashMap::new(),
            connections: DashMap::new(),
            codes,
            clock,
            removals,
        }
    }

    /// Receive a notification for every future removal.
    pub fn subscribe_removals(&self) -> broadcast::Receiver<SessionRemoved> {
        self.removals.subscribe()
    }

    /// Open a lobby hosted by `connection`.
    ///
    /// Retries candidate codes until one is free, so this always succeeds
    /// and never overwrites a live session. If the connection was already
    /// in another game it departs that game afterwards.
    pub async fn create_session(&self, host: PlayerInfo, connection: ConnectionId) -> GameSession {
        let now = self.clock.now();
        let mut attempts = 0u32;

        let (snapshot, previous) = loop {
            attempts += 1;
            let code = self.codes.next_code();

            match self.sessions.entry(code.clone()) {
                Entry::Occupied(_) => {
                    debug!("Game code {} taken, retrying", code);
                }
                Entry::Vacant(slot) => {
                    let session = GameSession::new(code.clone(), host.clone(), connection, now);
                    let snapshot = session.clone();
                    slot.insert(Arc::new(RwLock::new(session)));
                    let previous = self.connections.insert(connection, code);
                    break (snapshot, previous);
                }
            }
        };

        info!(
            "Game {} created by {} ({}) after {} attempt(s)",
            snapshot.id(), connection, snapshot.player1().name, attempts
        );

        if let Some(previous) = previous {
            self.depart(connection, &previous).await;
        }

        snapshot
    }

    /// Consistent copy of a live session.
    pub async fn get_session(&self, game_id: &GameCode) -> Option<GameSession> {
        let session = self.lookup(game_id)?;
        let guard = session.read().await;
        if guard.is_closed() {
            None
        } else {
            Some(guard.clone())
        }
    }

    /// Fill the second slot of `game_id`.
    ///
    /// Check and fill happen under the session's write lock: of two racing
    /// joiners exactly one wins and the other sees `AlreadyFull`.
    pub async fn try_join_session(
        &self,
        game_id: &GameCode,
        player: PlayerInfo,
        connection: ConnectionId,
    ) -> Result<GameSession, JoinError> {
        let session = self.lookup(game_id).ok_or(JoinError::NotFound)?;

        let (snapshot, previous) = {
            let mut guard = session.write().await;
            guard.join(player, connection)?;
            let previous = self.connections.insert(connection, game_id.clone());
            (guard.clone(), previous)
        };

        info!(
            "{} joined game {} as {}",
            connection,
            game_id,
            snapshot.player2().map(|p| p.name.as_str()).unwrap_or_default()
        );

        if let Some(previous) = previous.filter(|p| p != game_id) {
            self.depart(connection, &previous).await;
        }

        Ok(snapshot)
    }

    /// Whether `connection` created `game_id`. Unknown codes yield false.
    pub async fn is_host(&self, game_id: &GameCode, connection: &ConnectionId) -> bool {
        match self.lookup(game_id) {
            Some(session) => {
                let guard = session.read().await;
                !guard.is_closed() && guard.is_host(connection)
            }
            None => false,
        }
    }

    /// Host check and start under one critical section.
    pub async fn start_game(
        &self,
        game_id: &GameCode,
        connection: &ConnectionId,
    ) -> Result<GameSession, SessionError> {
        let session = self.lookup(game_id).ok_or(SessionError::NotFound)?;
        let mut guard = session.write().await;
        guard.start(connection, self.clock.now())?;

        info!("Game {} started by host {}", game_id, connection);
        Ok(guard.clone())
    }

    /// Set a player's score. No phase restriction.
    pub async fn update_score(
        &self,
        game_id: &GameCode,
        player: PlayerNumber,
        score: i32,
    ) -> Result<GameSession, SessionError> {
        let session = self.lookup(game_id).ok_or(SessionError::NotFound)?;
        let mut guard = session.write().await;
        guard.set_score(player, score)?;

        debug!("Game {} score {:?} = {}", game_id, player, score);
        Ok(guard.clone())
    }

    /// Mark a started game completed on behalf of a participant.
    pub async fn end_game(
        &self,
        game_id: &GameCode,
        connection: &ConnectionId,
    ) -> Result<GameSession, SessionError> {
        let session = self.lookup(game_id).ok_or(SessionError::NotFound)?;
        let mut guard = session.write().await;
        guard.end(connection, self.clock.now())?;

        info!("Game {} ended by {}", game_id, connection);
        Ok(guard.clone())
    }

    /// Remove a session and its index entries. Returns false if it was not
    /// live.
    pub async fn remove_session(&self, game_id: &GameCode) -> bool {
        let Some(session) = self.lookup(game_id) else {
            return false;
        };

        let mut guard = session.write().await;
        if guard.is_closed() {
            return false;
        }

        self.close_locked(&mut guard, &session, RemovalReason::Explicit);
        true
    }

    /// Handle a dropped connection.
    ///
    /// A game that has not started is abandoned and removed outright. A
    /// started game stays. The connection's index entry is always dropped.
    pub async fn on_disconnected(&self, connection: ConnectionId) -> Departure {
        match self.connection_game(&connection) {
            Some(game_id) => self.depart(connection, &game_id).await,
            None => Departure::NotInGame,
        }
    }

    /// Remove every session whose last activity (end, else start, else
    /// creation) is strictly older than `max_age`.
    ///
    /// Works from a snapshot of handles and takes each session's lock on its
    /// own, so a sweep interrupted half-way leaves a consistent store.
    pub async fn purge_expired_sessions(&self, max_age: Duration) -> Vec<GameCode> {
        let now = self.clock.now();
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            // Nothing can be older than an unrepresentable age
            None => return Vec::new(),
        };

        let candidates: Vec<SharedSession> = self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut removed = Vec::new();
        for session in candidates {
            let mut guard = session.write().await;
            if guard.is_closed() || !guard.is_expired(cutoff) {
                continue;
            }

            let game_id = guard.id().clone();
            self.close_locked(&mut guard, &session, RemovalReason::Expired);
            removed.push(game_id);
        }

        removed
    }

    /// Game the connection currently participates in.
    pub fn connection_game(&self, connection: &ConnectionId) -> Option<GameCode> {
        self.connections.get(connection).map(|entry| entry.value().clone())
    }

    /// Whether a session with this code is in the map.
    pub fn contains(&self, game_id: &GameCode) -> bool {
        self.sessions.contains_key(game_id)
    }

    /// Get active session count.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get indexed connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn lookup(&self, game_id: &GameCode) -> Option<SharedSession> {
        self.sessions.get(game_id).map(|entry| entry.value().clone())
    }

    /// Leave `game_id` without touching index entries that point elsewhere.
    async fn depart(&self, connection: ConnectionId, game_id: &GameCode) -> Departure {
        let Some(session) = self.lookup(game_id) else {
            self.connections.remove_if(&connection, |_, game| game == game_id);
            return Departure::NotInGame;
        };

        let mut guard = session.write().await;
        if guard.is_closed() || !guard.is_participant(&connection) {
            self.connections.remove_if(&connection, |_, game| game == game_id);
            return Departure::NotInGame;
        }

        if guard.is_started() {
            guard.release(&connection);
            self.connections.remove_if(&connection, |_, game| game == game_id);
            debug!("{} left game {} ({:?})", connection, game_id, guard.phase());
            Departure::Left(game_id.clone())
        } else {
            self.close_locked(&mut guard, &session, RemovalReason::Abandoned);
            Departure::Abandoned(game_id.clone())
        }
    }

    /// Tombstone and unlink a session. Caller holds its write lock.
    fn close_locked(&self, session: &mut GameSession, handle: &SharedSession, reason: RemovalReason) {
        session.close();
        let game_id = session.id().clone();

        self.sessions.remove_if(&game_id, |_, current| Arc::ptr_eq(current, handle));
        for connection in session.participants() {
            self.connections.remove_if(&connection, |_, game| *game == game_id);
        }

        info!("Game {} removed ({:?}, was {:?})", game_id, reason, session.phase());

        // No receivers is fine
        let _ = self.removals.send(SessionRemoved { game_id, reason });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use chrono::Utc;
    use proptest::prelude::*;

    use crate::core::clock::ManualClock;
    use crate::core::code::ScriptedCodes;

    fn player(name: &str) -> PlayerInfo {
        PlayerInfo::from_name(name).unwrap()
    }

    fn code(s: &str) -> GameCode {
        GameCode::parse(s).unwrap()
    }

    fn scripted_store(codes: &[&str]) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let store = SessionStore::with_parts(Box::new(ScriptedCodes::new(codes)), clock.clone());
        (store, clock)
    }

    /// Plays back a scripted prefix (with repeats), then walks the pool.
    struct PoolCodes {
        pool: Vec<GameCode>,
        prefix: Vec<usize>,
        calls: AtomicUsize,
    }

    impl CodeSource for PoolCodes {
        fn next_code(&self) -> GameCode {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            let idx = if n < self.prefix.len() {
                self.prefix[n]
            } else {
                n - self.prefix.len()
            };
            self.pool[idx % self.pool.len()].clone()
        }
    }

    #[tokio::test]
    async fn test_lobby_scenario() {
        let (store, _) = scripted_store(&["ABC123"]);
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        let session = store.create_session(player("Alice"), c1).await;
        assert_eq!(session.id(), &code("ABC123"));

        let joined = store.try_join_session(&code("ABC123"), player("Bob"), c2).await.unwrap();
        assert_eq!(joined.player2().unwrap().name, "Bob");

        let third = store.try_join_session(&code("ABC123"), player("Eve"), c3).await;
        assert_eq!(third.unwrap_err(), JoinError::AlreadyFull);

        assert!(store.is_host(&code("ABC123"), &c1).await);
        assert!(!store.is_host(&code("ABC123"), &c2).await);
        assert!(!store.is_host(&code("ABC123"), &c3).await);

        let denied = store.start_game(&code("ABC123"), &c2).await;
        assert_eq!(denied.unwrap_err(), SessionError::Unauthorized);
        assert!(store.get_session(&code("ABC123")).await.unwrap().start_time().is_none());

        let started = store.start_game(&code("ABC123"), &c1).await.unwrap();
        assert!(started.start_time().is_some());
    }

    #[tokio::test]
    async fn test_code_collision_retries() {
        let (store, _) = scripted_store(&["AAAAAA", "AAAAAA", "BBBBBB"]);

        let first = store.create_session(player("Alice"), ConnectionId::new()).await;
        let second = store.create_session(player("Bob"), ConnectionId::new()).await;

        assert_eq!(first.id(), &code("AAAAAA"));
        assert_eq!(second.id(), &code("BBBBBB"));
        assert_eq!(store.get_session(&code("AAAAAA")).await.unwrap().player1().name, "Alice");
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let store = SessionStore::new();
        store.create_session(player("Alice"), ConnectionId::new()).await;

        let result = store.try_join_session(&code("ZZZZZZ"), player("Bob"), ConnectionId::new()).await;
        assert_eq!(result.unwrap_err(), JoinError::NotFound);
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.connection_count(), 1);

        assert!(!store.is_host(&code("ZZZZZZ"), &ConnectionId::new()).await);
        assert!(store.get_session(&code("ZZZZZZ")).await.is_none());
    }

    #[tokio::test]
    async fn test_join_after_start_rejected() {
        let store = SessionStore::new();
        let host = ConnectionId::new();
        let game = store.create_session(player("Alice"), host).await;
        store.start_game(game.id(), &host).await.unwrap();

        let result = store.try_join_session(game.id(), player("Bob"), ConnectionId::new()).await;
        assert_eq!(result.unwrap_err(), JoinError::AlreadyStarted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_single_winner() {
        for _ in 0..20 {
            let store = Arc::new(SessionStore::new());
            let game = store.create_session(player("Alice"), ConnectionId::new()).await;

            let mut handles = Vec::new();
            for i in 0..8 {
                let store = store.clone();
                let game_id = game.id().clone();
                handles.push(tokio::spawn(async move {
                    store.try_join_session(&game_id, player(&format!("P{}", i)), ConnectionId::new()).await
                }));
            }

            let mut winners = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => winners += 1,
                    Err(e) => assert_eq!(e, JoinError::AlreadyFull),
                }
            }

            assert_eq!(winners, 1);
            let session = store.get_session(game.id()).await.unwrap();
            assert!(session.player2().is_some());
            assert_eq!(store.connection_count(), 2);
        }
    }

    #[tokio::test]
    async fn test_host_disconnect_before_start_removes_session() {
        let store = SessionStore::new();
        let (host, guest) = (ConnectionId::new(), ConnectionId::new());
        let game = store.create_session(player("Alice"), host).await;
        store.try_join_session(game.id(), player("Bob"), guest).await.unwrap();
        let mut removals = store.subscribe_removals();

        let departure = store.on_disconnected(host).await;
        assert_eq!(departure, Departure::Abandoned(game.id().clone()));
        assert!(store.get_session(game.id()).await.is_none());
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.connection_count(), 0);

        let removed = removals.recv().await.unwrap();
        assert_eq!(removed.reason, RemovalReason::Abandoned);
    }

    #[tokio::test]
    async fn test_guest_disconnect_before_start_abandons_lobby() {
        let store = SessionStore::new();
        let (host, guest) = (ConnectionId::new(), ConnectionId::new());
        let game = store.create_session(player("Alice"), host).await;
        store.try_join_session(game.id(), player("Bob"), guest).await.unwrap();

        store.on_disconnected(guest).await;
        assert!(store.get_session(game.id()).await.is_none());
        assert!(store.connection_game(&host).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_after_start_keeps_session() {
        let store = SessionStore::new();
        let (host, guest) = (ConnectionId::new(), ConnectionId::new());
        let game = store.create_session(player("Alice"), host).await;
        store.try_join_session(game.id(), player("Bob"), guest).await.unwrap();
        store.start_game(game.id(), &host).await.unwrap();

        assert_eq!(store.on_disconnected(guest).await, Departure::Left(game.id().clone()));
        assert!(store.get_session(game.id()).await.is_some());
        assert!(store.connection_game(&guest).is_none());

        assert_eq!(store.on_disconnected(host).await, Departure::Left(game.id().clone()));
        assert!(store.get_session(game.id()).await.is_some());
        assert_eq!(store.connection_count(), 0);

        assert_eq!(store.on_disconnected(host).await, Departure::NotInGame);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_join_race_is_consistent() {
        for _ in 0..50 {
            let store = Arc::new(SessionStore::new());
            let host = ConnectionId::new();
            let guest = ConnectionId::new();
            let game = store.create_session(player("Alice"), host).await;

            let join = {
                let store = store.clone();
                let game_id = game.id().clone();
                tokio::spawn(async move { store.try_join_session(&game_id, player("Bob"), guest).await })
            };
            let leave = {
                let store = store.clone();
                tokio::spawn(async move { store.on_disconnected(host).await })
            };

            let joined = join.await.unwrap();
            leave.await.unwrap();

            match joined {
                Ok(_) | Err(JoinError::NotFound) => {}
                Err(other) => panic!("unexpected join outcome {:?}", other),
            }

            // Lobby was abandoned either way; nothing may point at it
            assert!(store.get_session(game.id()).await.is_none());
            assert!(store.connection_game(&host).is_none());
            assert!(store.connection_game(&guest).is_none());
        }
    }

    #[tokio::test]
    async fn test_recreate_abandons_previous_lobby() {
        let store = SessionStore::new();
        let host = ConnectionId::new();

        let first = store.create_session(player("Alice"), host).await;
        let second = store.create_session(player("Alice"), host).await;

        assert_ne!(first.id(), second.id());
        assert!(store.get_session(first.id()).await.is_none());
        assert_eq!(store.connection_game(&host), Some(second.id().clone()));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_joining_elsewhere_leaves_started_game() {
        let store = SessionStore::new();
        let (alice, bob, carol) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());

        let first = store.create_session(player("Alice"), alice).await;
        store.try_join_session(first.id(), player("Bob"), bob).await.unwrap();
        store.start_game(first.id(), &alice).await.unwrap();

        let second = store.create_session(player("Carol"), carol).await;
        store.try_join_session(second.id(), player("Bob"), bob).await.unwrap();

        assert!(store.get_session(first.id()).await.is_some());
        assert_eq!(store.connection_game(&bob), Some(second.id().clone()));
        assert_eq!(store.connection_game(&alice), Some(first.id().clone()));

        // Bob gave up his seat in the first game
        assert_eq!(store.end_game(first.id(), &bob).await.unwrap_err(), SessionError::Unauthorized);
        let left = store.get_session(first.id()).await.unwrap();
        assert_eq!(left.guest_connection(), None);
        assert_eq!(left.player2().unwrap().name, "Bob");
        assert!(store.end_game(first.id(), &alice).await.is_ok());
    }

    #[tokio::test]
    async fn test_explicit_removal() {
        let store = SessionStore::new();
        let host = ConnectionId::new();
        let game = store.create_session(player("Alice"), host).await;
        let mut removals = store.subscribe_removals();

        assert!(store.remove_session(game.id()).await);
        assert!(!store.remove_session(game.id()).await);
        assert!(store.connection_game(&host).is_none());

        let removed = removals.recv().await.unwrap();
        assert_eq!(removed, SessionRemoved { game_id: game.id().clone(), reason: RemovalReason::Explicit });
    }

    #[tokio::test]
    async fn test_update_score_any_phase() {
        let store = SessionStore::new();
        let host = ConnectionId::new();
        let game = store.create_session(player("Alice"), host).await;

        let updated = store.update_score(game.id(), PlayerNumber::One, 120).await.unwrap();
        assert_eq!(updated.score(PlayerNumber::One), 120);

        store.start_game(game.id(), &host).await.unwrap();
        store.end_game(game.id(), &host).await.unwrap();
        let updated = store.update_score(game.id(), PlayerNumber::Two, 90).await.unwrap();
        assert_eq!(updated.score(PlayerNumber::Two), 90);

        let missing = store.update_score(&code("ZZZZZZ"), PlayerNumber::One, 1).await;
        assert_eq!(missing.unwrap_err(), SessionError::NotFound);
    }

    #[tokio::test]
    async fn test_purge_by_end_time() {
        let (store, clock) = scripted_store(&["OLDOLD", "NEWNEW"]);
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        let old = store.create_session(player("Alice"), a).await;
        store.start_game(old.id(), &a).await.unwrap();
        store.end_game(old.id(), &a).await.unwrap();

        clock.advance(chrono::Duration::hours(2));
        let recent = store.create_session(player("Bob"), b).await;
        store.start_game(recent.id(), &b).await.unwrap();
        store.end_game(recent.id(), &b).await.unwrap();

        clock.advance(chrono::Duration::hours(1));
        let removed = store.purge_expired_sessions(Duration::from_secs(2 * 3600)).await;

        assert_eq!(removed, vec![old.id().clone()]);
        assert!(store.get_session(old.id()).await.is_none());
        assert!(store.get_session(recent.id()).await.is_some());
    }

    #[tokio::test]
    async fn test_purge_uses_start_then_creation_time() {
        let (store, clock) = scripted_store(&["AAAAAA", "BBBBBB"]);
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        let idle = store.create_session(player("Alice"), a).await;
        let started = store.create_session(player("Bob"), b).await;
        clock.advance(chrono::Duration::minutes(90));
        store.start_game(started.id(), &b).await.unwrap();

        clock.advance(chrono::Duration::minutes(60));
        let removed = store.purge_expired_sessions(Duration::from_secs(2 * 3600)).await;

        assert_eq!(removed, vec![idle.id().clone()]);
        assert!(store.get_session(started.id()).await.is_some());
        assert!(store.connection_game(&a).is_none());
    }

    #[tokio::test]
    async fn test_purge_boundary_is_strict() {
        let (store, clock) = scripted_store(&["AAAAAA"]);
        store.create_session(player("Alice"), ConnectionId::new()).await;

        clock.advance(chrono::Duration::hours(2));
        assert!(store.purge_expired_sessions(Duration::from_secs(2 * 3600)).await.is_empty());

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(store.purge_expired_sessions(Duration::from_secs(2 * 3600)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_with_huge_age_removes_nothing() {
        let store = SessionStore::new();
        store.create_session(player("Alice"), ConnectionId::new()).await;
        assert!(store.purge_expired_sessions(Duration::MAX).await.is_empty());
        assert_eq!(store.session_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_codes_unique_among_live_sessions(
            prefix in proptest::collection::vec(0usize..6, 0..30),
            creates in 1usize..20,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let pool = (0..32u8)
                    .map(|i| code(&format!("CODE{:02}", i)))
                    .collect();
                let source = PoolCodes { pool, prefix, calls: AtomicUsize::new(0) };
                let store = SessionStore::with_parts(Box::new(source), Arc::new(SystemClock));

                let mut seen = HashSet::new();
                for i in 0..creates {
                    let session = store.create_session(player(&format!("P{}", i)), ConnectionId::new()).await;
                    assert!(seen.insert(session.id().clone()), "duplicate code {}", session.id());
                }
                assert_eq!(store.session_count(), creates);
            });
        }

        #[test]
        fn prop_purge_respects_threshold(
            mut ages in proptest::collection::vec(0i64..600, 1..12),
            threshold in 1i64..600,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                // Oldest first so the clock only moves forward
                ages.sort_unstable_by(|a, b| b.cmp(a));

                let base = Utc::now();
                let clock = Arc::new(ManualClock::starting_at(base));
                let store = SessionStore::with_parts(Box::new(RandomCodes), clock.clone());

                let mut elapsed = 0i64;
                let mut sessions = Vec::new();
                for age in &ages {
                    let created_at = 600 - age;
                    clock.advance(chrono::Duration::minutes(created_at - elapsed));
                    elapsed = created_at;
                    let session = store.create_session(player("P"), ConnectionId::new()).await;
                    sessions.push((session.id().clone(), *age));
                }
                clock.advance(chrono::Duration::minutes(600 - elapsed));

                let max_age = Duration::from_secs(threshold as u64 * 60);
                let removed: HashSet<_> = store.purge_expired_sessions(max_age).await.into_iter().collect();

                for (game_id, age) in sessions {
                    assert_eq!(removed.contains(&game_id), age > threshold, "age {} threshold {}", age, threshold);
                }
            });
        }
    }
}
