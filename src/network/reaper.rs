//! Session Reaper
//!
//! Background sweep that purges stale sessions on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::core::GameCode;
use crate::network::server::{env_or, wait_for_shutdown};
use crate::network::store::SessionStore;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default age after which a session is purged.
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(3 * 60 * 60);

/// Reaper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Sessions idle longer than this are removed.
    pub max_age: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            max_age: DEFAULT_MAX_SESSION_AGE,
        }
    }
}

impl ReaperConfig {
    /// Read `GAME_REAPER_INTERVAL_SECS` and `GAME_SESSION_MAX_AGE_SECS`,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: Duration::from_secs(env_or("GAME_REAPER_INTERVAL_SECS", defaults.interval.as_secs()).max(1)),
            max_age: Duration::from_secs(env_or("GAME_SESSION_MAX_AGE_SECS", defaults.max_age.as_secs())),
        }
    }
}

/// Periodically purges expired sessions from a [`SessionStore`].
pub struct SessionReaper {
    store: Arc<SessionStore>,
    config: ReaperConfig,
}

impl SessionReaper {
    /// Create a reaper for `store`.
    pub fn new(store: Arc<SessionStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep.
    ///
    /// The purge runs on its own task so a panic inside it comes back as a
    /// `JoinError` instead of taking the loop down.
    pub async fn sweep(&self) -> Result<Vec<GameCode>, JoinError> {
        let store = self.store.clone();
        let max_age = self.config.max_age;
        tokio::spawn(async move { store.purge_expired_sessions(max_age).await }).await
    }

    /// Sweep every interval until shutdown.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Session reaper running every {:?}, max age {:?}",
            self.config.interval, self.config.max_age
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(removed) if removed.is_empty() => debug!("Sweep found nothing to purge"),
                        Ok(removed) => info!("Purged {} expired session(s)", removed.len()),
                        Err(e) => error!("Session sweep failed: {}", e),
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("Session reaper stopped");
    }
}
