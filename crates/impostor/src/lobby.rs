//! `Lobby`: the session registry plus an idle-room reaper.
//!
//! An embedding server (HTTP handlers, a WebSocket gateway, a test
//! harness) holds one `Lobby` and reaches rooms by the codes players type
//! in. Everything else happens on the [`RoomHandle`] it hands back.

use std::sync::{Arc, Weak};
use std::time::Duration;

use impostor_protocol::RoomCode;
use impostor_room::{
    Applied, Created, Joined, RoomHandle, RoomInfo, RoomStore, SessionRegistry,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::{ImpostorError, LobbyConfig};

/// Front door to every room in the process.
///
/// When `idle_timeout_secs` is non-zero a background task evicts rooms
/// that have seen no mutating command for that long. The task holds only
/// a weak reference and is aborted when the lobby is dropped.
pub struct Lobby<S: RoomStore> {
    registry: Arc<SessionRegistry<S>>,
    config: LobbyConfig,
    reaper: Option<JoinHandle<()>>,
}

impl<S: RoomStore> Lobby<S> {
    /// Creates a lobby over `store`.
    ///
    /// Must be called inside a Tokio runtime if idle reaping is enabled.
    pub fn new(store: Arc<S>, config: LobbyConfig) -> Self {
        let config = config.validated();
        let registry = SessionRegistry::new(store, config.registry.clone());
        Self::with_registry(registry, config)
    }

    /// Wraps an already configured registry (custom code generator, fixed
    /// seed). Only the reaper settings of `config` are used; the registry
    /// keeps its own.
    pub fn with_registry(registry: SessionRegistry<S>, config: LobbyConfig) -> Self {
        let config = config.validated();
        let registry = Arc::new(registry);
        let reaper = config.idle_timeout().map(|idle| {
            spawn_reaper(Arc::downgrade(&registry), idle, config.reap_interval())
        });
        Self {
            registry,
            config,
            reaper,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<S>> {
        &self.registry
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Creates a room with the caller as host.
    pub async fn create_room(&self, name: &str, color: &str) -> Result<Created, ImpostorError> {
        Ok(self.registry.create(name, color).await?)
    }

    /// Finds a room by a code as typed by a player (case and surrounding
    /// whitespace don't matter).
    pub fn room(&self, code: &str) -> Result<RoomHandle, ImpostorError> {
        let code = RoomCode::parse(code)?;
        Ok(self.registry.lookup(&code)?)
    }

    /// Joins the room behind `code` as a new player.
    pub async fn join(
        &self,
        code: &str,
        name: &str,
        color: &str,
    ) -> Result<Applied<Joined>, ImpostorError> {
        let handle = self.room(code)?;
        Ok(handle.join(name, color).await?)
    }

    /// Rooms still accepting players.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        self.registry.list_joinable().await
    }

    /// Ends the room if it is still running, then evicts it.
    pub async fn close_room(&self, code: &str) -> Result<(), ImpostorError> {
        let handle = self.room(code)?;
        if let Err(e) = handle.end().await {
            // Already ended, or the coordinator is gone.
            debug!(room = %handle.code(), error = %e, "room not ended before close");
        }
        self.registry.evict(handle.code())?;
        Ok(())
    }

    /// Stops the reaper and evicts every room. Never waits on a room.
    pub fn shutdown(mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
        let codes = self.registry.codes();
        for code in &codes {
            // Raced with the reaper or an explicit close.
            let _ = self.registry.evict(code);
        }
        info!(rooms = codes.len(), "lobby shut down");
    }
}

impl<S: RoomStore> Drop for Lobby<S> {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

fn spawn_reaper<S: RoomStore>(
    registry: Weak<SessionRegistry<S>>,
    idle: Duration,
    every: Duration,
) -> JoinHandle<()> {
    info!(idle_secs = idle.as_secs(), every_secs = every.as_secs(), "idle room reaper started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let evicted = registry.evict_idle(idle).await;
            debug!(evicted = evicted.len(), rooms = registry.len(), "reaper pass");
        }
    })
}
