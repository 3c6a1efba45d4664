//! Session registry: creates rooms, hands out their codes and finds them
//! again.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use impostor_protocol::{PlayerId, RoomCode};
use impostor_rules::{AlphaCodes, CodeGenerator, Player};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::room::{normalize_player, spawn_room};
use crate::{RegistryConfig, RoomError, RoomHandle, RoomInfo, RoomStore, SharedRng};

/// Returned by [`SessionRegistry::create`].
#[derive(Debug, Clone)]
pub struct Created {
    pub handle: RoomHandle,
    pub code: RoomCode,
    pub host: PlayerId,
}

/// Holds a code while its room is being created, so two concurrent
/// creations can't pick the same one.
struct Reservation<'a> {
    pending: &'a DashSet<RoomCode>,
    code: RoomCode,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.code);
    }
}

/// Maps room codes to running coordinators.
///
/// The map is sharded (`DashMap`), so lookups for different rooms don't
/// contend, and no shard lock is ever held across an await: handles are
/// cloned out before anyone talks to a room.
///
/// One RNG, seeded once, feeds both code generation and role assignment
/// for every room.
pub struct SessionRegistry<S: RoomStore> {
    rooms: DashMap<RoomCode, RoomHandle>,
    pending: DashSet<RoomCode>,
    store: Arc<S>,
    config: RegistryConfig,
    codes: Arc<dyn CodeGenerator>,
    rng: SharedRng,
}

impl<S: RoomStore> SessionRegistry<S> {
    /// Creates an empty registry with an OS-seeded RNG and [`AlphaCodes`].
    pub fn new(store: Arc<S>, config: RegistryConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            pending: DashSet::new(),
            store,
            config: config.validated(),
            codes: Arc::new(AlphaCodes),
            rng: Arc::new(Mutex::new(StdRng::from_os_rng())),
        }
    }

    /// Replaces the code generator.
    pub fn with_code_generator(mut self, codes: impl CodeGenerator) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    /// Reseeds the shared RNG, making codes and roles reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates a room with `host_name` as its host and only member.
    ///
    /// # Errors
    /// - [`RoomError::InvalidInput`] for a blank or overlong name
    /// - [`RoomError::CodeExhausted`] if no free code turned up
    /// - [`RoomError::Store`] if a store write failed
    pub async fn create(&self, host_name: &str, host_color: &str) -> Result<Created, RoomError> {
        let (name, color) = normalize_player(host_name, host_color)?;
        let reservation = self.reserve_code()?;
        let code = reservation.code.clone();

        let host = self.store.create_player(&name, &color).await?;
        let room_id = self.store.create_room(&code, host).await?;
        self.store.add_member(room_id, host).await?;

        let handle = spawn_room(
            room_id,
            code.clone(),
            Player::new(host, name, color),
            self.config.room.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.rng),
        );
        // Insert before the reservation drops so the code is never free
        // in between.
        self.rooms.insert(code.clone(), handle.clone());
        drop(reservation);

        info!(room = %code, %room_id, %host, "room created");
        Ok(Created { handle, code, host })
    }

    /// Picks a code that is neither live nor being created right now.
    fn reserve_code(&self) -> Result<Reservation<'_>, RoomError> {
        for attempt in 1..=self.config.code_attempts {
            let code = {
                let mut rng = self.rng.lock();
                self.codes.generate(&mut *rng)
            };
            // Reserve first, then check the live map: a creation that
            // finished in between is already visible there.
            if !self.pending.insert(code.clone()) {
                debug!(room = %code, attempt, "code is being created, retrying");
                continue;
            }
            let reservation = Reservation {
                pending: &self.pending,
                code,
            };
            if self.rooms.contains_key(&reservation.code) {
                debug!(room = %reservation.code, attempt, "code in use, retrying");
                continue;
            }
            return Ok(reservation);
        }
        warn!(attempts = self.config.code_attempts, "no free room code");
        Err(RoomError::CodeExhausted(self.config.code_attempts))
    }

    /// Finds a live room.
    pub fn lookup(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Removes a room and tells its coordinator to stop. Never waits on
    /// the room.
    ///
    /// A command the coordinator is applying right now completes. Commands
    /// still queued, and anything sent afterwards, fail with
    /// [`RoomError::Unavailable`].
    pub fn evict(&self, code: &RoomCode) -> Result<(), RoomError> {
        let (_, handle) = self
            .rooms
            .remove(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        handle.shutdown();
        info!(room = %code, "room evicted");
        Ok(())
    }

    /// Evicts every room idle for at least `idle_for`, plus any whose
    /// coordinator has stopped. Returns the evicted codes.
    ///
    /// A room too busy to answer is in use, so it is left alone until the
    /// next pass.
    pub async fn evict_idle(&self, idle_for: Duration) -> Vec<RoomCode> {
        let mut evicted = Vec::new();
        for (handle, info) in self.query_infos().await {
            let stale = match info {
                Ok(info) => info.idle >= idle_for,
                Err(RoomError::Unavailable(_)) => true,
                Err(e) => {
                    debug!(room = %handle.code(), error = %e, "room did not answer, skipping");
                    false
                }
            };
            if stale && self.evict(handle.code()).is_ok() {
                evicted.push(handle.code().clone());
            }
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "idle rooms evicted");
        }
        evicted
    }

    /// Rooms that are Waiting and have a free seat.
    ///
    /// Rooms that fail to respond (shutting down, busy) are skipped.
    pub async fn list_joinable(&self) -> Vec<RoomInfo> {
        self.query_infos()
            .await
            .into_iter()
            .filter_map(|(_, info)| info.ok())
            .filter(|info| info.status.is_joinable() && info.player_count < info.max_players)
            .collect()
    }

    /// Asks every live room for its summary at once, so one slow room
    /// costs a single timeout rather than one per room behind it.
    async fn query_infos(&self) -> Vec<(RoomHandle, Result<RoomInfo, RoomError>)> {
        let mut set = JoinSet::new();
        for handle in self.handles() {
            set.spawn(async move {
                let info = handle.info().await;
                (handle, info)
            });
        }
        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "room info query failed"),
            }
        }
        results
    }

    /// Cloned handles to all live rooms.
    pub fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn codes(&self) -> Vec<RoomCode> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
