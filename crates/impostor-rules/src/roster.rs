//! Roster manager: membership, liveness and host privilege for one room.

use impostor_protocol::{PlayerId, RoomStatus};

use crate::RulesError;

/// One member of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub alive: bool,
}

impl Player {
    /// A fresh, alive player.
    pub fn new(id: PlayerId, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            alive: true,
        }
    }
}

/// What happened when someone left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Player,
    /// Set when the leaver was the host and someone else remains.
    pub new_host: Option<PlayerId>,
    /// `true` if nobody is left.
    pub now_empty: bool,
}

/// The members of one room, in join order.
///
/// Join order matters: when the host leaves, host privilege passes to the
/// member who has been in the room longest.
#[derive(Debug, Clone)]
pub struct Roster {
    players: Vec<Player>,
    host: Option<PlayerId>,
    capacity: usize,
}

impl Roster {
    /// Hard upper bound on room size.
    pub const MAX_CAPACITY: usize = 10;

    /// Creates a roster with the host as its only member.
    ///
    /// `capacity` is clamped to `1..=MAX_CAPACITY`.
    pub fn with_host(host: Player, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Self::MAX_CAPACITY);
        Self {
            host: Some(host.id),
            players: vec![host],
            capacity,
        }
    }

    /// Adds a player.
    ///
    /// # Errors
    /// - [`RulesError::RoomFull`] at capacity
    /// - [`RulesError::RoomNotJoinable`] unless `status` is Waiting
    /// - [`RulesError::AlreadyMember`] if the id is already present
    pub fn join(&mut self, player: Player, status: RoomStatus) -> Result<&[Player], RulesError> {
        self.check_can_join(status)?;
        if self.contains(player.id) {
            return Err(RulesError::AlreadyMember(player.id));
        }
        if self.host.is_none() {
            self.host = Some(player.id);
        }
        self.players.push(Player {
            alive: true,
            ..player
        });
        Ok(&self.players)
    }

    /// The capacity and status checks of [`join`](Self::join), for callers
    /// that must know a join will be accepted before the player exists.
    pub fn check_can_join(&self, status: RoomStatus) -> Result<(), RulesError> {
        if self.players.len() >= self.capacity {
            return Err(RulesError::RoomFull {
                capacity: self.capacity,
            });
        }
        if !status.is_joinable() {
            return Err(RulesError::RoomNotJoinable(status));
        }
        Ok(())
    }

    /// Removes a player, handing host privilege on if needed.
    pub fn leave(&mut self, id: PlayerId) -> Result<Departure, RulesError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(RulesError::NotAMember(id))?;
        let player = self.players.remove(index);

        let mut new_host = None;
        if self.host == Some(id) {
            self.host = self.players.first().map(|p| p.id);
            new_host = self.host;
        }

        Ok(Departure {
            player,
            new_host,
            now_empty: self.players.is_empty(),
        })
    }

    /// Marks a player as eliminated. Returns `true` if they were alive.
    ///
    /// Idempotent: eliminating an eliminated player is `Ok(false)`.
    pub fn mark_eliminated(&mut self, id: PlayerId) -> Result<bool, RulesError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RulesError::NotAMember(id))?;
        let was_alive = player.alive;
        player.alive = false;
        Ok(was_alive)
    }

    /// Brings everyone back to life for a new game.
    pub fn revive_all(&mut self) {
        for player in &mut self.players {
            player.alive = true;
        }
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.get(id).is_some()
    }

    /// `true` only for current members who are still alive.
    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.get(id).is_some_and(|p| p.alive)
    }

    /// All members in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn alive(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.alive().count()
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host == Some(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
