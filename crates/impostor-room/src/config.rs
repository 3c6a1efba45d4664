//! Room and registry configuration.

use std::time::Duration;

use impostor_rules::{MIN_PLAYERS, Roster, TaskGoal};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings applied to every room a registry creates.
///
/// Durations are plain integers (`_secs`, `_ms`) so the struct reads
/// naturally from TOML. Call [`validated`](Self::validated) before use;
/// the registry does this for you.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum members per room, at most 10.
    pub max_players: usize,

    /// How the crew's task goal is measured.
    pub task_goal: TaskGoal,

    /// Closes an open vote round after this many seconds even if not
    /// everyone has voted. `None` waits for quorum or an explicit
    /// `resolve_round`.
    pub voting_time_limit_secs: Option<u64>,

    /// How long a command may wait to be queued and then started before
    /// it is dropped unapplied with `RoomError::Busy`.
    pub command_timeout_ms: u64,

    /// Once that deadline has passed, how much longer a caller waits for
    /// the reply before giving up with `RoomError::TimedOut`.
    pub reply_timeout_ms: u64,

    /// Capacity of the coordinator's command queue.
    pub channel_size: usize,

    /// Capacity of the room's event broadcast channel. Subscribers that
    /// fall further behind than this miss events.
    pub event_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: Roster::MAX_CAPACITY,
            task_goal: TaskGoal::default(),
            voting_time_limit_secs: None,
            command_timeout_ms: 250,
            reply_timeout_ms: 1000,
            channel_size: 64,
            event_capacity: 128,
        }
    }
}

impl RoomConfig {
    /// Clamps out-of-range values, logging a warning for each.
    pub fn validated(mut self) -> Self {
        let players = self.max_players.clamp(MIN_PLAYERS, Roster::MAX_CAPACITY);
        if players != self.max_players {
            warn!(
                requested = self.max_players,
                clamped = players,
                "max_players out of range, clamping"
            );
            self.max_players = players;
        }
        if self.voting_time_limit_secs == Some(0) {
            warn!("voting_time_limit_secs is 0, disabling the vote timer");
            self.voting_time_limit_secs = None;
        }
        if self.command_timeout_ms == 0 {
            warn!("command_timeout_ms is 0, using 1");
            self.command_timeout_ms = 1;
        }
        if self.reply_timeout_ms == 0 {
            warn!("reply_timeout_ms is 0, using 1");
            self.reply_timeout_ms = 1;
        }
        // Both tokio channels panic on zero capacity.
        if self.channel_size == 0 {
            warn!("channel_size is 0, using 1");
            self.channel_size = 1;
        }
        if self.event_capacity == 0 {
            warn!("event_capacity is 0, using 1");
            self.event_capacity = 1;
        }
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn voting_time_limit(&self) -> Option<Duration> {
        self.voting_time_limit_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Settings for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How many random codes to try before giving up on room creation.
    pub code_attempts: u32,

    /// Applied to every room the registry creates.
    pub room: RoomConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            code_attempts: 32,
            room: RoomConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn validated(mut self) -> Self {
        if self.code_attempts == 0 {
            warn!("code_attempts is 0, using 1");
            self.code_attempts = 1;
        }
        self.room = self.room.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_players, 10);
        assert_eq!(config.command_timeout(), Duration::from_millis(250));
        assert_eq!(config.reply_timeout(), Duration::from_secs(1));
        assert_eq!(config.voting_time_limit(), None);
        assert_eq!(config.task_goal, TaskGoal::Pooled { total_required: 20 });
    }

    #[test]
    fn test_validated_clamps_player_count() {
        let big = RoomConfig {
            max_players: 50,
            ..RoomConfig::default()
        };
        assert_eq!(big.validated().max_players, 10);

        let small = RoomConfig {
            max_players: 1,
            ..RoomConfig::default()
        };
        assert_eq!(small.validated().max_players, MIN_PLAYERS);
    }

    #[test]
    fn test_validated_fixes_zero_values() {
        let config = RoomConfig {
            voting_time_limit_secs: Some(0),
            command_timeout_ms: 0,
            reply_timeout_ms: 0,
            channel_size: 0,
            event_capacity: 0,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.voting_time_limit(), None);
        assert_eq!(config.command_timeout_ms, 1);
        assert_eq!(config.reply_timeout_ms, 1);
        assert_eq!(config.channel_size, 1);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_registry_config_validates_room() {
        let config = RegistryConfig {
            code_attempts: 0,
            room: RoomConfig {
                max_players: 99,
                ..RoomConfig::default()
            },
        }
        .validated();
        assert_eq!(config.code_attempts, 1);
        assert_eq!(config.room.max_players, 10);
    }
}
