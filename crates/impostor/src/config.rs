//! Lobby configuration, loaded from TOML.
//!
//! ```toml
//! idle_timeout_secs = 1800
//! reap_interval_secs = 60
//! log_filter = "info,impostor_room=debug"
//!
//! [registry]
//! code_attempts = 32
//!
//! [registry.room]
//! max_players = 10
//! voting_time_limit_secs = 90
//!
//! [registry.room.task_goal]
//! policy = "pooled"
//! total_required = 20
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use std::path::Path;
use std::time::Duration;

use impostor_room::RegistryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level settings for a [`Lobby`](crate::Lobby).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Rooms with no mutating command for this long are evicted. 0 keeps
    /// rooms until they are closed explicitly.
    pub idle_timeout_secs: u64,

    /// How often the reaper looks for idle rooms.
    pub reap_interval_secs: u64,

    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG`
    /// is not set.
    pub log_filter: String,

    pub registry: RegistryConfig,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            reap_interval_secs: 60,
            log_filter: "info".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

impl LobbyConfig {
    /// Reads and parses a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LobbyConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Clamps out-of-range values, logging a warning for each.
    pub fn validated(mut self) -> Self {
        if self.reap_interval_secs == 0 {
            warn!("reap_interval_secs is 0, using 1");
            self.reap_interval_secs = 1;
        }
        self.registry = self.registry.validated();
        self
    }

    /// `None` when idle rooms are kept forever.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use impostor_rules::TaskGoal;

    #[test]
    fn test_empty_toml_is_default() {
        let config = LobbyConfig::from_toml_str("").unwrap();
        assert_eq!(config, LobbyConfig::default());
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_nested_room_settings() {
        let config = LobbyConfig::from_toml_str(
            r#"
            idle_timeout_secs = 0
            log_filter = "debug"

            [registry]
            code_attempts = 8

            [registry.room]
            max_players = 6
            voting_time_limit_secs = 45

            [registry.room.task_goal]
            policy = "per_player"
            required_each = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.registry.code_attempts, 8);
        let room = &config.registry.room;
        assert_eq!(room.max_players, 6);
        assert_eq!(room.voting_time_limit(), Some(Duration::from_secs(45)));
        assert_eq!(room.task_goal, TaskGoal::PerPlayer { required_each: 3 });
        // Untouched fields keep their defaults.
        assert_eq!(room.channel_size, 64);
    }

    #[test]
    fn test_pooled_task_goal() {
        let config = LobbyConfig::from_toml_str(
            r#"
            [registry.room.task_goal]
            policy = "pooled"
            total_required = 6
            "#,
        )
        .unwrap();
        assert_eq!(
            config.registry.room.task_goal,
            TaskGoal::Pooled { total_required: 6 }
        );
    }

    #[test]
    fn test_unknown_task_policy_is_parse_error() {
        let err = LobbyConfig::from_toml_str(
            r#"
            [registry.room.task_goal]
            policy = "vibes"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LobbyConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validated_fixes_zero_interval() {
        let config = LobbyConfig {
            reap_interval_secs: 0,
            ..LobbyConfig::default()
        }
        .validated();
        assert_eq!(config.reap_interval(), Duration::from_secs(1));
    }
}
