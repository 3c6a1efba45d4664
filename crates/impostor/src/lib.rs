//! # Impostor
//!
//! Room coordination engine for hidden-role party games.
//!
//! Players gather in a room behind a six-letter code, one of them is
//! secretly made the adversary, and the rest try to finish their tasks or
//! vote the adversary out before they are outnumbered. This crate ties the
//! layers together:
//!
//! - `impostor-protocol`: ids, public views, broadcast events, codecs
//! - `impostor-rules`: the pure game rules
//! - `impostor-room`: one coordinator task per room plus the registry
//!
//! and adds what an embedding server needs around them: a [`Lobby`] that
//! reaps idle rooms, TOML configuration, tracing setup and a single
//! error type.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use impostor::prelude::*;
//!
//! # async fn demo() -> Result<(), ImpostorError> {
//! let lobby = Lobby::new(Arc::new(MemoryStore::new()), LobbyConfig::default());
//! let created = lobby.create_room("ana", "red").await?;
//! let bo = lobby.join(created.code.as_str(), "bo", "blue").await?;
//! let cy = lobby.join(created.code.as_str(), "cy", "green").await?;
//! created.handle.start(created.host).await?;
//! # let _ = (bo, cy);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod lobby;
pub mod telemetry;

pub use config::{ConfigError, LobbyConfig};
pub use error::ImpostorError;
pub use lobby::Lobby;

pub use impostor_protocol as protocol;
pub use impostor_room as room;
pub use impostor_rules as rules;

/// The types most embedders need.
pub mod prelude {
    pub use crate::{ImpostorError, Lobby, LobbyConfig};
    pub use impostor_protocol::{
        Codec, EndReason, ErrorKind, GameOutcome, JsonCodec, Message, PlayerId, RoomCode,
        RoomEvent, RoomStatus, RoomView, RoundResult, Side, TaskId, VoteTarget,
    };
    pub use impostor_room::{
        Applied, Created, MemoryStore, RegistryConfig, RoomConfig, RoomError, RoomHandle,
        RoomStore, SessionRegistry, VoteReceipt,
    };
    pub use impostor_rules::TaskGoal;
}
