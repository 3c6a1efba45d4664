//! Room coordination for Impostor.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! roster, roles, vote rounds and task progress. Everything outside the
//! task talks to it through a [`RoomHandle`].
//!
//! # Key types
//!
//! - [`SessionRegistry`]: creates rooms, maps codes to handles, evicts
//! - [`RoomHandle`]: send commands to a running room coordinator
//! - [`RoomStore`]: the persistence hook every change is written through
//! - [`MemoryStore`]: in-process store for tests and demos
//! - [`RoomConfig`]: per-room settings (capacity, task goal, timeouts)

mod config;
mod error;
mod registry;
mod room;
mod store;

pub use config::{RegistryConfig, RoomConfig};
pub use error::RoomError;
pub use registry::{Created, SessionRegistry};
pub use room::{
    Applied, Joined, MAX_MESSAGE_LEN, MAX_NAME_LEN, RoomHandle, RoomInfo, SharedRng, VoteReceipt,
};
pub use store::{MemoryStore, RoomStore, StoreError, StoredMember, StoredRoom, StoredVote};
