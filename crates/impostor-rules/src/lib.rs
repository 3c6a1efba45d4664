//! Game rules for Impostor.
//!
//! Everything in this crate is synchronous and owns no tasks, channels or
//! locks. The room coordinator (in `impostor-room`) holds one of each of
//! these per room and calls them while it has exclusive access to that
//! room, so none of them needs to worry about concurrency.
//!
//! # Key types
//!
//! - [`CodeGenerator`] / [`AlphaCodes`]: random six-letter room codes
//! - [`Roster`]: who is in the room, who is alive, who hosts
//! - [`RoleAssigner`]: picks the adversary exactly once per game
//! - [`VotingMachine`]: one accusation round at a time
//! - [`TaskTracker`]: distinct task completions and the crew's task goal
//! - [`evaluate`]: decides whether the game is over and who won

mod code;
mod error;
mod roles;
mod roster;
mod tasks;
mod voting;
mod win;

pub use code::{AlphaCodes, CodeGenerator};
pub use error::RulesError;
pub use roles::{MIN_PLAYERS, RoleAssigner};
pub use roster::{Departure, Player, Roster};
pub use tasks::{TaskGoal, TaskRecord, TaskTracker};
pub use voting::{VotePhase, VotingMachine};
pub use win::evaluate;
