//! Shared vocabulary for Impostor.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Identity** ([`PlayerId`], [`RoomId`], [`RoomCode`], [`TaskId`]):
//!   who and where.
//! - **Views** ([`RoomView`], [`PlayerView`], [`Message`]): the public
//!   picture of a room that clients are allowed to see.
//! - **Events** ([`RoomEvent`]): what the coordinator broadcasts after a
//!   mutation, carrying enough data to redraw the room.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events and views are
//!   turned into bytes by whatever transport sits on top.
//!
//! # Architecture
//!
//! ```text
//! Room layer (coordinator, registry) → Rules layer (pure game rules)
//!            ↘                          ↙
//!               Protocol (this crate)
//! ```
//!
//! Nothing here knows about rooms running or players connecting; it only
//! describes the data.

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{ErrorKind, ProtocolError};
pub use event::RoomEvent;
pub use types::{
    EndReason, GameOutcome, Message, MessageId, PlayerId, PlayerView, RoomCode,
    RoomId, RoomStatus, RoomView, RoundResult, Side, TaskId, TaskProgress,
    VoteTarget, VotingView,
};
