//! Unified error type for the Impostor crates.

use impostor_protocol::{ErrorKind, ProtocolError};
use impostor_room::{RoomError, StoreError};
use impostor_rules::RulesError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `impostor` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. The
/// `#[from]` attribute on each variant auto-generates `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ImpostorError {
    /// A malformed room code or payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game rule rejected the operation.
    #[error(transparent)]
    Rules(#[from] RulesError),

    /// A room-level error (not found, busy, invalid state).
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ImpostorError {
    /// Classifies this error. Configuration problems count as
    /// `InvalidInput`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(e) => e.kind(),
            Self::Rules(e) => e.kind(),
            Self::Room(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Config(_) => ErrorKind::InvalidInput,
        }
    }
}
