//! Error types for the protocol layer.

/// Errors that can occur while parsing identifiers or encoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room code was not exactly six ASCII letters.
    ///
    /// Codes come from people typing them on phones, so lower case and
    /// surrounding whitespace are tolerated; anything else is rejected
    /// here rather than turning into a confusing "room not found" later.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// An identifier or payload field was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProtocolError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "json")]
            Self::Encode(_) => ErrorKind::Internal,
            #[cfg(feature = "json")]
            Self::Decode(_) => ErrorKind::InvalidInput,
            Self::InvalidRoomCode(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Transport-neutral classification of every error in the workspace.
///
/// Each crate keeps its own specific error enum; `kind()` on any of them
/// maps into this set so a transport layer can pick a status code (or a
/// retry policy) without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Room, player or code unknown.
    NotFound,
    /// The request clashes with current state: room full, duplicate or
    /// stale vote, room not joinable.
    Conflict,
    /// Malformed identifiers, out-of-range rounds, bad chat content.
    InvalidInput,
    /// Not enough players to start, role already assigned, not the host.
    PreconditionFailed,
    /// Room code generation ran out of attempts.
    ResourceExhausted,
    /// The room is busy or gone, or the store failed transiently.
    Unavailable,
    /// An invariant was violated; the room has been stopped.
    Internal,
}

impl ErrorKind {
    /// A static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidInput => "invalid_input",
            Self::PreconditionFailed => "precondition_failed",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
