//! Error types for the room layer.

use impostor_protocol::{ErrorKind, PlayerId, RoomCode, RoomStatus};
use impostor_rules::RulesError;

use crate::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this code is registered.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The command could not be queued, or was not started, within the
    /// room's command timeout. It was not applied.
    #[error("room {0} is busy")]
    Busy(RoomCode),

    /// The command was started but its reply did not arrive in time. It
    /// was applied in full or not at all; read the room to find out.
    #[error("room {0} timed out")]
    TimedOut(RoomCode),

    /// The room's coordinator has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// Every generated code was already taken.
    #[error("no free room code after {0} attempts")]
    CodeExhausted(u32),

    /// Only the host may do this.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    /// The room's status does not allow this operation.
    #[error("cannot {action} while the room is {status}")]
    InvalidState {
        action: &'static str,
        status: RoomStatus,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A game rule rejected the operation.
    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The room's state broke an invariant. The room has been ended.
    #[error("room {code} aborted: {detail}")]
    Internal { code: RoomCode, detail: String },
}

impl RoomError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Busy(_) | Self::TimedOut(_) | Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::CodeExhausted(_) => ErrorKind::ResourceExhausted,
            Self::NotHost(_) => ErrorKind::PreconditionFailed,
            Self::InvalidState { .. } => ErrorKind::Conflict,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Rules(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// A static error code string for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "room_not_found",
            Self::Busy(_) => "room_busy",
            Self::TimedOut(_) => "room_timed_out",
            Self::Unavailable(_) => "room_unavailable",
            Self::CodeExhausted(_) => "code_exhausted",
            Self::NotHost(_) => "not_host",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidInput(_) => "invalid_input",
            Self::Rules(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::parse("QWERTY").unwrap()
    }

    #[test]
    fn test_kinds() {
        assert_eq!(RoomError::NotFound(code()).kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::Busy(code()).kind(), ErrorKind::Unavailable);
        assert_eq!(RoomError::TimedOut(code()).kind(), ErrorKind::Unavailable);
        assert_eq!(RoomError::CodeExhausted(32).kind(), ErrorKind::ResourceExhausted);
        assert_eq!(RoomError::NotHost(PlayerId(1)).kind(), ErrorKind::PreconditionFailed);
        assert_eq!(
            RoomError::InvalidState {
                action: "start",
                status: RoomStatus::Playing
            }
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_wrapped_errors_keep_their_kind() {
        let rules: RoomError = RulesError::RoomFull { capacity: 10 }.into();
        assert_eq!(rules.kind(), ErrorKind::Conflict);
        assert_eq!(rules.code(), "room_full");

        let store: RoomError = StoreError::Unavailable("down".into()).into();
        assert_eq!(store.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_display() {
        let err = RoomError::InvalidState {
            action: "call a meeting",
            status: RoomStatus::Waiting,
        };
        assert_eq!(err.to_string(), "cannot call a meeting while the room is Waiting");
    }

    #[test]
    fn test_busy_and_timed_out_have_distinct_codes() {
        assert_eq!(RoomError::Busy(code()).code(), "room_busy");
        assert_eq!(RoomError::TimedOut(code()).code(), "room_timed_out");
        assert_eq!(RoomError::TimedOut(code()).to_string(), "room QWERTY timed out");
    }
}
