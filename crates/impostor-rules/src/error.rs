//! Error types for the rules layer.

use impostor_protocol::{ErrorKind, PlayerId, RoomStatus};

/// A rule was broken. Nothing was changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    /// The roster is at capacity.
    #[error("room is full ({capacity} players)")]
    RoomFull { capacity: usize },

    /// Joins are only accepted while the room is Waiting.
    #[error("room is not joinable while {0}")]
    RoomNotJoinable(RoomStatus),

    #[error("player {0} is already in the room")]
    AlreadyMember(PlayerId),

    #[error("player {0} is not in the room")]
    NotAMember(PlayerId),

    /// Fewer players than a meaningful majority vote needs.
    #[error("need at least {need} players, have {have}")]
    InsufficientPlayers { have: usize, need: usize },

    /// Roles are assigned once per game; reset the room first.
    #[error("roles have already been assigned")]
    RoleAlreadyAssigned,

    #[error("a vote round is already open")]
    RoundAlreadyOpen,

    #[error("no vote round is open")]
    NoOpenRound,

    /// The vote was meant for a round that has already closed.
    #[error("vote for round {got} but round {current} is open")]
    StaleRound { got: u32, current: u32 },

    /// The vote names a round that has not started.
    #[error("round {got} is out of range (current round is {current})")]
    RoundOutOfRange { got: u32, current: u32 },

    #[error("player {0} has been eliminated and cannot vote")]
    VoterNotAlive(PlayerId),

    #[error("player {voter} already voted in round {round}")]
    DuplicateVote { voter: PlayerId, round: u32 },

    #[error("player {0} is not a valid suspect")]
    InvalidSuspect(PlayerId),

    /// Eliminated players earn no further task credit.
    #[error("player {0} has been eliminated")]
    PlayerNotAlive(PlayerId),

    #[error("invalid task id: {0:?}")]
    InvalidTask(String),
}

impl RulesError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAMember(_) => ErrorKind::NotFound,
            Self::RoomFull { .. }
            | Self::RoomNotJoinable(_)
            | Self::AlreadyMember(_)
            | Self::RoundAlreadyOpen
            | Self::NoOpenRound
            | Self::StaleRound { .. }
            | Self::VoterNotAlive(_)
            | Self::DuplicateVote { .. }
            | Self::PlayerNotAlive(_) => ErrorKind::Conflict,
            Self::RoundOutOfRange { .. }
            | Self::InvalidSuspect(_)
            | Self::InvalidTask(_) => ErrorKind::InvalidInput,
            Self::InsufficientPlayers { .. } | Self::RoleAlreadyAssigned => {
                ErrorKind::PreconditionFailed
            }
        }
    }

    /// A static error code string for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull { .. } => "room_full",
            Self::RoomNotJoinable(_) => "room_not_joinable",
            Self::AlreadyMember(_) => "already_member",
            Self::NotAMember(_) => "not_a_member",
            Self::InsufficientPlayers { .. } => "insufficient_players",
            Self::RoleAlreadyAssigned => "role_already_assigned",
            Self::RoundAlreadyOpen => "round_already_open",
            Self::NoOpenRound => "no_open_round",
            Self::StaleRound { .. } => "stale_round",
            Self::RoundOutOfRange { .. } => "round_out_of_range",
            Self::VoterNotAlive(_) => "voter_not_alive",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::InvalidSuspect(_) => "invalid_suspect",
            Self::PlayerNotAlive(_) => "player_not_alive",
            Self::InvalidTask(_) => "invalid_task",
        }
    }
}
