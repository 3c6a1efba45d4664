//! Core types shared by every Impostor layer.
//!
//! Everything here is plain data: identifiers, the room status machine,
//! and the public views handed to clients. None of these types can change
//! a room; only the coordinator in `impostor-room` does that.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity, assigned by the store when the player is created.
///
/// Identities are room-scoped: the same person joining a second room gets
/// a fresh `PlayerId`. Serialized as a plain number (`#[serde(transparent)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A room's opaque identity, assigned by the store.
///
/// Distinct from [`RoomCode`]: the code is what people type, the id is
/// what the store keys rows by. Codes are recycled after eviction, ids never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A chat message's identity, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

/// Client-chosen identifier of a task ("fix-wiring", "scan-card", ...).
///
/// Only distinctness matters: completing the same `TaskId` twice counts once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// The six-letter code players type to find a room, e.g. `"KQZRTA"`.
///
/// The inner string is private so every `RoomCode` in the system is known
/// to be exactly [`RoomCode::LEN`] upper-case ASCII letters. Construct one
/// with [`RoomCode::parse`] (user input) or [`RoomCode::from_indices`]
/// (generators).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of letters in a code.
    pub const LEN: usize = 6;

    /// The alphabet codes are drawn from.
    pub const ALPHABET: &'static [u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Parses user input into a code.
    ///
    /// Leading/trailing whitespace is ignored and lower case is accepted,
    /// since people read codes aloud and type them on phones.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidRoomCode`] unless the trimmed input is
    /// exactly six ASCII letters.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        if trimmed.len() != Self::LEN
            || !trimmed.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Err(ProtocolError::InvalidRoomCode(input.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Builds a code from six alphabet indices. Indices wrap modulo 26,
    /// so this never fails.
    pub fn from_indices(indices: [usize; Self::LEN]) -> Self {
        let code = indices
            .iter()
            .map(|i| Self::ALPHABET[i % Self::ALPHABET.len()] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
///            start            call_meeting
/// Waiting ─────────→ Playing ─────────────→ Discussing
///    │                 ↑  │                     │
///    │                 │  └──────→ Ended ←──────┤
///    │                 └──── round resolved ────┘
///    └──(everyone left)──→ Ended ──(reset)──→ Waiting
/// ```
///
/// - **Waiting**: lobby; players may join, the host may start.
/// - **Playing**: task phase; tasks count, anyone alive may call a meeting.
/// - **Discussing**: a vote round is open.
/// - **Ended**: someone won, the room was abandoned, or it was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Discussing,
    Ended,
}

impl RoomStatus {
    /// Returns `true` if new players may join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` while a game is running (roles assigned, not ended).
    pub fn is_in_game(&self) -> bool {
        matches!(self, Self::Playing | Self::Discussing)
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    ///
    /// `Ended → Waiting` is only taken by an explicit room reset.
    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomStatus::*;
        matches!(
            (self, target),
            (Waiting, Playing)
                | (Waiting, Ended)
                | (Playing, Discussing)
                | (Playing, Ended)
                | (Discussing, Playing)
                | (Discussing, Ended)
                | (Ended, Waiting)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Playing => write!(f, "Playing"),
            Self::Discussing => write!(f, "Discussing"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sides and outcomes
// ---------------------------------------------------------------------------

/// Which team a player is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The majority, trying to finish tasks or vote out the adversary.
    Crew,
    /// The single hidden player working against the crew.
    Adversary,
}

/// Why a room reached `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// The adversary was voted out or left the room.
    AdversaryEliminated,
    /// The crew met the task goal.
    TasksCompleted,
    /// At most one crew member is still alive.
    AdversaryOutnumbered,
    /// Every player left.
    Abandoned,
    /// The room was closed explicitly.
    Closed,
    /// An internal invariant check failed and the room was stopped.
    Aborted,
}

/// The final result of a game. `winner` is `None` when the room ended
/// without a game being decided (abandoned, closed, aborted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub winner: Option<Side>,
    pub reason: EndReason,
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

/// What a vote points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteTarget {
    /// Accuse a specific player.
    Player(PlayerId),
    /// Abstain ("skip vote").
    Skip,
}

/// The tally of one closed vote round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    /// Votes per accused player, highest first (ties ordered by id).
    pub counts: Vec<(PlayerId, u32)>,
    /// Skips, plus votes against players who are no longer alive.
    pub abstentions: u32,
    /// `None` on a tie or when abstentions win (no-confidence).
    pub eliminated: Option<PlayerId>,
}

/// Public progress of the open vote round. Never reveals who voted for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingView {
    pub round: u32,
    pub voted: Vec<PlayerId>,
    pub votes_needed: usize,
}

/// Crew progress towards the task goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub completed: u32,
    pub required: u32,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One roster entry as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub alive: bool,
    pub tasks_completed: u32,
    pub is_host: bool,
}

/// The public state of a room.
///
/// `adversary` stays `None` until the room has ended; the role holder is
/// only ever revealed privately through a role query before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host: Option<PlayerId>,
    /// In join order.
    pub players: Vec<PlayerView>,
    /// The current (or most recent) round number; 0 before any meeting.
    pub round: u32,
    pub voting: Option<VotingView>,
    pub tasks: TaskProgress,
    pub last_result: Option<RoundResult>,
    pub outcome: Option<GameOutcome>,
    pub adversary: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

impl RoomView {
    /// Looks up a player in the view.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Number of players still alive.
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat message. `seq` is assigned by the store at write time and is the
/// only ordering that matters; `sent_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room: RoomId,
    pub author: PlayerId,
    pub content: String,
    pub seq: u64,
    pub sent_at: DateTime<Utc>,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
        assert_eq!(RoomId(3).to_string(), "R-3");
    }

    #[test]
    fn test_room_code_parse_normalizes_case_and_whitespace() {
        let code = RoomCode::parse("  abcdef ").unwrap();
        assert_eq!(code.as_str(), "ABCDEF");
    }

    #[test]
    fn test_room_code_parse_rejects_bad_input() {
        for bad in ["", "ABCDE", "ABCDEFG", "ABC1EF", "ÄBCDEF", "AB DEF"] {
            assert!(RoomCode::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_room_code_from_indices_wraps() {
        let code = RoomCode::from_indices([0, 1, 2, 25, 26, 27]);
        assert_eq!(code.as_str(), "ABCZAB");
    }

    #[test]
    fn test_room_code_serializes_as_string() {
        let code = RoomCode::parse("ZZTOPS").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"ZZTOPS\"");
        let back: RoomCode = serde_json::from_str("\"zztops\"").unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn test_room_status_transitions() {
        use RoomStatus::*;
        assert!(Waiting.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Discussing));
        assert!(Discussing.can_transition_to(Playing));
        assert!(Discussing.can_transition_to(Ended));
        assert!(Ended.can_transition_to(Waiting));

        assert!(!Waiting.can_transition_to(Discussing));
        assert!(!Ended.can_transition_to(Playing));
        assert!(!Discussing.can_transition_to(Waiting));
        assert!(!Playing.can_transition_to(Waiting));
    }

    #[test]
    fn test_room_status_predicates() {
        assert!(RoomStatus::Waiting.is_joinable());
        assert!(!RoomStatus::Playing.is_joinable());
        assert!(RoomStatus::Playing.is_in_game());
        assert!(RoomStatus::Discussing.is_in_game());
        assert!(!RoomStatus::Ended.is_in_game());
        assert!(!RoomStatus::Waiting.is_in_game());
    }

    #[test]
    fn test_vote_target_json_shape() {
        let json = serde_json::to_value(VoteTarget::Player(PlayerId(4))).unwrap();
        assert_eq!(json["Player"], 4);
        let json = serde_json::to_value(VoteTarget::Skip).unwrap();
        assert_eq!(json, "Skip");
    }
}
