//! Room events: what the coordinator broadcasts after it changes a room.

use serde::{Deserialize, Serialize};

use crate::{
    GameOutcome, Message, PlayerId, PlayerView, RoomCode, RoomView, RoundResult,
    TaskProgress,
};

/// A room-wide notification.
///
/// Every coordinator operation that changes what players can see returns
/// the events it produced and publishes them on the room's broadcast
/// channel. Events that change the roster or the status carry a fresh
/// [`RoomView`], so a client can redraw from the event alone.
///
/// Internally tagged JSON: `{ "type": "VoteCast", "voter": 3, ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    PlayerJoined {
        player: PlayerView,
        view: RoomView,
    },

    PlayerLeft {
        player: PlayerId,
        view: RoomView,
    },

    /// Host privilege moved because the previous host left.
    HostChanged {
        host: PlayerId,
    },

    /// Roles were assigned. The view does not reveal the adversary.
    GameStarted {
        view: RoomView,
    },

    /// A vote round opened.
    MeetingCalled {
        caller: PlayerId,
        round: u32,
    },

    /// Someone voted. Who they voted for stays secret until the tally.
    VoteCast {
        voter: PlayerId,
        round: u32,
        votes_cast: usize,
        votes_needed: usize,
    },

    RoundResolved {
        result: RoundResult,
        view: RoomView,
    },

    PlayerEliminated {
        player: PlayerId,
        round: u32,
    },

    TaskCompleted {
        player: PlayerId,
        progress: TaskProgress,
    },

    /// The game is over. `adversary` is revealed here.
    GameEnded {
        outcome: GameOutcome,
        adversary: Option<PlayerId>,
        view: RoomView,
    },

    MessagePosted {
        message: Message,
    },

    /// The host reset an ended room back to the lobby.
    RoomReset {
        view: RoomView,
    },

    /// The room was evicted from the registry; no more events follow.
    RoomClosed {
        code: RoomCode,
    },
}

impl RoomEvent {
    /// A short, stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::HostChanged { .. } => "host_changed",
            Self::GameStarted { .. } => "game_started",
            Self::MeetingCalled { .. } => "meeting_called",
            Self::VoteCast { .. } => "vote_cast",
            Self::RoundResolved { .. } => "round_resolved",
            Self::PlayerEliminated { .. } => "player_eliminated",
            Self::TaskCompleted { .. } => "task_completed",
            Self::GameEnded { .. } => "game_ended",
            Self::MessagePosted { .. } => "message_posted",
            Self::RoomReset { .. } => "room_reset",
            Self::RoomClosed { .. } => "room_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_cast_is_internally_tagged() {
        let event = RoomEvent::VoteCast {
            voter: PlayerId(2),
            round: 1,
            votes_cast: 3,
            votes_needed: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "VoteCast");
        assert_eq!(json["voter"], 2);
        assert_eq!(json["votes_needed"], 4);
        // The accused player is never part of a VoteCast payload.
        assert!(json.get("target").is_none());
    }

    #[test]
    fn test_event_name() {
        let event = RoomEvent::HostChanged { host: PlayerId(1) };
        assert_eq!(event.name(), "host_changed");
    }
}
