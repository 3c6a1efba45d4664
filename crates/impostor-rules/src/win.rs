//! Win evaluation.

use impostor_protocol::{EndReason, GameOutcome, PlayerId, Side};

use crate::{Roster, TaskTracker};

/// Decides whether a running game is over.
///
/// Conditions, first match wins:
///
/// 1. the adversary is no longer an alive member (voted out or left) →
///    crew win;
/// 2. the task goal is met → crew win;
/// 3. at most one alive crew member remains → adversary win.
///
/// Returns `None` while the game goes on, and always `None` before roles
/// are assigned. Reads only; the caller applies the outcome.
pub fn evaluate(
    roster: &Roster,
    adversary: Option<PlayerId>,
    tasks: &TaskTracker,
) -> Option<GameOutcome> {
    let adversary = adversary?;

    if !roster.is_alive(adversary) {
        return Some(GameOutcome {
            winner: Some(Side::Crew),
            reason: EndReason::AdversaryEliminated,
        });
    }

    if tasks.is_complete(roster, Some(adversary)) {
        return Some(GameOutcome {
            winner: Some(Side::Crew),
            reason: EndReason::TasksCompleted,
        });
    }

    let alive_crew = roster.alive().filter(|p| p.id != adversary).count();
    if alive_crew <= 1 {
        return Some(GameOutcome {
            winner: Some(Side::Adversary),
            reason: EndReason::AdversaryOutnumbered,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use impostor_protocol::{RoomStatus, TaskId};

    use super::*;
    use crate::{Player, TaskGoal};

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn roster_of(n: u64) -> Roster {
        let mut roster = Roster::with_host(Player::new(pid(1), "p1", "red"), 10);
        for id in 2..=n {
            roster
                .join(Player::new(pid(id), "p", "red"), RoomStatus::Waiting)
                .unwrap();
        }
        roster
    }

    fn tracker(total: u32) -> TaskTracker {
        TaskTracker::new(TaskGoal::Pooled {
            total_required: total,
        })
    }

    #[test]
    fn test_no_adversary_means_no_outcome() {
        assert_eq!(evaluate(&roster_of(4), None, &tracker(5)), None);
    }

    #[test]
    fn test_game_continues() {
        assert_eq!(evaluate(&roster_of(4), Some(pid(2)), &tracker(5)), None);
    }

    #[test]
    fn test_adversary_eliminated_is_crew_win() {
        let mut roster = roster_of(4);
        roster.mark_eliminated(pid(2)).unwrap();
        let outcome = evaluate(&roster, Some(pid(2)), &tracker(5)).unwrap();
        assert_eq!(outcome.winner, Some(Side::Crew));
        assert_eq!(outcome.reason, EndReason::AdversaryEliminated);
    }

    #[test]
    fn test_adversary_leaving_is_crew_win() {
        let mut roster = roster_of(4);
        roster.leave(pid(2)).unwrap();
        let outcome = evaluate(&roster, Some(pid(2)), &tracker(5)).unwrap();
        assert_eq!(outcome.reason, EndReason::AdversaryEliminated);
    }

    #[test]
    fn test_tasks_complete_is_crew_win() {
        let roster = roster_of(4);
        let mut tasks = tracker(3);
        for id in [1, 3, 4] {
            tasks.record_completion(pid(id), TaskId::from("t")).unwrap();
        }
        let outcome = evaluate(&roster, Some(pid(2)), &tasks).unwrap();
        assert_eq!(outcome.winner, Some(Side::Crew));
        assert_eq!(outcome.reason, EndReason::TasksCompleted);
    }

    #[test]
    fn test_one_crew_left_is_adversary_win() {
        let mut roster = roster_of(4);
        roster.mark_eliminated(pid(1)).unwrap();
        roster.mark_eliminated(pid(3)).unwrap();
        let outcome = evaluate(&roster, Some(pid(2)), &tracker(5)).unwrap();
        assert_eq!(outcome.winner, Some(Side::Adversary));
        assert_eq!(outcome.reason, EndReason::AdversaryOutnumbered);
    }

    #[test]
    fn test_adversary_eliminated_beats_outnumbered() {
        // Both conditions hold; priority picks the crew win.
        let mut roster = roster_of(3);
        roster.mark_eliminated(pid(1)).unwrap();
        roster.mark_eliminated(pid(3)).unwrap();
        let outcome = evaluate(&roster, Some(pid(3)), &tracker(5)).unwrap();
        assert_eq!(outcome.reason, EndReason::AdversaryEliminated);
    }

    #[test]
    fn test_tasks_beat_outnumbered() {
        let mut roster = roster_of(3);
        roster.mark_eliminated(pid(3)).unwrap();
        let mut tasks = tracker(1);
        tasks.record_completion(pid(1), TaskId::from("t")).unwrap();
        let outcome = evaluate(&roster, Some(pid(2)), &tasks).unwrap();
        assert_eq!(outcome.reason, EndReason::TasksCompleted);
    }
}
