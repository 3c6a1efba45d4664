//! The accusation-vote state machine.
//!
//! ```text
//!   Idle ──open_round()──→ Collecting ──resolve()──→ Resolved ──finish()──→ Idle
//!                              │
//!                              └──────────cancel()─────────────────────────→ Idle
//! ```
//!
//! One round is open at a time. Round numbers only ever go up, and every
//! vote carries the round it was meant for, so a client that missed a
//! round boundary cannot have its late vote counted in the next round.

use std::collections::HashMap;

use impostor_protocol::{PlayerId, RoundResult, VoteTarget, VotingView};

use crate::{Roster, RulesError};

/// Where the machine is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    /// No round open.
    Idle,
    /// A round is open and accepting votes.
    Collecting,
    /// The round has been tallied; the result is available until `finish`.
    Resolved,
}

/// Vote collection and tallying for one room.
#[derive(Debug, Clone)]
pub struct VotingMachine {
    phase: VotePhase,
    round: u32,
    /// Votes of the open round, in the order they were cast.
    votes: Vec<(PlayerId, VoteTarget)>,
    last_result: Option<RoundResult>,
}

impl Default for VotingMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VotingMachine {
    pub fn new() -> Self {
        Self {
            phase: VotePhase::Idle,
            round: 0,
            votes: Vec::new(),
            last_result: None,
        }
    }

    /// Opens the next round and returns its number (the first is 1).
    ///
    /// # Errors
    /// [`RulesError::RoundAlreadyOpen`] unless the machine is Idle.
    pub fn open_round(&mut self) -> Result<u32, RulesError> {
        if self.phase != VotePhase::Idle {
            return Err(RulesError::RoundAlreadyOpen);
        }
        self.round += 1;
        self.votes.clear();
        self.phase = VotePhase::Collecting;
        Ok(self.round)
    }

    /// Records a vote. Returns `true` once every alive member has voted.
    ///
    /// Checks, in order: a round is open; `round` is the open round (older
    /// is stale, newer or zero is out of range); the voter is an alive
    /// member who has not voted yet; the suspect (if any) is a member.
    ///
    /// Voting for a member who is already eliminated is accepted but
    /// counts as an abstention in the tally.
    pub fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
        roster: &Roster,
    ) -> Result<bool, RulesError> {
        if self.phase != VotePhase::Collecting {
            return Err(RulesError::NoOpenRound);
        }
        if round < self.round && round > 0 {
            return Err(RulesError::StaleRound {
                got: round,
                current: self.round,
            });
        }
        if round != self.round {
            return Err(RulesError::RoundOutOfRange {
                got: round,
                current: self.round,
            });
        }
        let member = roster.get(voter).ok_or(RulesError::NotAMember(voter))?;
        if !member.alive {
            return Err(RulesError::VoterNotAlive(voter));
        }
        if self.votes.iter().any(|(v, _)| *v == voter) {
            return Err(RulesError::DuplicateVote {
                voter,
                round: self.round,
            });
        }
        if let VoteTarget::Player(suspect) = target {
            if !roster.contains(suspect) {
                return Err(RulesError::InvalidSuspect(suspect));
            }
        }

        self.votes.push((voter, target));
        Ok(self.has_quorum(roster))
    }

    /// Votes that currently count: cast by members who are still alive.
    fn counted(&self, roster: &Roster) -> impl Iterator<Item = &(PlayerId, VoteTarget)> {
        self.votes.iter().filter(|(voter, _)| roster.is_alive(*voter))
    }

    /// `true` when a round is open and every alive member has a counted vote.
    pub fn has_quorum(&self, roster: &Roster) -> bool {
        let needed = roster.alive_count();
        self.phase == VotePhase::Collecting
            && needed > 0
            && self.counted(roster).count() >= needed
    }

    /// Counts the open round's votes without changing anything.
    ///
    /// A suspect is eliminated only with strictly more votes than every
    /// other suspect *and* than the abstentions. Any tie at the top is a
    /// no-confidence outcome.
    pub fn tally(&self, roster: &Roster) -> RoundResult {
        let mut per_suspect: HashMap<PlayerId, u32> = HashMap::new();
        let mut abstentions = 0u32;

        for (_, target) in self.counted(roster) {
            match target {
                VoteTarget::Player(suspect) if roster.is_alive(*suspect) => {
                    *per_suspect.entry(*suspect).or_default() += 1;
                }
                _ => abstentions += 1,
            }
        }

        let mut counts: Vec<(PlayerId, u32)> = per_suspect.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let eliminated = match counts.as_slice() {
            [(top, n), rest @ ..] => {
                let clear_lead = rest.first().is_none_or(|(_, second)| n > second);
                (clear_lead && *n > abstentions).then_some(*top)
            }
            [] => None,
        };

        RoundResult {
            round: self.round,
            counts,
            abstentions,
            eliminated,
        }
    }

    /// Closes the open round and tallies it. Runs once per round.
    ///
    /// # Errors
    /// [`RulesError::NoOpenRound`] unless a round is collecting.
    pub fn resolve(&mut self, roster: &Roster) -> Result<RoundResult, RulesError> {
        if self.phase != VotePhase::Collecting {
            return Err(RulesError::NoOpenRound);
        }
        let result = self.tally(roster);
        self.phase = VotePhase::Resolved;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Returns from Resolved to Idle, discarding the round's votes.
    pub fn finish(&mut self) {
        if self.phase == VotePhase::Resolved {
            self.votes.clear();
            self.phase = VotePhase::Idle;
        }
    }

    /// Abandons an open round without a tally (the game ended mid-round).
    pub fn cancel(&mut self) {
        self.votes.clear();
        self.phase = VotePhase::Idle;
    }

    pub fn phase(&self) -> VotePhase {
        self.phase
    }

    pub fn is_collecting(&self) -> bool {
        self.phase == VotePhase::Collecting
    }

    /// The open round, or the most recent one. 0 before the first meeting.
    pub fn current_round(&self) -> u32 {
        self.round
    }

    pub fn last_result(&self) -> Option<&RoundResult> {
        self.last_result.as_ref()
    }

    /// Public progress of the open round, if any.
    pub fn view(&self, roster: &Roster) -> Option<VotingView> {
        if self.phase != VotePhase::Collecting {
            return None;
        }
        Some(VotingView {
            round: self.round,
            voted: self.counted(roster).map(|(voter, _)| *voter).collect(),
            votes_needed: roster.alive_count(),
        })
    }

    /// Number of counted votes in the open round.
    pub fn votes_cast(&self, roster: &Roster) -> usize {
        self.counted(roster).count()
    }

    /// Drops the last result ahead of a new game. The round counter is
    /// kept so round numbers keep increasing for the room's whole life.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_result = None;
    }
}

#[cfg(test)]
mod tests {
    use impostor_protocol::RoomStatus;

    use super::*;
    use crate::Player;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn roster_of(n: u64) -> Roster {
        let mut roster = Roster::with_host(Player::new(pid(1), "p1", "red"), 10);
        for id in 2..=n {
            roster
                .join(Player::new(pid(id), format!("p{id}"), "red"), RoomStatus::Waiting)
                .unwrap();
        }
        roster
    }

    fn accuse(id: u64) -> VoteTarget {
        VoteTarget::Player(pid(id))
    }

    // =====================================================================
    // open_round()
    // =====================================================================

    #[test]
    fn test_rounds_start_at_one_and_increase() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        assert_eq!(voting.current_round(), 0);
        assert_eq!(voting.open_round().unwrap(), 1);
        voting.resolve(&roster).unwrap();
        voting.finish();
        assert_eq!(voting.open_round().unwrap(), 2);
    }

    #[test]
    fn test_open_round_twice_fails() {
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        assert_eq!(voting.open_round().unwrap_err(), RulesError::RoundAlreadyOpen);
    }

    // =====================================================================
    // cast_vote()
    // =====================================================================

    #[test]
    fn test_vote_without_open_round_fails() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        assert_eq!(
            voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap_err(),
            RulesError::NoOpenRound
        );
    }

    #[test]
    fn test_stale_round_vote_fails() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.resolve(&roster).unwrap();
        voting.finish();
        voting.open_round().unwrap();

        let err = voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap_err();
        assert_eq!(err, RulesError::StaleRound { got: 1, current: 2 });
    }

    #[test]
    fn test_future_or_zero_round_is_out_of_range() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        for round in [0, 2, 99] {
            let err = voting.cast_vote(pid(1), accuse(2), round, &roster).unwrap_err();
            assert_eq!(err, RulesError::RoundOutOfRange { got: round, current: 1 });
        }
    }

    #[test]
    fn test_eliminated_voter_rejected() {
        let mut roster = roster_of(4);
        roster.mark_eliminated(pid(3)).unwrap();
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        assert_eq!(
            voting.cast_vote(pid(3), accuse(1), 1, &roster).unwrap_err(),
            RulesError::VoterNotAlive(pid(3))
        );
    }

    #[test]
    fn test_duplicate_vote_rejected() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap();
        assert_eq!(
            voting.cast_vote(pid(1), VoteTarget::Skip, 1, &roster).unwrap_err(),
            RulesError::DuplicateVote { voter: pid(1), round: 1 }
        );
        assert_eq!(voting.votes_cast(&roster), 1);
    }

    #[test]
    fn test_unknown_suspect_rejected() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        assert_eq!(
            voting.cast_vote(pid(1), accuse(77), 1, &roster).unwrap_err(),
            RulesError::InvalidSuspect(pid(77))
        );
    }

    #[test]
    fn test_non_member_voter_rejected() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        assert_eq!(
            voting.cast_vote(pid(9), accuse(1), 1, &roster).unwrap_err(),
            RulesError::NotAMember(pid(9))
        );
    }

    #[test]
    fn test_quorum_reached_on_last_alive_vote() {
        let mut roster = roster_of(4);
        roster.mark_eliminated(pid(4)).unwrap();
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        assert!(!voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap());
        assert!(!voting.cast_vote(pid(2), accuse(3), 1, &roster).unwrap());
        assert!(voting.cast_vote(pid(3), VoteTarget::Skip, 1, &roster).unwrap());
    }

    #[test]
    fn test_quorum_after_voter_leaves() {
        let mut roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap();
        voting.cast_vote(pid(2), accuse(1), 1, &roster).unwrap();
        assert!(!voting.has_quorum(&roster));

        roster.leave(pid(3)).unwrap();
        assert!(voting.has_quorum(&roster));
    }

    // =====================================================================
    // tally()
    // =====================================================================

    #[test]
    fn test_tally_clear_majority_eliminates() {
        let roster = roster_of(4);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        for voter in 1..=4 {
            voting.cast_vote(pid(voter), accuse(2), 1, &roster).unwrap();
        }
        let result = voting.resolve(&roster).unwrap();
        assert_eq!(result.eliminated, Some(pid(2)));
        assert_eq!(result.counts, vec![(pid(2), 4)]);
        assert_eq!(result.abstentions, 0);
    }

    #[test]
    fn test_tally_two_two_tie_is_no_confidence() {
        let roster = roster_of(5);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap();
        voting.cast_vote(pid(3), accuse(2), 1, &roster).unwrap();
        voting.cast_vote(pid(2), accuse(4), 1, &roster).unwrap();
        voting.cast_vote(pid(5), accuse(4), 1, &roster).unwrap();

        let result = voting.tally(&roster);
        assert_eq!(result.eliminated, None);
        assert_eq!(result.counts, vec![(pid(2), 2), (pid(4), 2)]);
    }

    #[test]
    fn test_tally_skip_plurality_is_no_confidence() {
        let roster = roster_of(5);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), VoteTarget::Skip, 1, &roster).unwrap();
        voting.cast_vote(pid(2), VoteTarget::Skip, 1, &roster).unwrap();
        voting.cast_vote(pid(3), VoteTarget::Skip, 1, &roster).unwrap();
        voting.cast_vote(pid(4), accuse(5), 1, &roster).unwrap();
        voting.cast_vote(pid(5), accuse(4), 1, &roster).unwrap();

        let result = voting.tally(&roster);
        assert_eq!(result.abstentions, 3);
        assert_eq!(result.eliminated, None);
    }

    #[test]
    fn test_tally_tie_with_skips_is_no_confidence() {
        let roster = roster_of(4);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(3), 1, &roster).unwrap();
        voting.cast_vote(pid(2), accuse(3), 1, &roster).unwrap();
        voting.cast_vote(pid(3), VoteTarget::Skip, 1, &roster).unwrap();
        voting.cast_vote(pid(4), VoteTarget::Skip, 1, &roster).unwrap();

        assert_eq!(voting.tally(&roster).eliminated, None);
    }

    #[test]
    fn test_tally_votes_for_eliminated_count_as_abstentions() {
        let mut roster = roster_of(5);
        roster.mark_eliminated(pid(5)).unwrap();
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(5), 1, &roster).unwrap();
        voting.cast_vote(pid(2), accuse(5), 1, &roster).unwrap();
        voting.cast_vote(pid(3), accuse(4), 1, &roster).unwrap();

        let result = voting.tally(&roster);
        assert_eq!(result.abstentions, 2);
        assert_eq!(result.counts, vec![(pid(4), 1)]);
        assert_eq!(result.eliminated, None);
    }

    #[test]
    fn test_tally_ignores_votes_of_departed_players() {
        let mut roster = roster_of(4);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(4), accuse(1), 1, &roster).unwrap();
        voting.cast_vote(pid(2), accuse(3), 1, &roster).unwrap();
        roster.leave(pid(4)).unwrap();

        let result = voting.tally(&roster);
        assert_eq!(result.counts, vec![(pid(3), 1)]);
        assert_eq!(result.eliminated, Some(pid(3)));
    }

    #[test]
    fn test_empty_round_eliminates_nobody() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        let result = voting.resolve(&roster).unwrap();
        assert_eq!(result.eliminated, None);
        assert!(result.counts.is_empty());
    }

    // =====================================================================
    // resolve() / finish() / cancel()
    // =====================================================================

    #[test]
    fn test_resolve_runs_once() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.resolve(&roster).unwrap();
        assert_eq!(voting.phase(), VotePhase::Resolved);
        assert_eq!(voting.resolve(&roster).unwrap_err(), RulesError::NoOpenRound);
        voting.finish();
        assert_eq!(voting.phase(), VotePhase::Idle);
        assert!(voting.last_result().is_some());
    }

    #[test]
    fn test_votes_from_prior_round_do_not_carry_over() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cast_vote(pid(1), accuse(2), 1, &roster).unwrap();
        voting.resolve(&roster).unwrap();
        voting.finish();

        voting.open_round().unwrap();
        assert_eq!(voting.votes_cast(&roster), 0);
        // The same voter may vote again in the new round.
        voting.cast_vote(pid(1), accuse(3), 2, &roster).unwrap();
    }

    #[test]
    fn test_cancel_returns_to_idle_and_keeps_round() {
        let mut voting = VotingMachine::new();
        voting.open_round().unwrap();
        voting.cancel();
        assert_eq!(voting.phase(), VotePhase::Idle);
        assert_eq!(voting.current_round(), 1);
        assert_eq!(voting.open_round().unwrap(), 2);
    }

    #[test]
    fn test_view_hides_targets() {
        let roster = roster_of(3);
        let mut voting = VotingMachine::new();
        assert!(voting.view(&roster).is_none());
        voting.open_round().unwrap();
        voting.cast_vote(pid(2), accuse(1), 1, &roster).unwrap();
        let view = voting.view(&roster).unwrap();
        assert_eq!(view.round, 1);
        assert_eq!(view.voted, vec![pid(2)]);
        assert_eq!(view.votes_needed, 3);
    }
}
