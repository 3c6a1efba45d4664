//! Role assignment: who is the adversary.

use impostor_protocol::{PlayerId, Side};
use rand::Rng;

use crate::{Roster, RulesError};

/// Smallest roster that can still hold a meaningful majority vote.
pub const MIN_PLAYERS: usize = 3;

/// Holds the adversary for one game.
///
/// Assignment happens exactly once, at the Waiting → Playing transition.
/// Calling [`assign`](Self::assign) again fails until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct RoleAssigner {
    adversary: Option<PlayerId>,
}

impl RoleAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the adversary uniformly among all current members, host
    /// included.
    ///
    /// The RNG is borrowed rather than created here: callers share one
    /// process-wide source so rooms started back to back don't draw from
    /// freshly (and similarly) seeded generators.
    ///
    /// # Errors
    /// - [`RulesError::InsufficientPlayers`] below [`MIN_PLAYERS`]
    /// - [`RulesError::RoleAlreadyAssigned`] on a second call
    pub fn assign<R: Rng + ?Sized>(
        &mut self,
        roster: &Roster,
        rng: &mut R,
    ) -> Result<PlayerId, RulesError> {
        if self.adversary.is_some() {
            return Err(RulesError::RoleAlreadyAssigned);
        }
        if roster.len() < MIN_PLAYERS {
            return Err(RulesError::InsufficientPlayers {
                have: roster.len(),
                need: MIN_PLAYERS,
            });
        }
        let index = rng.random_range(0..roster.len());
        let chosen = roster.players()[index].id;
        self.adversary = Some(chosen);
        tracing::debug!(players = roster.len(), "adversary assigned");
        Ok(chosen)
    }

    pub fn adversary(&self) -> Option<PlayerId> {
        self.adversary
    }

    /// The side a player is on, or `None` before roles are assigned.
    pub fn side_of(&self, id: PlayerId) -> Option<Side> {
        self.adversary.map(|adversary| {
            if adversary == id {
                Side::Adversary
            } else {
                Side::Crew
            }
        })
    }

    /// Forgets the assignment so a new game can assign again.
    pub fn reset(&mut self) {
        self.adversary = None;
    }
}
