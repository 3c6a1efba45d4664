//! Task tracking and the crew's task goal.

use std::collections::{HashMap, HashSet};

use impostor_protocol::{PlayerId, TaskId, TaskProgress};
use serde::{Deserialize, Serialize};

use crate::{Roster, RulesError};

/// How the crew's task goal is measured.
///
/// In TOML:
///
/// ```toml
/// [room.task_goal]
/// policy = "pooled"
/// total_required = 20
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TaskGoal {
    /// The alive crew's completions are summed and compared to one total.
    Pooled { total_required: u32 },
    /// Every alive crew member must reach the same minimum.
    PerPlayer { required_each: u32 },
}

impl Default for TaskGoal {
    fn default() -> Self {
        Self::Pooled { total_required: 20 }
    }
}

impl TaskGoal {
    /// The configured number: the pooled total, or the per-player minimum.
    pub fn required(&self) -> u32 {
        match *self {
            Self::Pooled { total_required } => total_required,
            Self::PerPlayer { required_each } => required_each,
        }
    }
}

/// Result of recording a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    /// The player's distinct completed tasks after this call.
    pub completed: u32,
    /// `false` if this task had already been recorded for the player.
    pub newly_recorded: bool,
}

/// Distinct completed tasks per player.
///
/// Sets of task ids rather than counters, so a client retrying a request
/// cannot inflate the count.
#[derive(Debug, Clone)]
pub struct TaskTracker {
    goal: TaskGoal,
    done: HashMap<PlayerId, HashSet<TaskId>>,
}

impl TaskTracker {
    pub fn new(goal: TaskGoal) -> Self {
        Self {
            goal,
            done: HashMap::new(),
        }
    }

    /// Records that `player` finished `task`. Repeats are accepted and
    /// change nothing.
    ///
    /// # Errors
    /// [`RulesError::InvalidTask`] for a blank task id.
    pub fn record_completion(
        &mut self,
        player: PlayerId,
        task: TaskId,
    ) -> Result<TaskRecord, RulesError> {
        if task.as_str().trim().is_empty() {
            return Err(RulesError::InvalidTask(task.0));
        }
        let tasks = self.done.entry(player).or_default();
        let newly_recorded = tasks.insert(task);
        Ok(TaskRecord {
            completed: tasks.len() as u32,
            newly_recorded,
        })
    }

    /// `true` if `player` already completed `task`.
    pub fn has_completed(&self, player: PlayerId, task: &TaskId) -> bool {
        self.done.get(&player).is_some_and(|tasks| tasks.contains(task))
    }

    /// Distinct tasks `player` has completed.
    pub fn completed_by(&self, player: PlayerId) -> u32 {
        self.done.get(&player).map_or(0, |tasks| tasks.len() as u32)
    }

    pub fn goal(&self) -> TaskGoal {
        self.goal
    }

    /// See [`TaskGoal::required`].
    pub fn total_required(&self) -> u32 {
        self.goal.required()
    }

    /// Completed counts of the players whose tasks count: alive and not
    /// the adversary.
    fn crew_counts<'a>(
        &'a self,
        roster: &'a Roster,
        adversary: Option<PlayerId>,
    ) -> impl Iterator<Item = u32> + 'a {
        roster
            .alive()
            .filter(move |p| Some(p.id) != adversary)
            .map(move |p| self.completed_by(p.id))
    }

    /// Whether the crew has met the task goal.
    ///
    /// With no alive crew left the goal is never met; that situation is
    /// decided by the other win conditions.
    pub fn is_complete(&self, roster: &Roster, adversary: Option<PlayerId>) -> bool {
        let counts: Vec<u32> = self.crew_counts(roster, adversary).collect();
        if counts.is_empty() {
            return false;
        }
        match self.goal {
            TaskGoal::Pooled { total_required } => counts.iter().sum::<u32>() >= total_required,
            TaskGoal::PerPlayer { required_each } => counts.iter().all(|c| *c >= required_each),
        }
    }

    /// Progress numbers for a progress bar.
    ///
    /// Pooled: summed completions against the total. Per-player: each
    /// crew member's count capped at the minimum, against
    /// crew size × minimum.
    pub fn progress(&self, roster: &Roster, adversary: Option<PlayerId>) -> TaskProgress {
        match self.goal {
            TaskGoal::Pooled { total_required } => TaskProgress {
                completed: self.crew_counts(roster, adversary).sum(),
                required: total_required,
            },
            TaskGoal::PerPlayer { required_each } => {
                let counts: Vec<u32> = self.crew_counts(roster, adversary).collect();
                TaskProgress {
                    completed: counts.iter().map(|c| (*c).min(required_each)).sum(),
                    required: required_each * counts.len() as u32,
                }
            }
        }
    }

    /// Forgets all completions ahead of a new game.
    pub fn clear(&mut self) {
        self.done.clear();
    }
}
