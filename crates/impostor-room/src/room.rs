//! Room coordinator: an isolated Tokio task that owns one room.
//!
//! Each room runs in its own task and talks to the outside world through
//! a bounded mpsc channel. This is the actor model: no shared mutable
//! state, just message passing. Commands are applied strictly one at a
//! time, in the order they were admitted to the queue, which is all the
//! serialization a room needs.
//!
//! Every mutating command follows the same shape:
//!
//! 1. check the rules against a scratch copy of the affected state;
//! 2. write to the [`RoomStore`];
//! 3. commit the scratch copy to memory;
//! 4. re-check the room's invariants and publish the events.
//!
//! If step 2 fails, memory is untouched and the caller gets the error.
//!
//! Callers never wait unboundedly. A command must get into the queue
//! within the room's command timeout and must be *started* before the same
//! deadline; one that is still queued after it is answered with
//! [`RoomError::Busy`] and never applied. The wait for the reply is bounded
//! too (see [`RoomError::TimedOut`]).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use impostor_protocol::{
    EndReason, GameOutcome, Message, PlayerId, PlayerView, RoomCode, RoomEvent, RoomId,
    RoomStatus, RoomView, RoundResult, Side, TaskId, VoteTarget,
};
use impostor_rules::{
    Player, RoleAssigner, Roster, RulesError, TaskRecord, TaskTracker, VotingMachine, evaluate,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{RoomConfig, RoomError, RoomStore};

/// Longest chat message, in characters, after trimming.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Longest display name, in characters, after trimming.
pub const MAX_NAME_LEN: usize = 32;

/// How long the vote timer waits before retrying a resolution that
/// failed on a store error.
const DEADLINE_RETRY: Duration = Duration::from_secs(1);

/// The random source shared by every room of a registry.
pub type SharedRng = Arc<Mutex<StdRng>>;

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// The result of a mutating command plus the events it produced.
///
/// The same events are published on the room's broadcast channel.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub events: Vec<RoomEvent>,
}

/// Returned by [`RoomHandle::join`].
#[derive(Debug, Clone)]
pub struct Joined {
    pub player: PlayerId,
    pub view: RoomView,
}

/// Returned by [`RoomHandle::cast_vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub round: u32,
    /// Every alive member has now voted.
    pub quorum_reached: bool,
    /// Set when this vote completed the round and the tally went through.
    pub result: Option<RoundResult>,
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub code: RoomCode,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
    /// Time since the last mutating command.
    pub idle: Duration,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<Applied<T>, RoomError>>;

/// Commands sent to a room coordinator through its channel.
///
/// The `oneshot::Sender` in each variant is a reply channel: the caller
/// sends a command and waits for the response on it. A caller that stops
/// waiting does not cancel the command.
pub(crate) enum RoomCommand {
    Join {
        name: String,
        color: String,
        reply: Reply<Joined>,
    },
    Leave {
        player: PlayerId,
        reply: Reply<()>,
    },
    Start {
        requester: PlayerId,
        reply: Reply<RoomView>,
    },
    CallMeeting {
        caller: PlayerId,
        reply: Reply<u32>,
    },
    CastVote {
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
        reply: Reply<VoteReceipt>,
    },
    ResolveRound {
        round: u32,
        reply: Reply<RoundResult>,
    },
    CompleteTask {
        player: PlayerId,
        task: TaskId,
        reply: Reply<TaskRecord>,
    },
    PostMessage {
        author: PlayerId,
        content: String,
        reply: Reply<Message>,
    },
    Reset {
        requester: PlayerId,
        reply: Reply<RoomView>,
    },
    End {
        reply: Reply<GameOutcome>,
    },
    Audit {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Messages {
        reply: oneshot::Sender<Result<Vec<Message>, RoomError>>,
    },
    RoleOf {
        player: PlayerId,
        reply: oneshot::Sender<Result<Option<Side>, RoomError>>,
    },
    View {
        reply: oneshot::Sender<Result<RoomView, RoomError>>,
    },
    Info {
        reply: oneshot::Sender<Result<RoomInfo, RoomError>>,
    },
}

impl RoomCommand {
    /// Answers the command with `err` without applying it.
    fn reject(self, err: RoomError) {
        match self {
            Self::Join { reply, .. } => drop(reply.send(Err(err))),
            Self::Leave { reply, .. } => drop(reply.send(Err(err))),
            Self::Start { reply, .. } => drop(reply.send(Err(err))),
            Self::CallMeeting { reply, .. } => drop(reply.send(Err(err))),
            Self::CastVote { reply, .. } => drop(reply.send(Err(err))),
            Self::ResolveRound { reply, .. } => drop(reply.send(Err(err))),
            Self::CompleteTask { reply, .. } => drop(reply.send(Err(err))),
            Self::PostMessage { reply, .. } => drop(reply.send(Err(err))),
            Self::Reset { reply, .. } => drop(reply.send(Err(err))),
            Self::End { reply } => drop(reply.send(Err(err))),
            Self::Audit { reply } => drop(reply.send(Err(err))),
            Self::Messages { reply } => drop(reply.send(Err(err))),
            Self::RoleOf { reply, .. } => drop(reply.send(Err(err))),
            Self::View { reply } => drop(reply.send(Err(err))),
            Self::Info { reply } => drop(reply.send(Err(err))),
        }
    }
}

/// A command as it sits in the queue.
pub(crate) struct Queued {
    command: RoomCommand,
    /// The coordinator refuses to start the command after this.
    start_by: Instant,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room coordinator.
///
/// Cheap to clone: an `mpsc::Sender`, a `broadcast::Sender`, the close
/// signal and a few ids. The registry holds one per room and hands out
/// clones.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    code: RoomCode,
    sender: mpsc::Sender<Queued>,
    events: broadcast::Sender<RoomEvent>,
    close: Arc<watch::Sender<bool>>,
    command_timeout: Duration,
    reply_timeout: Duration,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// `true` once the coordinator has stopped or been told to.
    pub fn is_closed(&self) -> bool {
        *self.close.borrow() || self.sender.is_closed()
    }

    /// Subscribes to the room's events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Sends a command and waits for its reply.
    ///
    /// The command must be admitted to the queue and started by the
    /// coordinator within the command timeout, or it fails with
    /// [`RoomError::Busy`] and has no effect. The whole call gives up
    /// `reply_timeout` after that deadline with [`RoomError::TimedOut`].
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, RoomError>>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let start_by = Instant::now() + self.command_timeout;
        let queued = Queued {
            command: make(reply_tx),
            start_by,
        };
        match self.sender.send_timeout(queued, self.command_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(RoomError::Busy(self.code.clone())),
            Err(SendTimeoutError::Closed(_)) => {
                return Err(RoomError::Unavailable(self.code.clone()));
            }
        }
        match tokio::time::timeout_at(start_by + self.reply_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RoomError::Unavailable(self.code.clone())),
            Err(_) => Err(RoomError::TimedOut(self.code.clone())),
        }
    }

    /// Adds a new player. Only accepted while the room is Waiting.
    pub async fn join(&self, name: &str, color: &str) -> Result<Applied<Joined>, RoomError> {
        let (name, color) = (name.to_string(), color.to_string());
        self.request(|reply| RoomCommand::Join { name, color, reply }).await
    }

    /// Removes a player. Host privilege moves on if needed; the last
    /// player out ends the room.
    pub async fn leave(&self, player: PlayerId) -> Result<Applied<()>, RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply }).await
    }

    /// Assigns roles and starts the game. Host only.
    pub async fn start(&self, requester: PlayerId) -> Result<Applied<RoomView>, RoomError> {
        self.request(|reply| RoomCommand::Start { requester, reply }).await
    }

    /// Opens a vote round. Returns the round number.
    pub async fn call_meeting(&self, caller: PlayerId) -> Result<Applied<u32>, RoomError> {
        self.request(|reply| RoomCommand::CallMeeting { caller, reply }).await
    }

    /// Casts a vote in `round`. The vote that completes the quorum also
    /// resolves the round.
    pub async fn cast_vote(
        &self,
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
    ) -> Result<Applied<VoteReceipt>, RoomError> {
        self.request(|reply| RoomCommand::CastVote {
            voter,
            target,
            round,
            reply,
        })
        .await
    }

    /// Closes `round` with whatever votes are in, for callers that run
    /// their own discussion timer.
    pub async fn resolve_round(&self, round: u32) -> Result<Applied<RoundResult>, RoomError> {
        self.request(|reply| RoomCommand::ResolveRound { round, reply }).await
    }

    pub async fn complete_task(
        &self,
        player: PlayerId,
        task: TaskId,
    ) -> Result<Applied<TaskRecord>, RoomError> {
        self.request(|reply| RoomCommand::CompleteTask {
            player,
            task,
            reply,
        })
        .await
    }

    pub async fn post_message(
        &self,
        author: PlayerId,
        content: &str,
    ) -> Result<Applied<Message>, RoomError> {
        let content = content.to_string();
        self.request(|reply| RoomCommand::PostMessage {
            author,
            content,
            reply,
        })
        .await
    }

    /// Takes an ended room back to Waiting with the same members. Host
    /// only.
    pub async fn reset(&self, requester: PlayerId) -> Result<Applied<RoomView>, RoomError> {
        self.request(|reply| RoomCommand::Reset { requester, reply }).await
    }

    /// Ends the room without a winner.
    pub async fn end(&self) -> Result<Applied<GameOutcome>, RoomError> {
        self.request(|reply| RoomCommand::End { reply }).await
    }

    /// Re-reads the member list from the store and compares it with
    /// memory. A mismatch ends the room and returns `Internal`.
    pub async fn audit(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Audit { reply }).await
    }

    /// Chat history, oldest first.
    pub async fn messages(&self) -> Result<Vec<Message>, RoomError> {
        self.request(|reply| RoomCommand::Messages { reply }).await
    }

    /// The side `player` is on, or `None` before the game starts. Meant
    /// for the player themselves; room views never reveal it.
    pub async fn role_of(&self, player: PlayerId) -> Result<Option<Side>, RoomError> {
        self.request(|reply| RoomCommand::RoleOf { player, reply }).await
    }

    pub async fn view(&self) -> Result<RoomView, RoomError> {
        self.request(|reply| RoomCommand::View { reply }).await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Tells the coordinator to stop. Never waits.
    ///
    /// The command being applied right now finishes; anything still queued
    /// or sent afterwards fails with [`RoomError::Unavailable`].
    pub fn shutdown(&self) {
        self.close.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Input normalization
// ---------------------------------------------------------------------------

/// Trims a display name and color, rejecting blank or overlong names.
pub(crate) fn normalize_player(name: &str, color: &str) -> Result<(String, String), RoomError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::InvalidInput("player name is empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RoomError::InvalidInput(format!(
            "player name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok((name.to_string(), color.trim().to_string()))
}

fn normalize_message(content: &str) -> Result<&str, RoomError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(RoomError::InvalidInput("message is empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(RoomError::InvalidInput(format!(
            "message is longer than {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(content)
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

enum Wake {
    Command(Option<Queued>),
    Deadline(u32),
    Close,
}

/// The internal coordinator state. Runs inside a Tokio task.
struct RoomActor<S: RoomStore> {
    room_id: RoomId,
    code: RoomCode,
    created_at: DateTime<Utc>,
    config: RoomConfig,
    status: RoomStatus,
    roster: Roster,
    roles: RoleAssigner,
    voting: VotingMachine,
    tasks: TaskTracker,
    outcome: Option<GameOutcome>,
    /// Everyone who has ever been a member.
    seen: HashSet<PlayerId>,
    /// Vote timer: the round it belongs to and when it fires.
    deadline: Option<(u32, Instant)>,
    last_activity: Instant,
    store: Arc<S>,
    rng: Arc<Mutex<StdRng>>,
    events: broadcast::Sender<RoomEvent>,
    receiver: mpsc::Receiver<Queued>,
    close: watch::Receiver<bool>,
}

impl<S: RoomStore> RoomActor<S> {
    /// Runs the coordinator loop until shutdown or until every handle is
    /// dropped.
    async fn run(mut self) {
        info!(room = %self.code, room_id = %self.room_id, "room coordinator started");

        loop {
            let (round, at) = self.deadline.unwrap_or((0, Instant::now()));
            let wake = tokio::select! {
                biased;
                _ = self.close.wait_for(|closed| *closed) => Wake::Close,
                cmd = self.receiver.recv() => Wake::Command(cmd),
                () = tokio::time::sleep_until(at), if self.deadline.is_some() => {
                    Wake::Deadline(round)
                }
            };

            match wake {
                Wake::Command(Some(queued)) => self.handle(queued).await,
                Wake::Command(None) => break,
                Wake::Deadline(round) => self.on_deadline(round).await,
                Wake::Close => {
                    info!(room = %self.code, "room shutting down");
                    self.receiver.close();
                    while let Ok(queued) = self.receiver.try_recv() {
                        queued
                            .command
                            .reject(RoomError::Unavailable(self.code.clone()));
                    }
                    break;
                }
            }
        }

        let _ = self.events.send(RoomEvent::RoomClosed {
            code: self.code.clone(),
        });
        info!(room = %self.code, "room coordinator stopped");
    }

    /// Applies one command, unless it waited in the queue past its start
    /// deadline.
    async fn handle(&mut self, queued: Queued) {
        if Instant::now() > queued.start_by {
            debug!(room = %self.code, "command expired in queue");
            queued.command.reject(RoomError::Busy(self.code.clone()));
            return;
        }
        match queued.command {
            RoomCommand::Join { name, color, reply } => {
                let mut events = Vec::new();
                let result = self.join(name, color, &mut events).await;
                let _ = reply.send(self.finish("join", result, events).await);
            }
            RoomCommand::Leave { player, reply } => {
                let mut events = Vec::new();
                let result = self.leave(player, &mut events).await;
                let _ = reply.send(self.finish("leave", result, events).await);
            }
            RoomCommand::Start { requester, reply } => {
                let mut events = Vec::new();
                let result = self.start(requester, &mut events).await;
                let _ = reply.send(self.finish("start", result, events).await);
            }
            RoomCommand::CallMeeting { caller, reply } => {
                let mut events = Vec::new();
                let result = self.call_meeting(caller, &mut events).await;
                let _ = reply.send(self.finish("call_meeting", result, events).await);
            }
            RoomCommand::CastVote {
                voter,
                target,
                round,
                reply,
            } => {
                let mut events = Vec::new();
                let result = self.cast_vote(voter, target, round, &mut events).await;
                let _ = reply.send(self.finish("cast_vote", result, events).await);
            }
            RoomCommand::ResolveRound { round, reply } => {
                let mut events = Vec::new();
                let result = self.resolve_round(round, &mut events).await;
                let _ = reply.send(self.finish("resolve_round", result, events).await);
            }
            RoomCommand::CompleteTask {
                player,
                task,
                reply,
            } => {
                let mut events = Vec::new();
                let result = self.complete_task(player, task, &mut events).await;
                let _ = reply.send(self.finish("complete_task", result, events).await);
            }
            RoomCommand::PostMessage {
                author,
                content,
                reply,
            } => {
                let mut events = Vec::new();
                let result = self.post_message(author, &content, &mut events).await;
                let _ = reply.send(self.finish("post_message", result, events).await);
            }
            RoomCommand::Reset { requester, reply } => {
                let mut events = Vec::new();
                let result = self.reset(requester, &mut events).await;
                let _ = reply.send(self.finish("reset", result, events).await);
            }
            RoomCommand::End { reply } => {
                let mut events = Vec::new();
                let result = self.end(&mut events).await;
                let _ = reply.send(self.finish("end", result, events).await);
            }
            RoomCommand::Audit { reply } => {
                let mut events = Vec::new();
                let result = self.audit(&mut events).await;
                self.publish(&events);
                let _ = reply.send(result);
            }
            RoomCommand::Messages { reply } => {
                let result = self
                    .store
                    .list_messages(self.room_id)
                    .await
                    .map_err(RoomError::from);
                let _ = reply.send(result);
            }
            RoomCommand::RoleOf { player, reply } => {
                let result: Result<Option<Side>, RoomError> = if self.roster.contains(player) {
                    Ok(self.roles.side_of(player))
                } else {
                    Err(RulesError::NotAMember(player).into())
                };
                let _ = reply.send(result);
            }
            RoomCommand::View { reply } => {
                let _ = reply.send(Ok(self.view()));
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(Ok(self.info()));
            }
        }
    }

    /// Common tail of every mutating command: invariant check, logging,
    /// event publication.
    async fn finish<T>(
        &mut self,
        action: &'static str,
        result: Result<T, RoomError>,
        mut events: Vec<RoomEvent>,
    ) -> Result<Applied<T>, RoomError> {
        self.last_activity = Instant::now();

        let result = match self.check_invariants() {
            Ok(()) => result,
            Err(detail) => Err(self.abort(detail, &mut events).await),
        };
        if let Err(e) = &result {
            debug!(room = %self.code, action, code = e.code(), error = %e, "command rejected");
        }

        self.publish(&events);
        result.map(|value| Applied { value, events })
    }

    fn publish(&self, events: &[RoomEvent]) {
        for event in events {
            // No subscribers is not an error.
            let _ = self.events.send(event.clone());
        }
    }

    // -- commands ------------------------------------------------------------

    async fn join(
        &mut self,
        name: String,
        color: String,
        events: &mut Vec<RoomEvent>,
    ) -> Result<Joined, RoomError> {
        let (name, color) = normalize_player(&name, &color)?;
        self.roster.check_can_join(self.status)?;

        let id = self.store.create_player(&name, &color).await?;
        self.store.add_member(self.room_id, id).await?;

        self.roster.join(Player::new(id, name, color), self.status)?;
        self.seen.insert(id);
        info!(room = %self.code, player = %id, players = self.roster.len(), "player joined");

        let view = self.view();
        if let Some(player) = view.player(id).cloned() {
            events.push(RoomEvent::PlayerJoined {
                player,
                view: view.clone(),
            });
        }
        Ok(Joined { player: id, view })
    }

    async fn leave(&mut self, player: PlayerId, events: &mut Vec<RoomEvent>) -> Result<(), RoomError> {
        let mut roster = self.roster.clone();
        let departure = roster.leave(player)?;

        self.store.remove_member(self.room_id, player).await?;
        if departure.new_host.is_some() || departure.now_empty {
            self.store.set_host(self.room_id, departure.new_host).await?;
        }
        let abandoned = departure.now_empty && self.status != RoomStatus::Ended;
        if abandoned {
            self.store
                .update_room_status(self.room_id, RoomStatus::Ended, self.roles.adversary())
                .await?;
        }

        self.roster = roster;
        info!(room = %self.code, %player, players = self.roster.len(), "player left");

        if abandoned {
            self.apply_end(GameOutcome {
                winner: None,
                reason: EndReason::Abandoned,
            });
        }
        events.push(RoomEvent::PlayerLeft {
            player,
            view: self.view(),
        });
        if let Some(host) = departure.new_host {
            info!(room = %self.code, %host, "host changed");
            events.push(RoomEvent::HostChanged { host });
        }
        if abandoned {
            if let Some(outcome) = self.outcome {
                events.push(self.ended_event(outcome));
            }
            return Ok(());
        }

        // The leave itself is committed; follow-ups that fail are retried
        // by the next command that touches the same state.
        if self.status.is_in_game() {
            let follow_up = if self.voting.has_quorum(&self.roster) {
                self.resolve(events).await.map(|_| ())
            } else {
                self.check_win(events).await
            };
            if let Err(e) = follow_up {
                warn!(room = %self.code, error = %e, "follow-up after leave failed");
            }
        }
        Ok(())
    }

    async fn start(
        &mut self,
        requester: PlayerId,
        events: &mut Vec<RoomEvent>,
    ) -> Result<RoomView, RoomError> {
        self.require_host(requester)?;
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                action: "start the game",
                status: self.status,
            });
        }

        let mut roles = self.roles.clone();
        let adversary = {
            let mut rng = self.rng.lock();
            roles.assign(&self.roster, &mut *rng)?
        };
        self.store
            .update_room_status(self.room_id, RoomStatus::Playing, Some(adversary))
            .await?;

        self.roles = roles;
        self.tasks.clear();
        self.outcome = None;
        self.set_status(RoomStatus::Playing);
        info!(room = %self.code, players = self.roster.len(), "game started");

        let view = self.view();
        events.push(RoomEvent::GameStarted { view: view.clone() });
        Ok(view)
    }

    async fn call_meeting(
        &mut self,
        caller: PlayerId,
        events: &mut Vec<RoomEvent>,
    ) -> Result<u32, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidState {
                action: "call a meeting",
                status: self.status,
            });
        }
        self.require_alive(caller)?;

        let mut voting = self.voting.clone();
        let round = voting.open_round()?;
        self.store
            .update_room_status(self.room_id, RoomStatus::Discussing, self.roles.adversary())
            .await?;

        self.voting = voting;
        self.set_status(RoomStatus::Discussing);
        if let Some(limit) = self.config.voting_time_limit() {
            self.deadline = Some((round, Instant::now() + limit));
        }
        info!(room = %self.code, %caller, round, "meeting called");

        events.push(RoomEvent::MeetingCalled { caller, round });
        Ok(round)
    }

    async fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
        events: &mut Vec<RoomEvent>,
    ) -> Result<VoteReceipt, RoomError> {
        let mut voting = self.voting.clone();
        let quorum_reached = voting.cast_vote(voter, target, round, &self.roster)?;
        self.store
            .record_vote(self.room_id, voter, target, round)
            .await?;

        self.voting = voting;
        debug!(room = %self.code, %voter, round, "vote recorded");
        events.push(RoomEvent::VoteCast {
            voter,
            round,
            votes_cast: self.voting.votes_cast(&self.roster),
            votes_needed: self.roster.alive_count(),
        });

        let mut result = None;
        if quorum_reached {
            match self.resolve(events).await {
                Ok(r) => result = Some(r),
                Err(e) => {
                    warn!(room = %self.code, round, error = %e, "round resolution failed, round stays open");
                }
            }
        }
        Ok(VoteReceipt {
            round,
            quorum_reached,
            result,
        })
    }

    async fn resolve_round(
        &mut self,
        round: u32,
        events: &mut Vec<RoomEvent>,
    ) -> Result<RoundResult, RoomError> {
        if !self.voting.is_collecting() {
            return Err(RulesError::NoOpenRound.into());
        }
        let current = self.voting.current_round();
        if round > 0 && round < current {
            return Err(RulesError::StaleRound { got: round, current }.into());
        }
        if round != current {
            return Err(RulesError::RoundOutOfRange { got: round, current }.into());
        }
        self.resolve(events).await
    }

    async fn complete_task(
        &mut self,
        player: PlayerId,
        task: TaskId,
        events: &mut Vec<RoomEvent>,
    ) -> Result<TaskRecord, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::InvalidState {
                action: "complete a task",
                status: self.status,
            });
        }
        self.require_alive(player)?;

        let mut tasks = self.tasks.clone();
        let record = tasks.record_completion(player, task.clone())?;
        if record.newly_recorded {
            self.store.record_task(self.room_id, player, &task).await?;
            self.tasks = tasks;
            debug!(room = %self.code, %player, %task, completed = record.completed, "task completed");
            events.push(RoomEvent::TaskCompleted {
                player,
                progress: self.tasks.progress(&self.roster, self.roles.adversary()),
            });
        }

        // Also on repeats, so a retry finishes a game whose end failed to
        // persist the first time.
        self.check_win(events).await?;
        Ok(record)
    }

    async fn post_message(
        &mut self,
        author: PlayerId,
        content: &str,
        events: &mut Vec<RoomEvent>,
    ) -> Result<Message, RoomError> {
        if !self.roster.contains(author) {
            return Err(RulesError::NotAMember(author).into());
        }
        let content = normalize_message(content)?;
        let message = self
            .store
            .append_message(self.room_id, author, content)
            .await?;
        events.push(RoomEvent::MessagePosted {
            message: message.clone(),
        });
        Ok(message)
    }

    async fn reset(
        &mut self,
        requester: PlayerId,
        events: &mut Vec<RoomEvent>,
    ) -> Result<RoomView, RoomError> {
        self.require_host(requester)?;
        if self.status != RoomStatus::Ended {
            return Err(RoomError::InvalidState {
                action: "reset the room",
                status: self.status,
            });
        }

        let eliminated: Vec<PlayerId> = self
            .roster
            .players()
            .iter()
            .filter(|p| !p.alive)
            .map(|p| p.id)
            .collect();
        for id in eliminated {
            self.store.set_alive(self.room_id, id, true).await?;
        }
        self.store
            .update_room_status(self.room_id, RoomStatus::Waiting, None)
            .await?;

        self.roster.revive_all();
        self.roles.reset();
        self.voting.reset();
        self.tasks.clear();
        self.outcome = None;
        self.deadline = None;
        self.set_status(RoomStatus::Waiting);
        info!(room = %self.code, players = self.roster.len(), "room reset");

        let view = self.view();
        events.push(RoomEvent::RoomReset { view: view.clone() });
        Ok(view)
    }

    async fn end(&mut self, events: &mut Vec<RoomEvent>) -> Result<GameOutcome, RoomError> {
        if self.status == RoomStatus::Ended {
            return Err(RoomError::InvalidState {
                action: "end the room",
                status: self.status,
            });
        }
        self.store
            .update_room_status(self.room_id, RoomStatus::Ended, self.roles.adversary())
            .await?;

        let outcome = GameOutcome {
            winner: None,
            reason: EndReason::Closed,
        };
        self.apply_end(outcome);
        events.push(self.ended_event(outcome));
        Ok(outcome)
    }

    async fn audit(&mut self, events: &mut Vec<RoomEvent>) -> Result<(), RoomError> {
        let stored: Vec<(PlayerId, bool)> = self
            .store
            .list_members(self.room_id)
            .await?
            .into_iter()
            .map(|m| (m.id, m.alive))
            .collect();
        let memory: Vec<(PlayerId, bool)> = self
            .roster
            .players()
            .iter()
            .map(|p| (p.id, p.alive))
            .collect();

        if stored == memory {
            debug!(room = %self.code, members = memory.len(), "audit passed");
            return Ok(());
        }
        let detail = format!("store members {stored:?} differ from memory {memory:?}");
        Err(self.abort(detail, events).await)
    }

    // -- shared steps ----------------------------------------------------------

    /// Tallies the open round, applies the elimination and decides whether
    /// the game goes on.
    ///
    /// All store writes happen before any in-memory change, so a failure
    /// leaves the round open for a retry.
    async fn resolve(&mut self, events: &mut Vec<RoomEvent>) -> Result<RoundResult, RoomError> {
        let mut voting = self.voting.clone();
        let result = voting.resolve(&self.roster)?;
        voting.finish();

        let mut roster = self.roster.clone();
        if let Some(id) = result.eliminated {
            roster.mark_eliminated(id)?;
        }
        let outcome = evaluate(&roster, self.roles.adversary(), &self.tasks);
        let next = if outcome.is_some() {
            RoomStatus::Ended
        } else {
            RoomStatus::Playing
        };

        if let Some(id) = result.eliminated {
            self.store.set_alive(self.room_id, id, false).await?;
        }
        self.store
            .update_room_status(self.room_id, next, self.roles.adversary())
            .await?;

        self.voting = voting;
        self.roster = roster;
        self.deadline = None;
        info!(
            room = %self.code,
            round = result.round,
            eliminated = ?result.eliminated,
            abstentions = result.abstentions,
            "round resolved"
        );
        match outcome {
            Some(outcome) => self.apply_end(outcome),
            None => self.set_status(RoomStatus::Playing),
        }

        events.push(RoomEvent::RoundResolved {
            result: result.clone(),
            view: self.view(),
        });
        if let Some(player) = result.eliminated {
            events.push(RoomEvent::PlayerEliminated {
                player,
                round: result.round,
            });
        }
        if let Some(outcome) = outcome {
            events.push(self.ended_event(outcome));
        }
        Ok(result)
    }

    /// Ends the game if a win condition holds.
    async fn check_win(&mut self, events: &mut Vec<RoomEvent>) -> Result<(), RoomError> {
        if !self.status.is_in_game() {
            return Ok(());
        }
        let Some(outcome) = evaluate(&self.roster, self.roles.adversary(), &self.tasks) else {
            return Ok(());
        };
        self.store
            .update_room_status(self.room_id, RoomStatus::Ended, self.roles.adversary())
            .await?;
        self.apply_end(outcome);
        events.push(self.ended_event(outcome));
        Ok(())
    }

    async fn on_deadline(&mut self, round: u32) {
        self.deadline = None;
        if !self.voting.is_collecting() || self.voting.current_round() != round {
            return;
        }
        info!(room = %self.code, round, "vote time limit reached");

        let mut events = Vec::new();
        let result = self.resolve(&mut events).await;
        if result.is_err() && self.voting.is_collecting() {
            self.deadline = Some((round, Instant::now() + DEADLINE_RETRY));
        }
        if let Err(e) = self.finish("vote_deadline", result, events).await {
            warn!(room = %self.code, round, error = %e, "timed resolution failed");
        }
    }

    /// Forces the room to Ended after an invariant violation.
    ///
    /// Memory is changed even if the store write fails: a room in an
    /// impossible state must not keep accepting commands.
    async fn abort(&mut self, detail: String, events: &mut Vec<RoomEvent>) -> RoomError {
        error!(room = %self.code, %detail, "room invariant violated, ending room");
        let outcome = GameOutcome {
            winner: None,
            reason: EndReason::Aborted,
        };
        if self.status != RoomStatus::Ended {
            self.set_status(RoomStatus::Ended);
        }
        self.voting.cancel();
        self.deadline = None;
        self.outcome = Some(outcome);
        if let Err(e) = self
            .store
            .update_room_status(self.room_id, RoomStatus::Ended, self.roles.adversary())
            .await
        {
            warn!(room = %self.code, error = %e, "could not persist aborted room");
        }
        events.push(self.ended_event(outcome));
        RoomError::Internal {
            code: self.code.clone(),
            detail,
        }
    }

    fn apply_end(&mut self, outcome: GameOutcome) {
        self.voting.cancel();
        self.deadline = None;
        self.outcome = Some(outcome);
        self.set_status(RoomStatus::Ended);
        info!(
            room = %self.code,
            winner = ?outcome.winner,
            reason = ?outcome.reason,
            "game ended"
        );
    }

    fn ended_event(&self, outcome: GameOutcome) -> RoomEvent {
        RoomEvent::GameEnded {
            outcome,
            adversary: self.roles.adversary(),
            view: self.view(),
        }
    }

    fn set_status(&mut self, next: RoomStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        debug!(room = %self.code, from = %self.status, to = %next, "status changed");
        self.status = next;
    }

    fn require_host(&self, requester: PlayerId) -> Result<(), RoomError> {
        if self.roster.is_host(requester) {
            Ok(())
        } else {
            Err(RoomError::NotHost(requester))
        }
    }

    fn require_alive(&self, player: PlayerId) -> Result<(), RoomError> {
        let member = self
            .roster
            .get(player)
            .ok_or(RulesError::NotAMember(player))?;
        if !member.alive {
            return Err(RulesError::PlayerNotAlive(player).into());
        }
        Ok(())
    }

    /// Checks the invariants every committed state must satisfy.
    fn check_invariants(&self) -> Result<(), String> {
        if self.roster.len() > self.config.max_players {
            return Err(format!(
                "{} members exceed capacity {}",
                self.roster.len(),
                self.config.max_players
            ));
        }
        match (self.status, self.roles.adversary()) {
            (RoomStatus::Waiting, Some(_)) => {
                return Err("adversary assigned while waiting".into());
            }
            (RoomStatus::Playing | RoomStatus::Discussing, None) => {
                return Err(format!("no adversary while {}", self.status));
            }
            (_, Some(adversary)) if !self.seen.contains(&adversary) => {
                return Err(format!("adversary {adversary} was never a member"));
            }
            _ => {}
        }
        if (self.status == RoomStatus::Discussing) != self.voting.is_collecting() {
            return Err(format!(
                "status {} with vote phase {:?}",
                self.status,
                self.voting.phase()
            ));
        }
        Ok(())
    }

    // -- reads ---------------------------------------------------------------

    /// The public view. The adversary is only revealed once Ended.
    fn view(&self) -> RoomView {
        let adversary = self.roles.adversary();
        RoomView {
            room_id: self.room_id,
            code: self.code.clone(),
            status: self.status,
            host: self.roster.host(),
            players: self
                .roster
                .players()
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    name: p.name.clone(),
                    color: p.color.clone(),
                    alive: p.alive,
                    tasks_completed: self.tasks.completed_by(p.id),
                    is_host: self.roster.is_host(p.id),
                })
                .collect(),
            round: self.voting.current_round(),
            voting: self.voting.view(&self.roster),
            tasks: self.tasks.progress(&self.roster, adversary),
            last_result: self.voting.last_result().cloned(),
            outcome: self.outcome,
            adversary: if self.status == RoomStatus::Ended {
                adversary
            } else {
                None
            },
            created_at: self.created_at,
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            code: self.code.clone(),
            status: self.status,
            player_count: self.roster.len(),
            max_players: self.roster.capacity(),
            idle: self.last_activity.elapsed(),
        }
    }
}

/// Spawns a coordinator for a room whose rows already exist in the
/// store, with `host` as its only member.
pub(crate) fn spawn_room<S: RoomStore>(
    room_id: RoomId,
    code: RoomCode,
    host: Player,
    config: RoomConfig,
    store: Arc<S>,
    rng: SharedRng,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size);
    let (events, _) = broadcast::channel(config.event_capacity);

    let (close_tx, close_rx) = watch::channel(false);

    let mut seen = HashSet::new();
    seen.insert(host.id);
    let handle = RoomHandle {
        room_id,
        code: code.clone(),
        sender: tx,
        events: events.clone(),
        close: Arc::new(close_tx),
        command_timeout: config.command_timeout(),
        reply_timeout: config.reply_timeout(),
    };

    let actor = RoomActor {
        room_id,
        code,
        created_at: Utc::now(),
        status: RoomStatus::Waiting,
        roster: Roster::with_host(host, config.max_players),
        roles: RoleAssigner::new(),
        voting: VotingMachine::new(),
        tasks: TaskTracker::new(config.task_goal),
        outcome: None,
        seen,
        deadline: None,
        last_activity: Instant::now(),
        config,
        store,
        rng,
        events,
        receiver: rx,
        close: close_rx,
    };
    tokio::spawn(actor.run());

    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_player_trims() {
        let (name, color) = normalize_player("  ana ", " red ").unwrap();
        assert_eq!(name, "ana");
        assert_eq!(color, "red");
    }

    #[test]
    fn test_normalize_player_rejects_blank_and_long_names() {
        assert!(matches!(
            normalize_player("   ", "red"),
            Err(RoomError::InvalidInput(_))
        ));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            normalize_player(&long, "red"),
            Err(RoomError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_normalize_message_bounds() {
        assert_eq!(normalize_message("  hi  ").unwrap(), "hi");
        assert!(normalize_message(" \n ").is_err());
        assert!(normalize_message(&"a".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(normalize_message(&"a".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }
}
