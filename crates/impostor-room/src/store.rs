//! Persistence hook for room state.
//!
//! The coordinator owns the authoritative copy of a room in memory, but
//! every change is written through a [`RoomStore`] first. Which database
//! sits behind the trait is the embedding application's business; this
//! crate only ships [`MemoryStore`] for tests, demos and single-process
//! deployments that don't need durability.
//!
//! # Write order
//!
//! The coordinator writes to the store first and only touches memory
//! after every write an operation needs has succeeded. A failed write can
//! therefore leave the store a step ahead of memory (a player row with no
//! membership, say), but never behind it. Implementations must accept
//! such partial states and must not assume the writes of one operation
//! arrive atomically.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use impostor_protocol::{
    ErrorKind, Message, MessageId, PlayerId, RoomCode, RoomId, RoomStatus, TaskId, VoteTarget,
};
use parking_lot::Mutex;

/// Errors reported by a [`RoomStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row the coordinator expected does not exist.
    #[error("{0} not found in store")]
    NotFound(String),
}

impl StoreError {
    /// Classifies this error.
    ///
    /// A missing row means store and memory disagree, which is an
    /// internal fault rather than bad caller input.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::NotFound(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::NotFound(_) => "store_not_found",
        }
    }
}

/// A member row as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMember {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub alive: bool,
}

/// A room row as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRoom {
    pub id: RoomId,
    pub code: RoomCode,
    pub host: Option<PlayerId>,
    pub status: RoomStatus,
    pub adversary: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

/// A vote row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVote {
    pub round: u32,
    pub voter: PlayerId,
    pub target: VoteTarget,
}

/// Durable storage for rooms, players, votes, tasks and chat.
///
/// # Trait bounds
///
/// `Send + Sync + 'static`: one store is shared by every room
/// coordinator, each running in its own Tokio task.
///
/// Only the coordinator of a room writes that room's rows, so
/// implementations never see two concurrent writers for the same room.
pub trait RoomStore: Send + Sync + 'static {
    /// Creates a player row and returns its id.
    fn create_player(
        &self,
        name: &str,
        color: &str,
    ) -> impl Future<Output = Result<PlayerId, StoreError>> + Send;

    /// Creates a room row in the Waiting status.
    fn create_room(
        &self,
        code: &RoomCode,
        host: PlayerId,
    ) -> impl Future<Output = Result<RoomId, StoreError>> + Send;

    fn add_member(
        &self,
        room: RoomId,
        player: PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_member(
        &self,
        room: RoomId,
        player: PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_host(
        &self,
        room: RoomId,
        host: Option<PlayerId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Records the room status together with the adversary (`None` while
    /// Waiting).
    fn update_room_status(
        &self,
        room: RoomId,
        status: RoomStatus,
        adversary: Option<PlayerId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Marks a member alive or eliminated. Idempotent.
    fn set_alive(
        &self,
        room: RoomId,
        player: PlayerId,
        alive: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn record_vote(
        &self,
        room: RoomId,
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Records a completed task. Idempotent per (room, player, task).
    fn record_task(
        &self,
        room: RoomId,
        player: PlayerId,
        task: &TaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends a chat message, assigning its id, sequence number and
    /// timestamp. Sequence numbers strictly increase.
    fn append_message(
        &self,
        room: RoomId,
        author: PlayerId,
        content: &str,
    ) -> impl Future<Output = Result<Message, StoreError>> + Send;

    /// Current members of a room, in join order.
    fn list_members(
        &self,
        room: RoomId,
    ) -> impl Future<Output = Result<Vec<StoredMember>, StoreError>> + Send;

    /// All messages of a room, ordered by sequence number.
    fn list_messages(
        &self,
        room: RoomId,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PlayerRow {
    name: String,
    color: String,
    alive: bool,
}

#[derive(Default)]
struct Tables {
    players: HashMap<PlayerId, PlayerRow>,
    rooms: HashMap<RoomId, StoredRoom>,
    members: HashMap<RoomId, Vec<PlayerId>>,
    votes: HashMap<RoomId, Vec<StoredVote>>,
    tasks: HashSet<(RoomId, PlayerId, TaskId)>,
    messages: HashMap<RoomId, Vec<Message>>,
    next_seq: u64,
}

/// An in-process [`RoomStore`].
///
/// All tables sit behind one `parking_lot::Mutex`; no lock is held across
/// an await. [`set_offline`](Self::set_offline) makes every call fail
/// with [`StoreError::Unavailable`], which is how tests simulate an
/// outage.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    next_player: AtomicU64,
    next_room: AtomicU64,
    next_message: AtomicU64,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_player: AtomicU64::new(1),
            next_room: AtomicU64::new(1),
            next_message: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Switches the simulated outage on or off.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The stored room row, if any.
    pub fn room(&self, room: RoomId) -> Option<StoredRoom> {
        self.tables.lock().rooms.get(&room).cloned()
    }

    /// Every vote recorded for a room, in the order received.
    pub fn votes(&self, room: RoomId) -> Vec<StoredVote> {
        self.tables.lock().votes.get(&room).cloned().unwrap_or_default()
    }

    /// Number of task rows recorded for a room.
    pub fn task_count(&self, room: RoomId) -> usize {
        self.tables
            .lock()
            .tasks
            .iter()
            .filter(|(r, _, _)| *r == room)
            .count()
    }

    /// Number of player rows, members or not.
    pub fn player_count(&self) -> usize {
        self.tables.lock().players.len()
    }

    fn online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn with_room<T>(
        &self,
        room: RoomId,
        f: impl FnOnce(&mut Tables) -> T,
    ) -> Result<T, StoreError> {
        self.online()?;
        let mut tables = self.tables.lock();
        if !tables.rooms.contains_key(&room) {
            return Err(StoreError::NotFound(format!("room {room}")));
        }
        Ok(f(&mut tables))
    }
}

impl RoomStore for MemoryStore {
    async fn create_player(&self, name: &str, color: &str) -> Result<PlayerId, StoreError> {
        self.online()?;
        let id = PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed));
        self.tables.lock().players.insert(
            id,
            PlayerRow {
                name: name.to_string(),
                color: color.to_string(),
                alive: true,
            },
        );
        Ok(id)
    }

    async fn create_room(&self, code: &RoomCode, host: PlayerId) -> Result<RoomId, StoreError> {
        self.online()?;
        let id = RoomId(self.next_room.fetch_add(1, Ordering::Relaxed));
        let mut tables = self.tables.lock();
        tables.rooms.insert(
            id,
            StoredRoom {
                id,
                code: code.clone(),
                host: Some(host),
                status: RoomStatus::Waiting,
                adversary: None,
                created_at: Utc::now(),
            },
        );
        tables.members.insert(id, Vec::new());
        Ok(id)
    }

    async fn add_member(&self, room: RoomId, player: PlayerId) -> Result<(), StoreError> {
        self.online()?;
        let mut tables = self.tables.lock();
        if !tables.players.contains_key(&player) {
            return Err(StoreError::NotFound(format!("player {player}")));
        }
        let members = tables
            .members
            .get_mut(&room)
            .ok_or_else(|| StoreError::NotFound(format!("room {room}")))?;
        if !members.contains(&player) {
            members.push(player);
        }
        Ok(())
    }

    async fn remove_member(&self, room: RoomId, player: PlayerId) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            if let Some(members) = tables.members.get_mut(&room) {
                members.retain(|id| *id != player);
            }
        })
    }

    async fn set_host(&self, room: RoomId, host: Option<PlayerId>) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            if let Some(row) = tables.rooms.get_mut(&room) {
                row.host = host;
            }
        })
    }

    async fn update_room_status(
        &self,
        room: RoomId,
        status: RoomStatus,
        adversary: Option<PlayerId>,
    ) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            if let Some(row) = tables.rooms.get_mut(&room) {
                row.status = status;
                row.adversary = adversary;
            }
        })
    }

    async fn set_alive(&self, room: RoomId, player: PlayerId, alive: bool) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            tables
                .players
                .get_mut(&player)
                .map(|row| row.alive = alive)
                .ok_or_else(|| StoreError::NotFound(format!("player {player}")))
        })?
    }

    async fn record_vote(
        &self,
        room: RoomId,
        voter: PlayerId,
        target: VoteTarget,
        round: u32,
    ) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            tables.votes.entry(room).or_default().push(StoredVote {
                round,
                voter,
                target,
            });
        })
    }

    async fn record_task(&self, room: RoomId, player: PlayerId, task: &TaskId) -> Result<(), StoreError> {
        self.with_room(room, |tables| {
            tables.tasks.insert((room, player, task.clone()));
        })
    }

    async fn append_message(
        &self,
        room: RoomId,
        author: PlayerId,
        content: &str,
    ) -> Result<Message, StoreError> {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::Relaxed));
        self.with_room(room, |tables| {
            tables.next_seq += 1;
            let message = Message {
                id,
                room,
                author,
                content: content.to_string(),
                seq: tables.next_seq,
                sent_at: Utc::now(),
            };
            tables.messages.entry(room).or_default().push(message.clone());
            message
        })
    }

    async fn list_members(&self, room: RoomId) -> Result<Vec<StoredMember>, StoreError> {
        self.with_room(room, |tables| {
            let ids = tables.members.get(&room).cloned().unwrap_or_default();
            ids.into_iter()
                .filter_map(|id| {
                    tables.players.get(&id).map(|row| StoredMember {
                        id,
                        name: row.name.clone(),
                        color: row.color.clone(),
                        alive: row.alive,
                    })
                })
                .collect()
        })
    }

    async fn list_messages(&self, room: RoomId) -> Result<Vec<Message>, StoreError> {
        self.with_room(room, |tables| {
            let mut messages = tables.messages.get(&room).cloned().unwrap_or_default();
            messages.sort_by_key(|m| m.seq);
            messages
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::parse("ABCDEF").unwrap()
    }

    #[tokio::test]
    async fn test_create_room_and_members() {
        let store = MemoryStore::new();
        let host = store.create_player("ana", "red").await.unwrap();
        let room = store.create_room(&code(), host).await.unwrap();
        store.add_member(room, host).await.unwrap();
        // Re-adding is a no-op.
        store.add_member(room, host).await.unwrap();

        let members = store.list_members(room).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "ana");
        assert!(members[0].alive);

        let row = store.room(room).unwrap();
        assert_eq!(row.status, RoomStatus::Waiting);
        assert_eq!(row.host, Some(host));
    }

    #[tokio::test]
    async fn test_messages_ordered_by_seq() {
        let store = MemoryStore::new();
        let host = store.create_player("ana", "red").await.unwrap();
        let room = store.create_room(&code(), host).await.unwrap();
        let a = store.append_message(room, host, "A").await.unwrap();
        let b = store.append_message(room, host, "B").await.unwrap();
        assert!(b.seq > a.seq);

        let listed: Vec<_> = store
            .list_messages(room)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(listed, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_offline_store_rejects_everything() {
        let store = MemoryStore::new();
        let host = store.create_player("ana", "red").await.unwrap();
        let room = store.create_room(&code(), host).await.unwrap();
        store.set_offline(true);

        assert!(matches!(
            store.create_player("bo", "blue").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.append_message(room, host, "hi").await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.player_count(), 1);

        store.set_offline(false);
        assert!(store.list_messages(room).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let store = MemoryStore::new();
        let err = store.list_members(RoomId(99)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_record_task_is_idempotent() {
        let store = MemoryStore::new();
        let host = store.create_player("ana", "red").await.unwrap();
        let room = store.create_room(&code(), host).await.unwrap();
        let task = TaskId::from("wires");
        store.record_task(room, host, &task).await.unwrap();
        store.record_task(room, host, &task).await.unwrap();
        assert_eq!(store.task_count(room), 1);
    }
}
