//! Persistence for boards, lists, cards, member task sets and notifications.
//!
//! Every write is a whole-record replacement keyed by id. The storage layer
//! has no notion of a multi-record transaction; atomicity across records is
//! provided by [`crate::applier::MutationApplier`], which snapshots what it
//! is about to overwrite and restores it if a later write fails.

mod memory;
mod redb_store;

pub use memory::MemoryStorage;
pub use redb_store::RedbStorage;

use pinboard_core::Sequence;
use pinboard_proto::{
    BoardId, CardId, ListId, UserId, WorkspaceId,
    payloads::model::{BoardSummary, Card, Notification},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("record serialization failed: {0}")]
    Serialization(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Injected failure (simulation only).
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Stored board: header plus the ordered list ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRecord {
    /// Identity.
    pub id: BoardId,
    /// Title.
    pub title: String,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Display order of lists.
    pub lists: Sequence<ListId>,
    /// Bumped on every write of `lists`.
    pub version: u64,
}

impl BoardRecord {
    /// Header as sent to clients.
    pub fn summary(&self) -> BoardSummary {
        BoardSummary {
            id: self.id,
            title: self.title.clone(),
            workspace_id: self.workspace_id,
            version: self.version,
        }
    }
}

/// Stored list: header plus the ordered card ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecord {
    /// Identity.
    pub id: ListId,
    /// Title.
    pub title: String,
    /// Owning board.
    pub board_id: BoardId,
    /// Display order of cards. The only source of truth for position.
    pub cards: Sequence<CardId>,
    /// Bumped on every write of `cards`.
    pub version: u64,
}

impl ListRecord {
    /// Copy with a new card order and the version bumped.
    #[must_use]
    pub fn reordered(&self, cards: Sequence<CardId>) -> Self {
        Self { cards, version: self.version + 1, ..self.clone() }
    }
}

/// Record persistence.
///
/// Implementations use interior mutability so a storage handle can be
/// shared between the driver and tooling.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load a board.
    fn load_board(&self, board_id: BoardId) -> Result<Option<BoardRecord>, StorageError>;

    /// Store (insert or replace) a board.
    fn store_board(&self, board: &BoardRecord) -> Result<(), StorageError>;

    /// Remove a board. Missing boards are not an error.
    fn delete_board(&self, board_id: BoardId) -> Result<(), StorageError>;

    /// Load a list.
    fn load_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError>;

    /// Store (insert or replace) a list.
    fn store_list(&self, list: &ListRecord) -> Result<(), StorageError>;

    /// Remove a list. Missing lists are not an error.
    fn delete_list(&self, list_id: ListId) -> Result<(), StorageError>;

    /// Load a card.
    fn load_card(&self, card_id: CardId) -> Result<Option<Card>, StorageError>;

    /// Store (insert or replace) a card.
    fn store_card(&self, card: &Card) -> Result<(), StorageError>;

    /// Remove a card. Missing cards are not an error.
    fn delete_card(&self, card_id: CardId) -> Result<(), StorageError>;

    /// Cards assigned to a user. Unknown users have no tasks.
    fn load_tasks(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError>;

    /// Replace a user's task set.
    fn store_tasks(&self, user_id: UserId, tasks: &[CardId]) -> Result<(), StorageError>;

    /// Append a notification to its recipient's inbox.
    fn append_notification(&self, notification: &Notification) -> Result<(), StorageError>;

    /// A user's notifications, oldest first.
    fn load_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StorageError>;

    /// Replace a user's inbox.
    fn store_notifications(
        &self,
        user_id: UserId,
        notifications: &[Notification],
    ) -> Result<(), StorageError>;
}

pub(crate) fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode_record<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, StorageError> {
    ciborium::de::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
