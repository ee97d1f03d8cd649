//! Request outcomes, sent only to the initiating session.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{BoardId, CardId, ChecklistId, ChecklistItemId, ListId},
    payloads::model::{Card, Notification},
};

/// Request accepted and, for mutations, durably applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Entity created by the request, if any.
    #[serde(default)]
    pub created: Option<EntityRef>,
}

/// Reference to a newly created entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    /// A board.
    Board(BoardId),
    /// A list.
    List(ListId),
    /// A card.
    Card(CardId),
    /// A checklist.
    Checklist(ChecklistId),
    /// A checklist item.
    ChecklistItem(ChecklistItemId),
}

/// The sender's inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    /// Notifications, newest first.
    pub notifications: Vec<Notification>,
}

/// Cards assigned to the sender on boards it can access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tasks {
    /// Cards in assignment order.
    pub cards: Vec<Card>,
}

/// Request rejected. Nothing was persisted and nothing was broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailed {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Failure classes visible to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request or unknown ids.
    Validation,
    /// Stored ordering violates the list/card invariant.
    InconsistentState,
    /// Writes could not be completed atomically; rolled back.
    Integrity,
    /// Request was based on an outdated list version.
    StaleVersion,
    /// Session lacks a grant for the board.
    Unauthorized,
    /// Referenced entity does not exist.
    NotFound,
}

impl ErrorKind {
    /// Whether re-fetching the board and retrying can succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StaleVersion | Self::Integrity | Self::InconsistentState)
    }
}
