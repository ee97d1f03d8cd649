//! Board entities as they travel on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    BoardId, CardId, ChecklistId, ChecklistItemId, ListId, NotificationId, UserId, WorkspaceId,
};

/// A task unit. Belongs to exactly one list at a time.
///
/// `list_id` and `board_id` are only ever changed by a move; field updates
/// leave them untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Identity.
    pub id: CardId,
    /// Title shown on the board.
    pub title: String,
    /// Long-form description.
    pub description: String,
    /// List that currently contains this card.
    pub list_id: ListId,
    /// Board that owns the list, used for broadcast routing.
    pub board_id: BoardId,
    /// Assigned members.
    pub members: Vec<UserId>,
    /// Optional due date.
    pub due: Option<DateTime<Utc>>,
    /// Free-form labels.
    pub labels: Vec<String>,
    /// Nested checklists, in display order.
    pub checklists: Vec<Checklist>,
    /// Number of comments stored by the comment collaborator.
    pub comment_count: u32,
}

/// Ordered sub-document of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    /// Identity within the card.
    pub id: ChecklistId,
    /// Checklist heading.
    pub title: String,
    /// Items in display order.
    pub items: Vec<ChecklistItem>,
}

/// One checkbox in a [`Checklist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Identity within the checklist.
    pub id: ChecklistItemId,
    /// Item text.
    pub text: String,
    /// Completion flag.
    pub is_complete: bool,
}

/// Board header without its lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    /// Identity.
    pub id: BoardId,
    /// Title.
    pub title: String,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Version of the board's list order.
    pub version: u64,
}

/// A list with its cards materialized in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshot {
    /// Identity.
    pub id: ListId,
    /// Title.
    pub title: String,
    /// Version of the list's card order.
    pub version: u64,
    /// Cards in display order.
    pub cards: Vec<Card>,
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Someone mentioned the recipient.
    Mention,
    /// The recipient was assigned to a card.
    Assignment,
    /// A card the recipient is assigned to changed.
    StatusUpdate,
}

/// Message addressed to one user about a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Identity.
    pub id: NotificationId,
    /// User who should receive it.
    pub recipient: UserId,
    /// User whose action triggered it.
    pub sender: UserId,
    /// Category.
    pub kind: NotificationKind,
    /// Rendered message.
    pub message: String,
    /// Board the card lives on.
    pub board_id: BoardId,
    /// Card concerned.
    pub card_id: CardId,
    /// Read flag.
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
