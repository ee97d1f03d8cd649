//! Mutation requests sent by clients.
//!
//! The board a request targets travels in the frame header, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    CardId, ChecklistId, ChecklistItemId, ListId, NotificationId, UserId, WorkspaceId,
};

/// Outcome of a drag-and-drop gesture on a card.
///
/// `dest_index` is a position in the destination list *after* the card has
/// been removed from the source, matching drag-and-drop libraries: dropping
/// at the end of another list sends that list's current length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCard {
    /// Card being dragged.
    pub card_id: CardId,
    /// List the card was dragged from.
    pub source_list_id: ListId,
    /// List the card was dropped into. May equal `source_list_id`.
    pub dest_list_id: ListId,
    /// Position the card occupied in the source list.
    pub source_index: u32,
    /// Drop position in the post-removal destination list.
    pub dest_index: u32,
    /// List versions the client based the gesture on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_versions: Option<ExpectedVersions>,
}

/// Versions a client observed before issuing a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedVersions {
    /// Source list version.
    pub source: u64,
    /// Destination list version; absent for same-list moves.
    pub dest: Option<u64>,
}

/// Reorder a list within its board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveList {
    /// List being dragged.
    pub list_id: ListId,
    /// Position the list occupied.
    pub source_index: u32,
    /// Drop position in the post-removal board order.
    pub dest_index: u32,
    /// Board order version the client based the gesture on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

/// Create a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBoard {
    /// Title.
    pub title: String,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
}

/// Create a list at the end of the header's board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateList {
    /// Title.
    pub title: String,
}

/// Change a list's title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameList {
    /// List to rename.
    pub list_id: ListId,
    /// New title.
    pub title: String,
}

/// Create a card at the end of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCard {
    /// List to append to.
    pub list_id: ListId,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Initially assigned members.
    #[serde(default)]
    pub members: Vec<UserId>,
    /// Optional due date.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Update the mutable fields of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCard {
    /// Card to update.
    pub card_id: CardId,
    /// Fields to change.
    pub patch: CardPatch,
}

/// Partial card update. `None` leaves a field unchanged.
///
/// `list_id` is not patchable; only moves change it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement member set.
    #[serde(default)]
    pub members: Option<Vec<UserId>>,
    /// Due date change.
    #[serde(default)]
    pub due: Option<DueUpdate>,
    /// Replacement labels.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Change to a card's due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DueUpdate {
    /// Set or replace the due date.
    Set(DateTime<Utc>),
    /// Remove the due date.
    Clear,
}

/// Delete a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCard {
    /// Card to delete.
    pub card_id: CardId,
}

/// Append a checklist to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddChecklist {
    /// Owning card.
    pub card_id: CardId,
    /// Checklist heading.
    pub title: String,
}

/// Append an item to a checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddChecklistItem {
    /// Owning card.
    pub card_id: CardId,
    /// Target checklist.
    pub checklist_id: ChecklistId,
    /// Item text.
    pub text: String,
}

/// Change a checklist item's text or completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateChecklistItem {
    /// Owning card.
    pub card_id: CardId,
    /// Owning checklist.
    pub checklist_id: ChecklistId,
    /// Target item.
    pub item_id: ChecklistItemId,
    /// New text. Empty text is ignored.
    #[serde(default)]
    pub text: Option<String>,
    /// New completion flag.
    #[serde(default)]
    pub is_complete: Option<bool>,
}

/// Mark notifications in the sender's inbox read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkNotificationsRead {
    /// Notifications to mark. Empty marks the whole inbox.
    #[serde(default)]
    pub ids: Vec<NotificationId>,
}
