//! Core error types.

use pinboard_proto::{
    BoardId, CardId, ChecklistId, ChecklistItemId, ListId, payloads::outcome::ErrorKind,
};
use thiserror::Error;

/// Move resolution failures.
///
/// Nothing has been written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The request names a list the ordering store does not know.
    #[error("unknown list {0}")]
    UnknownList(ListId),

    /// The request names a board the ordering store does not know.
    #[error("unknown board {0}")]
    UnknownBoard(BoardId),

    /// The card is not in the sequence of the list it supposedly left.
    #[error("{card_id} not found in {list_id}")]
    CardNotInSource {
        /// Card being moved.
        card_id: CardId,
        /// List claimed as its source.
        list_id: ListId,
    },

    /// The card already appears in the destination of a cross-list move.
    #[error("{card_id} already present in {list_id}")]
    CardAlreadyInDest {
        /// Card being moved.
        card_id: CardId,
        /// Destination list.
        list_id: ListId,
    },

    /// The list is not in its board's list order.
    #[error("{list_id} not found in {board_id}")]
    ListNotInBoard {
        /// List being moved.
        list_id: ListId,
        /// Owning board.
        board_id: BoardId,
    },
}

impl ResolveError {
    /// Wire-level failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownList(_) | Self::UnknownBoard(_) => ErrorKind::Validation,
            Self::CardNotInSource { .. }
            | Self::CardAlreadyInDest { .. }
            | Self::ListNotInBoard { .. } => ErrorKind::InconsistentState,
        }
    }
}

/// Card sub-document mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    /// Titles must contain something other than whitespace.
    #[error("title must not be empty")]
    EmptyTitle,

    /// Checklist item text must contain something other than whitespace.
    #[error("checklist item text must not be empty")]
    EmptyText,

    /// No checklist with this id on the card.
    #[error("{checklist_id} not found on {card_id}")]
    ChecklistNotFound {
        /// Card searched.
        card_id: CardId,
        /// Missing checklist.
        checklist_id: ChecklistId,
    },

    /// No item with this id in the checklist.
    #[error("{item_id} not found in {checklist_id}")]
    ItemNotFound {
        /// Checklist searched.
        checklist_id: ChecklistId,
        /// Missing item.
        item_id: ChecklistItemId,
    },
}

impl CardError {
    /// Wire-level failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyTitle | Self::EmptyText => ErrorKind::Validation,
            Self::ChecklistNotFound { .. } | Self::ItemNotFound { .. } => ErrorKind::NotFound,
        }
    }
}
