//! Board events broadcast to every subscriber, initiator included.
//!
//! Events carry full sequences, never deltas, so applying the same event
//! twice leaves a receiver in the same state as applying it once.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{CardId, ListId},
    payloads::model::{BoardSummary, Card, ListSnapshot, Notification},
};

/// Authoritative result of a card move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMoved {
    /// Card that moved.
    pub card_id: CardId,
    /// List it left.
    pub source_list_id: ListId,
    /// List it entered. Equal to `source_list_id` for a reorder.
    pub dest_list_id: ListId,
    /// Full order of the source list after the move. For a same-list move
    /// this is the full reordered sequence.
    pub source_sequence: Vec<CardId>,
    /// Full order of the destination list; omitted for same-list moves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_sequence: Option<Vec<CardId>>,
    /// Source list version after the write.
    pub source_version: u64,
    /// Destination list version after the write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_version: Option<u64>,
}

impl CardMoved {
    /// Whether the card stayed in its list.
    pub fn is_same_list(&self) -> bool {
        self.source_list_id == self.dest_list_id
    }
}

/// Authoritative list order of a board after a list move or creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMoved {
    /// List that moved.
    pub list_id: ListId,
    /// Full list order of the board.
    pub sequence: Vec<ListId>,
    /// Board order version after the write.
    pub version: u64,
}

/// A card was appended to a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCreated {
    /// The new card.
    pub card: Card,
    /// Full order of the card's list after insertion.
    pub sequence: Vec<CardId>,
    /// List version after the write.
    pub list_version: u64,
}

/// A card's fields changed. Position is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardUpdated {
    /// The card after the update.
    pub card: Card,
}

/// A card was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDeleted {
    /// Deleted card.
    pub card_id: CardId,
    /// List that contained it.
    pub list_id: ListId,
    /// Full order of that list after removal.
    pub sequence: Vec<CardId>,
    /// List version after the write.
    pub list_version: u64,
}

/// A list was appended to the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCreated {
    /// The new, empty list.
    pub list: ListSnapshot,
    /// Full list order of the board after insertion.
    pub board_sequence: Vec<ListId>,
    /// Board order version after the write.
    pub board_version: u64,
}

/// A list's title changed. Its cards are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRenamed {
    /// Renamed list.
    pub list_id: ListId,
    /// New title.
    pub title: String,
}

/// A notification was issued for a card on this board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// The stored notification.
    pub notification: Notification,
}

/// Complete board state, the repair path for missed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Board header.
    pub board: BoardSummary,
    /// Lists in board order, cards in list order.
    pub lists: Vec<ListSnapshot>,
}
