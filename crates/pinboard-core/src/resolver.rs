//! Move resolution.
//!
//! Turns a drag-and-drop gesture (source list, destination list, source
//! index, destination index) into the complete new sequences of the lists it
//! touches. Resolution is pure: the caller decides whether to persist,
//! broadcast, or apply optimistically.
//!
//! # Index semantics
//!
//! `dest_index` is a position in the destination list *after* the card has
//! been removed from its source. For a same-list move this is classic
//! array-move: `[c1, c2, c3]` moving `c1` to index 2 yields `[c2, c3, c1]`.
//! Indices past the end clamp to an append; they are never an error.

use pinboard_proto::{
    BoardId, CardId, ListId,
    payloads::{events::CardMoved, requests::MoveCard},
};

use crate::{error::ResolveError, ordering::OrderingStore, sequence::Sequence};

/// A card drag-and-drop gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    /// Card being moved.
    pub card_id: CardId,
    /// List it is dragged from.
    pub source_list_id: ListId,
    /// List it is dropped into.
    pub dest_list_id: ListId,
    /// Position in the source list before the move.
    pub source_index: usize,
    /// Position in the post-removal destination list.
    pub dest_index: usize,
}

impl MoveRequest {
    /// Whether the card stays in its list.
    pub fn is_same_list(&self) -> bool {
        self.source_list_id == self.dest_list_id
    }

    /// Whether resolution is trivially a no-op.
    pub fn is_noop(&self) -> bool {
        self.is_same_list() && self.source_index == self.dest_index
    }
}

impl From<&MoveCard> for MoveRequest {
    fn from(msg: &MoveCard) -> Self {
        Self {
            card_id: msg.card_id,
            source_list_id: msg.source_list_id,
            dest_list_id: msg.dest_list_id,
            source_index: msg.source_index as usize,
            dest_index: msg.dest_index as usize,
        }
    }
}

/// Resolved sequences for a move that changes order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Card that moved. Its `list_id` becomes `dest_list_id`.
    pub card_id: CardId,
    /// List it left.
    pub source_list_id: ListId,
    /// List it entered.
    pub dest_list_id: ListId,
    /// New order of the source list. For a same-list move this is the full
    /// reordered sequence.
    pub source_order: Sequence<CardId>,
    /// New order of the destination list; `None` for same-list moves.
    pub dest_order: Option<Sequence<CardId>>,
}

impl MoveOutcome {
    /// Whether the card stayed in its list.
    pub fn is_same_list(&self) -> bool {
        self.source_list_id == self.dest_list_id
    }

    /// Order of the list the card ended up in.
    pub fn final_order(&self) -> &Sequence<CardId> {
        self.dest_order.as_ref().unwrap_or(&self.source_order)
    }

    /// Wire event for this outcome, stamped with post-write list versions.
    pub fn to_event(&self, source_version: u64, dest_version: Option<u64>) -> CardMoved {
        CardMoved {
            card_id: self.card_id,
            source_list_id: self.source_list_id,
            dest_list_id: self.dest_list_id,
            source_sequence: self.source_order.as_slice().to_vec(),
            dest_sequence: self.dest_order.as_ref().map(|order| order.as_slice().to_vec()),
            source_version,
            dest_version: self.dest_order.as_ref().and(dest_version),
        }
    }
}

/// Result of resolving a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing changes. Callers must not persist or broadcast.
    Unchanged,
    /// New sequences to persist.
    Moved(MoveOutcome),
}

/// Resolve a card move against explicit sequences.
///
/// For a same-list move `dest` is ignored and may simply be `source`.
pub fn resolve(
    request: &MoveRequest,
    source: &Sequence<CardId>,
    dest: &Sequence<CardId>,
) -> Result<Resolution, ResolveError> {
    if request.is_noop() {
        return Ok(Resolution::Unchanged);
    }

    let Some(source_order) = source.without(request.card_id) else {
        return Err(ResolveError::CardNotInSource {
            card_id: request.card_id,
            list_id: request.source_list_id,
        });
    };

    if request.is_same_list() {
        let reordered = source_order.with_inserted(request.card_id, request.dest_index);
        if &reordered == source {
            return Ok(Resolution::Unchanged);
        }
        return Ok(Resolution::Moved(MoveOutcome {
            card_id: request.card_id,
            source_list_id: request.source_list_id,
            dest_list_id: request.dest_list_id,
            source_order: reordered,
            dest_order: None,
        }));
    }

    if dest.contains(request.card_id) {
        return Err(ResolveError::CardAlreadyInDest {
            card_id: request.card_id,
            list_id: request.dest_list_id,
        });
    }

    Ok(Resolution::Moved(MoveOutcome {
        card_id: request.card_id,
        source_list_id: request.source_list_id,
        dest_list_id: request.dest_list_id,
        source_order,
        dest_order: Some(dest.with_inserted(request.card_id, request.dest_index)),
    }))
}

/// Resolve a card move against an ordering store.
pub fn resolve_in<S: OrderingStore + ?Sized>(
    store: &S,
    request: &MoveRequest,
) -> Result<Resolution, ResolveError> {
    let source = store
        .card_order(request.source_list_id)
        .ok_or(ResolveError::UnknownList(request.source_list_id))?;
    let dest = if request.is_same_list() {
        source
    } else {
        store.card_order(request.dest_list_id).ok_or(ResolveError::UnknownList(request.dest_list_id))?
    };

    resolve(request, source, dest)
}

/// Resolve a list reorder within its board.
///
/// Same contract as a same-list card move: `Ok(None)` means nothing
/// changes.
pub fn resolve_list_move(
    board_id: BoardId,
    list_id: ListId,
    source_index: usize,
    dest_index: usize,
    order: &Sequence<ListId>,
) -> Result<Option<Sequence<ListId>>, ResolveError> {
    if source_index == dest_index {
        return Ok(None);
    }

    let reordered =
        order.moved(list_id, dest_index).ok_or(ResolveError::ListNotInBoard { list_id, board_id })?;

    if &reordered == order { Ok(None) } else { Ok(Some(reordered)) }
}
