//! Ordering store.
//!
//! Holds, per list, the ordered sequence of card ids and, per board, the
//! ordered sequence of list ids. Writes are total replacements; there is no
//! incremental insert or remove. The cost is sending a full id list on
//! every move, which is fine for lists of at most a few hundred cards.

use std::collections::HashMap;

use pinboard_proto::{BoardId, CardId, ListId};

use crate::{resolver::MoveOutcome, sequence::Sequence};

/// Read and replace card and list order.
pub trait OrderingStore {
    /// Card order of `list_id`, if the list is known.
    fn card_order(&self, list_id: ListId) -> Option<&Sequence<CardId>>;

    /// Replace the card order of `list_id`.
    fn set_card_order(&mut self, list_id: ListId, order: Sequence<CardId>);

    /// List order of `board_id`, if the board is known.
    fn list_order(&self, board_id: BoardId) -> Option<&Sequence<ListId>>;

    /// Replace the list order of `board_id`.
    fn set_list_order(&mut self, board_id: BoardId, order: Sequence<ListId>);

    /// Replace every sequence a resolved move produced.
    fn apply_outcome(&mut self, outcome: &MoveOutcome) {
        self.set_card_order(outcome.source_list_id, outcome.source_order.clone());
        if let Some(dest) = &outcome.dest_order {
            self.set_card_order(outcome.dest_list_id, dest.clone());
        }
    }
}

/// In-memory ordering store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryOrdering {
    cards: HashMap<ListId, Sequence<CardId>>,
    lists: HashMap<BoardId, Sequence<ListId>>,
}

impl MemoryOrdering {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for seeding a list.
    #[must_use]
    pub fn with_list(mut self, list_id: ListId, cards: impl IntoIterator<Item = CardId>) -> Self {
        self.cards.insert(list_id, cards.into_iter().collect());
        self
    }

    /// Total number of card ids across all lists.
    pub fn card_count(&self) -> usize {
        self.cards.values().map(Sequence::len).sum()
    }

    /// Iterate every list and its order.
    pub fn lists(&self) -> impl Iterator<Item = (ListId, &Sequence<CardId>)> {
        self.cards.iter().map(|(id, order)| (*id, order))
    }
}

impl OrderingStore for MemoryOrdering {
    fn card_order(&self, list_id: ListId) -> Option<&Sequence<CardId>> {
        self.cards.get(&list_id)
    }

    fn set_card_order(&mut self, list_id: ListId, order: Sequence<CardId>) {
        self.cards.insert(list_id, order);
    }

    fn list_order(&self, board_id: BoardId) -> Option<&Sequence<ListId>> {
        self.lists.get(&board_id)
    }

    fn set_list_order(&mut self, board_id: BoardId, order: Sequence<ListId>) {
        self.lists.insert(board_id, order);
    }
}
