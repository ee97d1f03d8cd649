//! Local board view and event reconciliation.
//!
//! Each list's cards are materialized as an `Arc<[Card]>`. Reconciling an
//! event never mutates an array in place: the affected arrays are rebuilt
//! from the event's authoritative id sequences, looking cards up in the
//! union of every card known locally, and swapped in wholesale. Ids that are
//! not known locally are skipped.
//!
//! Because events carry full sequences, applying an event twice yields the
//! same view as applying it once. The initiator of a move therefore handles
//! its own echo exactly like any other subscriber.

use std::{collections::HashMap, sync::Arc};

use pinboard_core::Sequence;
use pinboard_proto::{
    BoardId, CardId, ListId, Payload,
    payloads::{
        events::{
            BoardSnapshot, CardCreated, CardDeleted, CardMoved, CardUpdated, ListCreated, ListMoved,
            ListRenamed,
        },
        model::{BoardSummary, Card, ListSnapshot},
    },
};

/// One list as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView {
    /// Identity.
    pub id: ListId,
    /// Title.
    pub title: String,
    /// Last version reported by the server.
    pub version: u64,
    /// Cards in display order.
    pub cards: Arc<[Card]>,
}

impl ListView {
    /// Current card order.
    pub fn card_order(&self) -> Sequence<CardId> {
        self.cards.iter().map(|card| card.id).collect()
    }

    fn from_snapshot(list: ListSnapshot) -> Self {
        Self { id: list.id, title: list.title, version: list.version, cards: list.cards.into() }
    }
}

/// A board as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    summary: BoardSummary,
    lists: Vec<ListView>,
}

impl BoardView {
    /// View built from a full snapshot.
    pub fn from_snapshot(snapshot: BoardSnapshot) -> Self {
        Self {
            summary: snapshot.board,
            lists: snapshot.lists.into_iter().map(ListView::from_snapshot).collect(),
        }
    }

    /// Board id.
    pub fn id(&self) -> BoardId {
        self.summary.id
    }

    /// Board header.
    pub fn summary(&self) -> &BoardSummary {
        &self.summary
    }

    /// Lists in board order.
    pub fn lists(&self) -> &[ListView] {
        &self.lists
    }

    /// One list.
    pub fn list(&self, list_id: ListId) -> Option<&ListView> {
        self.lists.iter().find(|list| list.id == list_id)
    }

    /// Current list order.
    pub fn list_order(&self) -> Sequence<ListId> {
        self.lists.iter().map(|list| list.id).collect()
    }

    /// Find a card anywhere on the board.
    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.lists.iter().flat_map(|list| list.cards.iter()).find(|card| card.id == card_id)
    }

    /// Number of cards across all lists.
    pub fn card_count(&self) -> usize {
        self.lists.iter().map(|list| list.cards.len()).sum()
    }

    /// Reconcile a board event. Returns whether the view changed shape;
    /// events for other boards or unknown lists are dropped.
    pub fn apply_event(&mut self, event: &Payload) -> bool {
        match event {
            Payload::CardMoved(e) => self.apply_card_moved(e),
            Payload::ListMoved(e) => self.apply_list_moved(e),
            Payload::CardCreated(e) => self.apply_card_created(e),
            Payload::CardUpdated(e) => self.apply_card_updated(e),
            Payload::CardDeleted(e) => self.apply_card_deleted(e),
            Payload::ListCreated(e) => self.apply_list_created(e),
            Payload::ListRenamed(e) => self.apply_list_renamed(e),
            Payload::BoardSnapshot(snapshot) if snapshot.board.id == self.id() => {
                *self = Self::from_snapshot(snapshot.clone());
                true
            },
            _ => false,
        }
    }

    /// Replace the source and destination arrays with the authoritative
    /// sequences. Dropped unless both lists are known locally.
    pub fn apply_card_moved(&mut self, event: &CardMoved) -> bool {
        let Some(source) = self.position(event.source_list_id) else {
            return false;
        };
        let dest = if event.is_same_list() {
            None
        } else {
            match (self.position(event.dest_list_id), &event.dest_sequence) {
                (Some(index), Some(sequence)) => Some((index, sequence)),
                _ => return false,
            }
        };

        let mut known = self.known_cards();
        if let Some(card) = known.get_mut(&event.card_id) {
            card.list_id = event.dest_list_id;
        }

        self.lists[source].cards = materialize(&event.source_sequence, &known);
        self.lists[source].version = event.source_version;
        if let Some((index, sequence)) = dest {
            self.lists[index].cards = materialize(sequence, &known);
            if let Some(version) = event.dest_version {
                self.lists[index].version = version;
            }
        }
        true
    }

    /// Reorder lists to match the board sequence. Unknown ids are skipped.
    pub fn apply_list_moved(&mut self, event: &ListMoved) -> bool {
        self.reorder_lists(&event.sequence);
        self.summary.version = event.version;
        true
    }

    /// Add a card and adopt its list's new sequence.
    pub fn apply_card_created(&mut self, event: &CardCreated) -> bool {
        let Some(index) = self.position(event.card.list_id) else {
            return false;
        };
        let mut known = self.known_cards();
        known.insert(event.card.id, event.card.clone());

        self.lists[index].cards = materialize(&event.sequence, &known);
        self.lists[index].version = event.list_version;
        true
    }

    /// Replace a card's fields. Position is taken from the list, not the
    /// card.
    pub fn apply_card_updated(&mut self, event: &CardUpdated) -> bool {
        let updated = &event.card;
        let Some(list) = self.lists.iter_mut().find(|list| list.cards.iter().any(|c| c.id == updated.id))
        else {
            return false;
        };
        list.cards = list
            .cards
            .iter()
            .map(|card| if card.id == updated.id { updated.clone() } else { card.clone() })
            .collect();
        true
    }

    /// Drop a card by adopting its list's new sequence.
    pub fn apply_card_deleted(&mut self, event: &CardDeleted) -> bool {
        let Some(index) = self.position(event.list_id) else {
            return false;
        };
        let known = self.known_cards();
        self.lists[index].cards = materialize(&event.sequence, &known);
        self.lists[index].version = event.list_version;
        true
    }

    /// Add a list, or refresh it if already known, then adopt the board
    /// sequence.
    pub fn apply_list_created(&mut self, event: &ListCreated) -> bool {
        let list = ListView::from_snapshot(event.list.clone());
        match self.position(list.id) {
            Some(index) => self.lists[index] = list,
            None => self.lists.push(list),
        }
        self.reorder_lists(&event.board_sequence);
        self.summary.version = event.board_version;
        true
    }

    /// Retitle a known list.
    pub fn apply_list_renamed(&mut self, event: &ListRenamed) -> bool {
        let Some(index) = self.position(event.list_id) else {
            return false;
        };
        self.lists[index].title.clone_from(&event.title);
        true
    }

    /// Restore previously captured lists, replacing those with the same id.
    pub fn restore_lists(&mut self, lists: &[ListView]) {
        for saved in lists {
            if let Some(index) = self.position(saved.id) {
                self.lists[index] = saved.clone();
            }
        }
    }

    /// Restore a previously captured list order.
    pub fn restore_list_order(&mut self, order: &[ListId], version: u64) {
        self.reorder_lists(order);
        self.summary.version = version;
    }

    fn position(&self, list_id: ListId) -> Option<usize> {
        self.lists.iter().position(|list| list.id == list_id)
    }

    fn known_cards(&self) -> HashMap<CardId, Card> {
        self.lists.iter().flat_map(|list| list.cards.iter()).map(|card| (card.id, card.clone())).collect()
    }

    fn reorder_lists(&mut self, order: &[ListId]) {
        let mut current: HashMap<ListId, ListView> =
            self.lists.drain(..).map(|list| (list.id, list)).collect();
        self.lists = order.iter().filter_map(|id| current.remove(id)).collect();
    }
}

fn materialize(sequence: &[CardId], known: &HashMap<CardId, Card>) -> Arc<[Card]> {
    sequence.iter().filter_map(|id| known.get(id).cloned()).collect()
}
