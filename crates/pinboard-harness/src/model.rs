//! Reference model for model-based testing.
//!
//! [`ModelBoard`] is the simplest thing that could hold a board's
//! authoritative order: a vector of lists, each a vector of card ids,
//! mutated in place. It shares no code with the resolver, so agreement
//! between the two is evidence rather than tautology.
//!
//! [`perform`] turns an arbitrary [`Operation`] into a gesture on one
//! client of a [`SimWorld`], picking cards and lists from that client's
//! (possibly stale) view. The [`Gesture`] it returns is what actually
//! reached the server, which is what the model must replay.

use std::time::Duration;

use arbitrary::Arbitrary;
use pinboard_client::ClientEvent;
use pinboard_proto::{CardId, ListId, Payload, payloads::requests::CreateCard};
use pinboard_server::Storage;
use thiserror::Error;

use crate::sim_world::{BoardOrder, SimWorld, WorldError};

/// One step of a simulated session. Indices are reduced modulo whatever
/// they pick from, so every value is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Append a card to a list.
    CreateCard {
        /// Acting client.
        client: u8,
        /// List pick.
        list: u8,
    },
    /// Drag a card somewhere.
    MoveCard {
        /// Acting client.
        client: u8,
        /// Card pick across the whole board.
        card: u8,
        /// Destination list pick.
        dest_list: u8,
        /// Drop position; may exceed the list length.
        dest_index: u8,
    },
    /// Drag a list somewhere.
    MoveList {
        /// Acting client.
        client: u8,
        /// List pick.
        list: u8,
        /// Drop position.
        dest_index: u8,
    },
    /// Delete a card.
    DeleteCard {
        /// Acting client.
        client: u8,
        /// Card pick across the whole board.
        card: u8,
    },
    /// Deliver a client's inbox.
    Deliver {
        /// Receiving client.
        client: u8,
    },
    /// Drop a client's inbox on the floor.
    LoseInbox {
        /// Unlucky client.
        client: u8,
    },
    /// Re-fetch the open board.
    Refresh {
        /// Acting client.
        client: u8,
    },
    /// Let time pass and tick every client.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// A mutation request that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Card creation; `created` is the id the server announced, if any.
    CreateCard {
        /// Target list.
        list: ListId,
        /// Announced id.
        created: Option<CardId>,
    },
    /// Card move.
    MoveCard {
        /// Card.
        card: CardId,
        /// Claimed source list.
        source: ListId,
        /// Destination list.
        dest: ListId,
        /// Claimed source position.
        source_index: usize,
        /// Drop position.
        dest_index: usize,
    },
    /// List move.
    MoveList {
        /// List.
        list: ListId,
        /// Claimed source position.
        source_index: usize,
        /// Drop position.
        dest_index: usize,
    },
    /// Card deletion.
    DeleteCard {
        /// Card.
        card: CardId,
    },
}

/// Requests the model rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The list is not on the board.
    #[error("unknown list {0}")]
    UnknownList(ListId),
    /// The card is not in the list the request names.
    #[error("{card} is not in {list}")]
    CardNotInList {
        /// Card.
        card: CardId,
        /// List.
        list: ListId,
    },
    /// The card does not exist.
    #[error("unknown card {0}")]
    UnknownCard(CardId),
}

/// Authoritative board order, naively maintained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelBoard {
    lists: Vec<(ListId, Vec<CardId>)>,
}

impl ModelBoard {
    /// Model starting from `order`.
    pub fn new(order: BoardOrder) -> Self {
        Self { lists: order }
    }

    /// Current order.
    pub fn order(&self) -> &BoardOrder {
        &self.lists
    }

    /// Cards on the board.
    pub fn card_count(&self) -> usize {
        self.lists.iter().map(|(_, cards)| cards.len()).sum()
    }

    /// Replay a gesture. `Ok(true)` if the board changed, `Ok(false)` for
    /// an accepted no-op.
    pub fn apply(&mut self, gesture: &Gesture) -> Result<bool, ModelError> {
        match *gesture {
            Gesture::CreateCard { list, created } => {
                let cards = self.cards_mut(list)?;
                if let Some(card) = created {
                    cards.push(card);
                }
                Ok(true)
            },
            Gesture::MoveCard { card, source, dest, source_index, dest_index } => {
                if source == dest && source_index == dest_index {
                    return Ok(false);
                }
                self.cards_mut(dest)?;
                let from = self.cards_mut(source)?;
                let Some(at) = from.iter().position(|&c| c == card) else {
                    return Err(ModelError::CardNotInList { card, list: source });
                };
                let before = from.clone();
                from.remove(at);

                let to = self.cards_mut(dest)?;
                let at = dest_index.min(to.len());
                to.insert(at, card);

                Ok(source != dest || self.cards(source) != before.as_slice())
            },
            Gesture::MoveList { list, source_index, dest_index } => {
                if source_index == dest_index {
                    return Ok(false);
                }
                let Some(at) = self.lists.iter().position(|(id, _)| *id == list) else {
                    return Err(ModelError::UnknownList(list));
                };
                let entry = self.lists.remove(at);
                let to = dest_index.min(self.lists.len());
                self.lists.insert(to, entry);
                Ok(at != to)
            },
            Gesture::DeleteCard { card } => {
                for (_, cards) in &mut self.lists {
                    if let Some(at) = cards.iter().position(|&c| c == card) {
                        cards.remove(at);
                        return Ok(true);
                    }
                }
                Err(ModelError::UnknownCard(card))
            },
        }
    }

    fn cards(&self, list: ListId) -> &[CardId] {
        self.lists.iter().find(|(id, _)| *id == list).map_or(&[], |(_, cards)| cards.as_slice())
    }

    fn cards_mut(&mut self, list: ListId) -> Result<&mut Vec<CardId>, ModelError> {
        self.lists
            .iter_mut()
            .find(|(id, _)| *id == list)
            .map(|(_, cards)| cards)
            .ok_or(ModelError::UnknownList(list))
    }
}

/// Run `op` against `world`. Returns the mutation that reached the server,
/// or `None` if nothing did.
pub fn perform<S: Storage>(
    world: &mut SimWorld<S>,
    op: Operation,
) -> Result<Option<Gesture>, WorldError> {
    let clients = world.client_count().max(1);
    let client = |c: u8| usize::from(c) % clients;

    match op {
        Operation::CreateCard { client: c, list } => {
            let index = client(c);
            let Some(view) = world.client_order(index) else { return Ok(None) };
            let Some(&(list_id, _)) = pick(&view, list) else { return Ok(None) };

            let before = world.broadcasts().len();
            let sent = attempt(world, index, ClientEvent::CreateCard(CreateCard {
                list_id,
                title: format!("card from {index}"),
                description: String::new(),
                members: Vec::new(),
                due: None,
                labels: Vec::new(),
            }))?;
            if sent == 0 {
                return Ok(None);
            }
            let created = world.broadcasts()[before..].iter().find_map(|frame| {
                match Payload::from_frame(frame) {
                    Ok(Payload::CardCreated(event)) => Some(event.card.id),
                    _ => None,
                }
            });
            Ok(Some(Gesture::CreateCard { list: list_id, created }))
        },
        Operation::MoveCard { client: c, card, dest_list, dest_index } => {
            let index = client(c);
            let Some(view) = world.client_order(index) else { return Ok(None) };
            let Some((card_id, source, source_index)) = pick_card(&view, card) else {
                return Ok(None);
            };
            let Some((dest, dest_cards)) = pick(&view, dest_list) else { return Ok(None) };
            let dest_index = usize::from(dest_index) % (dest_cards.len() + 2);

            let sent = attempt(world, index, ClientEvent::MoveCard {
                card_id,
                source_list_id: source,
                dest_list_id: *dest,
                source_index: source_index as u32,
                dest_index: dest_index as u32,
            })?;
            Ok((sent > 0).then_some(Gesture::MoveCard {
                card: card_id,
                source,
                dest: *dest,
                source_index,
                dest_index,
            }))
        },
        Operation::MoveList { client: c, list, dest_index } => {
            let index = client(c);
            let Some(view) = world.client_order(index) else { return Ok(None) };
            if view.is_empty() {
                return Ok(None);
            }
            let source_index = usize::from(list) % view.len();
            let dest_index = usize::from(dest_index) % (view.len() + 1);
            let list_id = view[source_index].0;

            let sent = attempt(world, index, ClientEvent::MoveList {
                list_id,
                source_index: source_index as u32,
                dest_index: dest_index as u32,
            })?;
            Ok((sent > 0).then_some(Gesture::MoveList { list: list_id, source_index, dest_index }))
        },
        Operation::DeleteCard { client: c, card } => {
            let index = client(c);
            let Some(view) = world.client_order(index) else { return Ok(None) };
            let Some((card_id, _, _)) = pick_card(&view, card) else { return Ok(None) };

            let sent = attempt(world, index, ClientEvent::DeleteCard { card_id })?;
            Ok((sent > 0).then_some(Gesture::DeleteCard { card: card_id }))
        },
        Operation::Deliver { client: c } => {
            world.deliver(client(c))?;
            Ok(None)
        },
        Operation::LoseInbox { client: c } => {
            world.lose_inbox(client(c));
            Ok(None)
        },
        Operation::Refresh { client: c } => {
            let index = client(c);
            if world.client(index).is_some_and(|cl| cl.board().is_some()) {
                world.act(index, ClientEvent::Refresh)?;
            }
            Ok(None)
        },
        Operation::AdvanceTime { millis } => {
            world.advance(Duration::from_millis(u64::from(millis)))?;
            Ok(None)
        },
    }
}

/// Frames sent for a gesture. A gesture the client's own view refuses
/// (its view can be inconsistent after lost broadcasts) sends nothing.
fn attempt<S: Storage>(
    world: &mut SimWorld<S>,
    index: usize,
    event: ClientEvent,
) -> Result<usize, WorldError> {
    match world.act(index, event) {
        Err(WorldError::Client { source, .. }) => {
            tracing::debug!(index, %source, "gesture refused locally");
            Ok(0)
        },
        other => other,
    }
}

fn pick(view: &BoardOrder, n: u8) -> Option<&(ListId, Vec<CardId>)> {
    if view.is_empty() { None } else { view.get(usize::from(n) % view.len()) }
}

/// Card number `n` across the board, with its list and position.
fn pick_card(view: &BoardOrder, n: u8) -> Option<(CardId, ListId, usize)> {
    let total: usize = view.iter().map(|(_, cards)| cards.len()).sum();
    if total == 0 {
        return None;
    }
    let mut n = usize::from(n) % total;
    for (list_id, cards) in view {
        if n < cards.len() {
            return Some((cards[n], *list_id, n));
        }
        n -= cards.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ListId = ListId::new(1);
    const B: ListId = ListId::new(2);

    fn c(n: u128) -> CardId {
        CardId::new(n)
    }

    fn model() -> ModelBoard {
        ModelBoard::new(vec![(A, vec![c(1), c(2), c(3)]), (B, vec![c(4)])])
    }

    fn mv(card: u128, source: ListId, dest: ListId, si: usize, di: usize) -> Gesture {
        Gesture::MoveCard { card: c(card), source, dest, source_index: si, dest_index: di }
    }

    #[test]
    fn cross_list_move() {
        let mut m = model();
        assert_eq!(m.apply(&mv(2, A, B, 1, 0)), Ok(true));
        assert_eq!(m.order(), &vec![(A, vec![c(1), c(3)]), (B, vec![c(2), c(4)])]);
    }

    #[test]
    fn same_list_array_move_and_noops() {
        let mut m = model();
        assert_eq!(m.apply(&mv(1, A, A, 0, 2)), Ok(true));
        assert_eq!(m.order()[0].1, vec![c(2), c(3), c(1)]);

        assert_eq!(m.apply(&mv(1, A, A, 2, 2)), Ok(false));
        assert_eq!(m.apply(&mv(1, A, A, 0, 9)), Ok(false));
    }

    #[test]
    fn stale_source_is_rejected() {
        let mut m = model();
        assert_eq!(m.apply(&mv(4, A, B, 0, 0)), Err(ModelError::CardNotInList { card: c(4), list: A }));
        assert_eq!(m, model());
    }

    #[test]
    fn list_move_and_delete() {
        let mut m = model();
        assert_eq!(m.apply(&Gesture::MoveList { list: B, source_index: 1, dest_index: 0 }), Ok(true));
        assert_eq!(m.order()[0].0, B);

        assert_eq!(m.apply(&Gesture::DeleteCard { card: c(4) }), Ok(true));
        assert_eq!(m.apply(&Gesture::DeleteCard { card: c(4) }), Err(ModelError::UnknownCard(c(4))));
        assert_eq!(m.card_count(), 3);
    }

    #[test]
    fn pick_card_walks_lists() {
        let view = model().order().clone();
        assert_eq!(pick_card(&view, 3), Some((c(4), B, 0)));
        assert_eq!(pick_card(&view, 4), Some((c(1), A, 0)));
        assert_eq!(pick_card(&BoardOrder::new(), 4), None);
    }
}
