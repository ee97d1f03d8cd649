//! Board operations.
//!
//! Each operation loads the records it needs, validates the request, runs
//! the pure core logic (resolver or card sub-document update), hands the
//! resulting write set to the [`MutationApplier`] and describes what must be
//! broadcast. Nothing is broadcast unless the write set was applied in full.

use pinboard_core::{
    Environment, MoveRequest, Resolution, Sequence,
    card::{self, PatchEffect},
    error::{CardError, ResolveError},
    resolver,
};
use pinboard_proto::{
    BoardId, CardId, ChecklistId, ChecklistItemId, ListId, NotificationId, UserId,
    payloads::{
        Payload,
        events::{
            BoardSnapshot, CardCreated, CardDeleted, CardUpdated, ListCreated, ListMoved,
            ListRenamed,
        },
        model::{Card, ListSnapshot, Notification},
        outcome::{EntityRef, ErrorKind},
        requests::{
            AddChecklist, AddChecklistItem, CreateBoard, CreateCard, CreateList, DeleteCard,
            MarkNotificationsRead, MoveCard, MoveList, RenameList, UpdateCard,
            UpdateChecklistItem,
        },
    },
};
use thiserror::Error;

use crate::{
    applier::{ApplyError, MutationApplier, Write},
    config::{ConcurrencyPolicy, DriverConfig},
    notify,
    storage::{BoardRecord, ListRecord, Storage, StorageError},
};

/// Board operation failures. Nothing was written and nothing is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Board does not exist.
    #[error("{0} not found")]
    BoardNotFound(BoardId),

    /// List does not exist.
    #[error("unknown list {0}")]
    ListNotFound(ListId),

    /// Card does not exist.
    #[error("{0} not found")]
    CardNotFound(CardId),

    /// Notification is not in the sender's inbox.
    #[error("{0} not found")]
    NotificationNotFound(NotificationId),

    /// List belongs to a different board than the request targets.
    #[error("{list_id} is not on {board_id}")]
    ListNotOnBoard {
        /// List named by the request.
        list_id: ListId,
        /// Board named by the frame header.
        board_id: BoardId,
    },

    /// Card belongs to a different board than the request targets.
    #[error("{card_id} is not on {board_id}")]
    CardNotOnBoard {
        /// Card named by the request.
        card_id: CardId,
        /// Board named by the frame header.
        board_id: BoardId,
    },

    /// Titles must contain something other than whitespace.
    #[error("title must not be empty")]
    EmptyTitle,

    /// The server requires version guards and the request carried none.
    #[error("request must carry the versions it was based on")]
    MissingExpectedVersion,

    /// The request was based on an outdated version.
    #[error("stale version: based on {expected}, current is {actual}")]
    StaleVersion {
        /// Version the client saw.
        expected: u64,
        /// Version in storage.
        actual: u64,
    },

    /// A sequence names a card with no stored record.
    #[error("{0} is sequenced but has no record")]
    MissingCardRecord(CardId),

    /// A card's `list_id` disagrees with the sequence that contains it.
    #[error("{card_id} is sequenced in {sequenced_in} but records {recorded}")]
    CardListMismatch {
        /// Card.
        card_id: CardId,
        /// List whose sequence contains it.
        sequenced_in: ListId,
        /// List its record names.
        recorded: ListId,
    },

    /// A card's record names a list whose sequence does not contain it.
    #[error("{card_id} records {list_id} but is not in its sequence")]
    CardNotSequenced {
        /// Card.
        card_id: CardId,
        /// List its record names.
        list_id: ListId,
    },

    /// Move resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Card sub-document update failed.
    #[error(transparent)]
    Card(#[from] CardError),

    /// The write set could not be applied.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// Reading current state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BoardError {
    /// Wire-level failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BoardNotFound(_) | Self::CardNotFound(_) | Self::NotificationNotFound(_) => {
                ErrorKind::NotFound
            },
            Self::ListNotFound(_)
            | Self::ListNotOnBoard { .. }
            | Self::CardNotOnBoard { .. }
            | Self::EmptyTitle
            | Self::MissingExpectedVersion => ErrorKind::Validation,
            Self::StaleVersion { .. } => ErrorKind::StaleVersion,
            Self::MissingCardRecord(_)
            | Self::CardListMismatch { .. }
            | Self::CardNotSequenced { .. } => ErrorKind::InconsistentState,
            Self::Resolve(e) => e.kind(),
            Self::Card(e) => e.kind(),
            Self::Apply(_) | Self::Storage(_) => ErrorKind::Integrity,
        }
    }

    /// Whether storage may now hold a partially applied mutation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Apply(ApplyError::Integrity { rollback_failed: true, .. }))
    }
}

/// Everything a successful operation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    /// Entity created by the operation, acknowledged to the initiator.
    pub created: Option<EntityRef>,
    /// Events for every subscriber of the board, in order.
    pub events: Vec<Payload>,
    /// Stored notifications to announce on the board.
    pub notifications: Vec<Notification>,
    /// Non-fatal problems worth logging.
    pub warnings: Vec<String>,
}

impl Mutation {
    fn created(entity: EntityRef) -> Self {
        Self { created: Some(entity), ..Self::default() }
    }

    fn event(mut self, event: Payload) -> Self {
        self.events.push(event);
        self
    }

    /// Whether the operation changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_none() && self.events.is_empty()
    }
}

/// Executes board operations against a storage backend.
#[derive(Debug, Clone)]
pub struct BoardManager {
    applier: MutationApplier,
    concurrency: ConcurrencyPolicy,
}

impl Default for BoardManager {
    fn default() -> Self {
        Self::new(&DriverConfig::default())
    }
}

impl BoardManager {
    /// Manager using the configured concurrency policy and retry count.
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            applier: MutationApplier::new(config.apply_attempts),
            concurrency: config.concurrency,
        }
    }

    /// Whether a board exists.
    pub fn has_board<S: Storage>(&self, storage: &S, board_id: BoardId) -> Result<bool, BoardError> {
        Ok(storage.load_board(board_id)?.is_some())
    }

    /// Create an empty board.
    pub fn create_board<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        request: &CreateBoard,
    ) -> Result<Mutation, BoardError> {
        let board = BoardRecord {
            id: BoardId::new(env.random_u128()),
            title: title(&request.title)?,
            workspace_id: request.workspace_id,
            lists: Sequence::new(),
            version: 0,
        };
        let id = board.id;

        self.applier.apply(storage, &[Write::Board(board)])?;
        Ok(Mutation::created(EntityRef::Board(id)))
    }

    /// Append an empty list to a board.
    pub fn create_list<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        board_id: BoardId,
        request: &CreateList,
    ) -> Result<Mutation, BoardError> {
        let board = load_board(storage, board_id)?;
        let list = ListRecord {
            id: ListId::new(env.random_u128()),
            title: title(&request.title)?,
            board_id,
            cards: Sequence::new(),
            version: 0,
        };
        let board = BoardRecord {
            lists: board.lists.with_appended(list.id),
            version: board.version + 1,
            ..board
        };

        self.applier.apply(storage, &[Write::List(list.clone()), Write::Board(board.clone())])?;

        Ok(Mutation::created(EntityRef::List(list.id)).event(Payload::ListCreated(ListCreated {
            list: ListSnapshot { id: list.id, title: list.title, version: list.version, cards: vec![] },
            board_sequence: board.lists.into_vec(),
            board_version: board.version,
        })))
    }

    /// Retitle a list. Its card order and version are untouched.
    pub fn rename_list<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
        request: &RenameList,
    ) -> Result<Mutation, BoardError> {
        let list = list_on(storage, board_id, request.list_id)?;
        let title = title(&request.title)?;
        if title == list.title {
            return Ok(Mutation::default());
        }

        let list = ListRecord { title, ..list };
        self.applier.apply(storage, &[Write::List(list.clone())])?;
        Ok(Mutation::default()
            .event(Payload::ListRenamed(ListRenamed { list_id: list.id, title: list.title })))
    }

    /// Move a card within or between lists of a board.
    pub fn move_card<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        sender: UserId,
        board_id: BoardId,
        request: &MoveCard,
    ) -> Result<Mutation, BoardError> {
        let move_request = MoveRequest::from(request);
        let source = list_on(storage, board_id, request.source_list_id)?;
        let dest = if move_request.is_same_list() {
            None
        } else {
            Some(list_on(storage, board_id, request.dest_list_id)?)
        };

        if self.concurrency == ConcurrencyPolicy::RejectStale {
            let expected = request.expected_versions.ok_or(BoardError::MissingExpectedVersion)?;
            check_version(expected.source, source.version)?;
            if let Some(dest) = &dest {
                check_version(
                    expected.dest.ok_or(BoardError::MissingExpectedVersion)?,
                    dest.version,
                )?;
            }
        }

        let dest_order = dest.as_ref().map_or(&source.cards, |d| &d.cards);
        let outcome = match resolver::resolve(&move_request, &source.cards, dest_order)? {
            Resolution::Unchanged => return Ok(Mutation::default()),
            Resolution::Moved(outcome) => outcome,
        };

        let card = storage
            .load_card(request.card_id)?
            .ok_or(BoardError::MissingCardRecord(request.card_id))?;
        if card.list_id != source.id {
            return Err(BoardError::CardListMismatch {
                card_id: card.id,
                sequenced_in: source.id,
                recorded: card.list_id,
            });
        }

        let applied = self.applier.apply_move(storage, &outcome, &source, dest.as_ref(), &card)?;

        let mut mutation = Mutation::default().event(Payload::CardMoved(
            outcome.to_event(applied.source_version, applied.dest_version),
        ));
        if let Some(dest) = &dest {
            let notes = notify::card_moved(env, &card, sender, &source.title, &dest.title);
            store_notifications(storage, notes, &mut mutation);
        }
        Ok(mutation)
    }

    /// Reorder a list within its board.
    pub fn move_list<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
        request: &MoveList,
    ) -> Result<Mutation, BoardError> {
        let board = load_board(storage, board_id)?;

        if self.concurrency == ConcurrencyPolicy::RejectStale {
            let expected = request.expected_version.ok_or(BoardError::MissingExpectedVersion)?;
            check_version(expected, board.version)?;
        }

        let Some(order) = resolver::resolve_list_move(
            board_id,
            request.list_id,
            request.source_index as usize,
            request.dest_index as usize,
            &board.lists,
        )?
        else {
            return Ok(Mutation::default());
        };

        let board = BoardRecord { lists: order, version: board.version + 1, ..board };
        self.applier.apply(storage, &[Write::Board(board.clone())])?;

        Ok(Mutation::default().event(Payload::ListMoved(ListMoved {
            list_id: request.list_id,
            sequence: board.lists.into_vec(),
            version: board.version,
        })))
    }

    /// Create a card at the end of a list and assign its members.
    pub fn create_card<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        sender: UserId,
        board_id: BoardId,
        request: &CreateCard,
    ) -> Result<Mutation, BoardError> {
        let list = list_on(storage, board_id, request.list_id)?;
        let card = card::new_card(CardId::new(env.random_u128()), board_id, request)?;
        let list = list.reordered(list.cards.with_appended(card.id));

        let mut writes = vec![Write::Card(card.clone()), Write::List(list.clone())];
        writes.extend(task_writes(storage, card.id, &card.members, &[])?);
        self.applier.apply(storage, &writes)?;

        let mut mutation =
            Mutation::created(EntityRef::Card(card.id)).event(Payload::CardCreated(CardCreated {
                card: card.clone(),
                sequence: list.cards.into_vec(),
                list_version: list.version,
            }));
        let notes = notify::assigned(env, &card, sender, &card.members, true);
        store_notifications(storage, notes, &mut mutation);
        Ok(mutation)
    }

    /// Update a card's fields. Never changes its list.
    pub fn update_card<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        sender: UserId,
        board_id: BoardId,
        request: &UpdateCard,
    ) -> Result<Mutation, BoardError> {
        let mut card = card_on(storage, board_id, request.card_id)?;
        let PatchEffect { added_members, removed_members, due_changed } =
            card::apply_patch(&mut card, &request.patch)?;

        let mut writes = vec![Write::Card(card.clone())];
        writes.extend(task_writes(storage, card.id, &added_members, &removed_members)?);
        self.applier.apply(storage, &writes)?;

        let mut mutation =
            Mutation::default().event(Payload::CardUpdated(CardUpdated { card: card.clone() }));
        let mut notes = notify::assigned(env, &card, sender, &added_members, false);
        if due_changed {
            notes.extend(notify::due_changed(env, &card, sender));
        }
        store_notifications(storage, notes, &mut mutation);
        Ok(mutation)
    }

    /// Delete a card, removing it from its list and from member task sets.
    pub fn delete_card<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
        request: &DeleteCard,
    ) -> Result<Mutation, BoardError> {
        let card = card_on(storage, board_id, request.card_id)?;
        let list = storage.load_list(card.list_id)?.ok_or(BoardError::ListNotFound(card.list_id))?;
        let order = list
            .cards
            .without(card.id)
            .ok_or(BoardError::CardNotSequenced { card_id: card.id, list_id: list.id })?;
        let list = list.reordered(order);

        let mut writes = vec![Write::DeleteCard(card.id), Write::List(list.clone())];
        writes.extend(task_writes(storage, card.id, &[], &card.members)?);
        self.applier.apply(storage, &writes)?;

        Ok(Mutation::default().event(Payload::CardDeleted(CardDeleted {
            card_id: card.id,
            list_id: list.id,
            sequence: list.cards.into_vec(),
            list_version: list.version,
        })))
    }

    /// Append a checklist to a card.
    pub fn add_checklist<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        board_id: BoardId,
        request: &AddChecklist,
    ) -> Result<Mutation, BoardError> {
        let id = ChecklistId::new(env.random_u128());
        self.update_card_document(storage, board_id, request.card_id, EntityRef::Checklist(id), |doc| {
            card::add_checklist(doc, id, &request.title)
        })
    }

    /// Append an item to a checklist.
    pub fn add_checklist_item<E: Environment, S: Storage>(
        &self,
        env: &E,
        storage: &S,
        board_id: BoardId,
        request: &AddChecklistItem,
    ) -> Result<Mutation, BoardError> {
        let id = ChecklistItemId::new(env.random_u128());
        self.update_card_document(
            storage,
            board_id,
            request.card_id,
            EntityRef::ChecklistItem(id),
            |doc| card::add_checklist_item(doc, request.checklist_id, id, &request.text),
        )
    }

    /// Change a checklist item's text or completion flag.
    pub fn update_checklist_item<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
        request: &UpdateChecklistItem,
    ) -> Result<Mutation, BoardError> {
        let mut card = card_on(storage, board_id, request.card_id)?;
        card::update_checklist_item(
            &mut card,
            request.checklist_id,
            request.item_id,
            request.text.as_deref(),
            request.is_complete,
        )?;
        self.applier.apply(storage, &[Write::Card(card.clone())])?;
        Ok(Mutation::default().event(Payload::CardUpdated(CardUpdated { card })))
    }

    /// Full board state in display order.
    ///
    /// Sequenced ids with no stored record are skipped.
    pub fn snapshot<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
    ) -> Result<BoardSnapshot, BoardError> {
        let board = load_board(storage, board_id)?;
        let mut lists = Vec::with_capacity(board.lists.len());

        for &list_id in &board.lists {
            let Some(list) = storage.load_list(list_id)? else {
                continue;
            };
            let mut cards = Vec::with_capacity(list.cards.len());
            for &card_id in &list.cards {
                if let Some(card) = storage.load_card(card_id)? {
                    cards.push(card);
                }
            }
            lists.push(ListSnapshot { id: list.id, title: list.title, version: list.version, cards });
        }

        Ok(BoardSnapshot { board: board.summary(), lists })
    }

    /// A user's inbox, newest first.
    pub fn notifications<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
    ) -> Result<Vec<Notification>, BoardError> {
        let mut inbox = storage.load_notifications(user_id)?;
        inbox.reverse();
        Ok(inbox)
    }

    /// Mark notifications in `user_id`'s inbox read and return how many
    /// changed. An empty id list marks the whole inbox. An id outside the
    /// inbox rejects the request before anything is written.
    pub fn mark_notifications_read<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        request: &MarkNotificationsRead,
    ) -> Result<usize, BoardError> {
        let mut inbox = storage.load_notifications(user_id)?;
        if let Some(&missing) =
            request.ids.iter().find(|id| !inbox.iter().any(|note| note.id == **id))
        {
            return Err(BoardError::NotificationNotFound(missing));
        }

        let mut changed = 0;
        for note in &mut inbox {
            if !note.is_read && (request.ids.is_empty() || request.ids.contains(&note.id)) {
                note.is_read = true;
                changed += 1;
            }
        }
        if changed > 0 {
            storage.store_notifications(user_id, &inbox)?;
        }
        Ok(changed)
    }

    /// Cards assigned to a user, in assignment order. Task entries whose
    /// card record is gone are skipped.
    pub fn tasks<S: Storage>(&self, storage: &S, user_id: UserId) -> Result<Vec<Card>, BoardError> {
        let mut cards = Vec::new();
        for card_id in storage.load_tasks(user_id)? {
            if let Some(card) = storage.load_card(card_id)? {
                cards.push(card);
            }
        }
        Ok(cards)
    }

    fn update_card_document<S: Storage>(
        &self,
        storage: &S,
        board_id: BoardId,
        card_id: CardId,
        created: EntityRef,
        update: impl FnOnce(&mut Card) -> Result<(), CardError>,
    ) -> Result<Mutation, BoardError> {
        let mut card = card_on(storage, board_id, card_id)?;
        update(&mut card)?;
        self.applier.apply(storage, &[Write::Card(card.clone())])?;
        Ok(Mutation::created(created).event(Payload::CardUpdated(CardUpdated { card })))
    }
}

fn title(raw: &str) -> Result<String, BoardError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { Err(BoardError::EmptyTitle) } else { Ok(trimmed.to_owned()) }
}

fn check_version(expected: u64, actual: u64) -> Result<(), BoardError> {
    if expected == actual { Ok(()) } else { Err(BoardError::StaleVersion { expected, actual }) }
}

fn load_board<S: Storage>(storage: &S, board_id: BoardId) -> Result<BoardRecord, BoardError> {
    storage.load_board(board_id)?.ok_or(BoardError::BoardNotFound(board_id))
}

fn list_on<S: Storage>(
    storage: &S,
    board_id: BoardId,
    list_id: ListId,
) -> Result<ListRecord, BoardError> {
    let list = storage.load_list(list_id)?.ok_or(BoardError::ListNotFound(list_id))?;
    if list.board_id != board_id {
        return Err(BoardError::ListNotOnBoard { list_id, board_id });
    }
    Ok(list)
}

fn card_on<S: Storage>(storage: &S, board_id: BoardId, card_id: CardId) -> Result<Card, BoardError> {
    let card = storage.load_card(card_id)?.ok_or(BoardError::CardNotFound(card_id))?;
    if card.board_id != board_id {
        return Err(BoardError::CardNotOnBoard { card_id, board_id });
    }
    Ok(card)
}

/// Task-set writes adding `card_id` for `added` and removing it for
/// `removed`.
fn task_writes<S: Storage>(
    storage: &S,
    card_id: CardId,
    added: &[UserId],
    removed: &[UserId],
) -> Result<Vec<Write>, BoardError> {
    let mut writes = Vec::with_capacity(added.len() + removed.len());
    for &user_id in added {
        let mut tasks = storage.load_tasks(user_id)?;
        if !tasks.contains(&card_id) {
            tasks.push(card_id);
            writes.push(Write::Tasks { user_id, tasks });
        }
    }
    for &user_id in removed {
        let mut tasks = storage.load_tasks(user_id)?;
        let before = tasks.len();
        tasks.retain(|&id| id != card_id);
        if tasks.len() != before {
            writes.push(Write::Tasks { user_id, tasks });
        }
    }
    Ok(writes)
}

/// Persist notifications after the mutation itself has been applied. A
/// failure here does not undo the mutation; the notification is dropped and
/// logged.
fn store_notifications<S: Storage>(storage: &S, notes: Vec<Notification>, mutation: &mut Mutation) {
    for note in notes {
        match storage.append_notification(&note) {
            Ok(()) => mutation.notifications.push(note),
            Err(e) => mutation
                .warnings
                .push(format!("dropped notification for {}: {e}", note.recipient)),
        }
    }
}
