//! Mutation applier.
//!
//! A board mutation touches several records (two lists and a card for a
//! cross-list move; a card, a list and member task sets for a creation).
//! Storage only offers per-record writes, so the applier makes the set of
//! writes all-or-nothing:
//!
//! 1. Snapshot the current value of every record in the write set.
//! 2. Perform the writes in order.
//! 3. If a write fails, restore the snapshots of the records already written,
//!    newest first, then retry the whole set.
//!
//! After `attempts` failed tries the mutation fails with
//! [`ApplyError::Integrity`] and the caller must not broadcast anything.

use pinboard_core::MoveOutcome;
use pinboard_proto::{BoardId, CardId, ListId, UserId, payloads::model::Card};
use thiserror::Error;

use crate::storage::{BoardRecord, ListRecord, Storage, StorageError};

/// Default number of attempts before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// A single record write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert or replace a board.
    Board(BoardRecord),
    /// Insert or replace a list.
    List(ListRecord),
    /// Insert or replace a card.
    Card(Card),
    /// Remove a card.
    DeleteCard(CardId),
    /// Replace a user's task set.
    Tasks {
        /// Assignee.
        user_id: UserId,
        /// New task set.
        tasks: Vec<CardId>,
    },
}

/// Prior state of a record, captured before it is overwritten.
#[derive(Debug, Clone)]
enum Prior {
    Board(BoardId, Option<BoardRecord>),
    List(ListId, Option<ListRecord>),
    Card(CardId, Option<Card>),
    Tasks(UserId, Vec<CardId>),
}

/// Failure to apply a write set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Every attempt failed. Storage holds the pre-mutation state unless
    /// `rollback_failed` is set.
    #[error("mutation not applied after {attempts} attempts: {source}")]
    Integrity {
        /// Attempts made.
        attempts: u32,
        /// Last write failure.
        source: StorageError,
        /// A restore failed; storage may hold a partial mutation.
        rollback_failed: bool,
    },
}

/// Versions of the lists a move wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedMove {
    /// Source list version after the write.
    pub source_version: u64,
    /// Destination list version after the write; `None` for same-list moves.
    pub dest_version: Option<u64>,
}

/// Applies write sets with snapshot, rollback and retry.
#[derive(Debug, Clone, Copy)]
pub struct MutationApplier {
    attempts: u32,
}

impl Default for MutationApplier {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS)
    }
}

impl MutationApplier {
    /// Applier that tries each write set up to `attempts` times (at least
    /// once).
    pub fn new(attempts: u32) -> Self {
        Self { attempts: attempts.max(1) }
    }

    /// Persist a resolved card move.
    ///
    /// Writes the source order, then (cross-list) the destination order and
    /// the card with its new `list_id`.
    pub fn apply_move<S: Storage>(
        &self,
        storage: &S,
        outcome: &MoveOutcome,
        source: &ListRecord,
        dest: Option<&ListRecord>,
        card: &Card,
    ) -> Result<AppliedMove, ApplyError> {
        let source = source.reordered(outcome.source_order.clone());
        let source_version = source.version;
        let mut writes = vec![Write::List(source)];
        let mut dest_version = None;

        if let (Some(order), Some(dest)) = (&outcome.dest_order, dest) {
            let dest = dest.reordered(order.clone());
            dest_version = Some(dest.version);
            writes.push(Write::List(dest));
            writes.push(Write::Card(Card { list_id: outcome.dest_list_id, ..card.clone() }));
        }

        self.apply(storage, &writes)?;
        Ok(AppliedMove { source_version, dest_version })
    }

    /// Apply `writes` all-or-nothing.
    pub fn apply<S: Storage>(&self, storage: &S, writes: &[Write]) -> Result<(), ApplyError> {
        let mut last_error = None;

        for _ in 0..self.attempts {
            match try_apply(storage, writes) {
                Ok(()) => return Ok(()),
                Err(Failure { source, rollback_failed: true }) => {
                    return Err(ApplyError::Integrity {
                        attempts: self.attempts,
                        source,
                        rollback_failed: true,
                    });
                },
                Err(Failure { source, rollback_failed: false }) => last_error = Some(source),
            }
        }

        Err(ApplyError::Integrity {
            attempts: self.attempts,
            source: last_error
                .unwrap_or_else(|| StorageError::Backend("no attempts made".to_owned())),
            rollback_failed: false,
        })
    }
}

struct Failure {
    source: StorageError,
    rollback_failed: bool,
}

fn try_apply<S: Storage>(storage: &S, writes: &[Write]) -> Result<(), Failure> {
    let priors = writes
        .iter()
        .map(|write| snapshot(storage, write))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| Failure { source, rollback_failed: false })?;

    for (index, write) in writes.iter().enumerate() {
        if let Err(source) = perform(storage, write) {
            let rollback_failed = priors[..index]
                .iter()
                .rev()
                .map(|prior| restore(storage, prior))
                .fold(false, |failed, result| failed | result.is_err());
            return Err(Failure { source, rollback_failed });
        }
    }
    Ok(())
}

fn snapshot<S: Storage>(storage: &S, write: &Write) -> Result<Prior, StorageError> {
    Ok(match write {
        Write::Board(board) => Prior::Board(board.id, storage.load_board(board.id)?),
        Write::List(list) => Prior::List(list.id, storage.load_list(list.id)?),
        Write::Card(card) => Prior::Card(card.id, storage.load_card(card.id)?),
        Write::DeleteCard(id) => Prior::Card(*id, storage.load_card(*id)?),
        Write::Tasks { user_id, .. } => Prior::Tasks(*user_id, storage.load_tasks(*user_id)?),
    })
}

fn perform<S: Storage>(storage: &S, write: &Write) -> Result<(), StorageError> {
    match write {
        Write::Board(board) => storage.store_board(board),
        Write::List(list) => storage.store_list(list),
        Write::Card(card) => storage.store_card(card),
        Write::DeleteCard(id) => storage.delete_card(*id),
        Write::Tasks { user_id, tasks } => storage.store_tasks(*user_id, tasks),
    }
}

fn restore<S: Storage>(storage: &S, prior: &Prior) -> Result<(), StorageError> {
    match prior {
        Prior::Board(_, Some(board)) => storage.store_board(board),
        Prior::Board(id, None) => storage.delete_board(*id),
        Prior::List(_, Some(list)) => storage.store_list(list),
        Prior::List(id, None) => storage.delete_list(*id),
        Prior::Card(_, Some(card)) => storage.store_card(card),
        Prior::Card(id, None) => storage.delete_card(*id),
        Prior::Tasks(user_id, tasks) => storage.store_tasks(*user_id, tasks),
    }
}
