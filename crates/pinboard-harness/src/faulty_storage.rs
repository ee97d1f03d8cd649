//! Storage wrapper that fails writes on demand.
//!
//! Reads always pass through. Writes are counted, and a [`FaultPlan`] picks
//! which of them fail with [`StorageError::Injected`]. Restores issued by
//! the mutation applier are ordinary writes, so a long enough failure window
//! also breaks rollback.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use pinboard_proto::{
    BoardId, CardId, ListId, UserId,
    payloads::model::{Card, Notification},
};
use pinboard_server::{BoardRecord, ListRecord, Storage, StorageError};

/// Which upcoming writes fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Writes that still succeed before the window opens.
    pub skip: u64,
    /// Writes that fail once the window is open.
    pub fail: u64,
}

#[derive(Debug, Default)]
struct FaultState {
    writes: AtomicU64,
    injected: AtomicU64,
    plan: Mutex<FaultPlan>,
}

/// [`Storage`] decorator with write fault injection.
#[derive(Debug, Clone)]
pub struct FaultyStorage<S> {
    inner: S,
    state: Arc<FaultState>,
}

impl<S: Storage> FaultyStorage<S> {
    /// Wrap `inner` with no faults planned.
    pub fn new(inner: S) -> Self {
        Self { inner, state: Arc::new(FaultState::default()) }
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: u64) {
        self.plan(FaultPlan { skip: 0, fail: count });
    }

    /// Let `skip` writes through, then fail the following `fail`.
    pub fn fail_after(&self, skip: u64, fail: u64) {
        self.plan(FaultPlan { skip, fail });
    }

    /// Replace the current plan.
    pub fn plan(&self, plan: FaultPlan) {
        *self.state.plan.lock().unwrap_or_else(PoisonError::into_inner) = plan;
    }

    /// Stop injecting.
    pub fn heal(&self) {
        self.plan(FaultPlan::default());
    }

    /// Writes attempted so far, failed ones included.
    pub fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }

    /// Writes that failed by injection.
    pub fn injected(&self) -> u64 {
        self.state.injected.load(Ordering::Relaxed)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn write<T>(
        &self,
        what: &str,
        op: impl FnOnce(&S) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let n = self.state.writes.fetch_add(1, Ordering::Relaxed);

        let fail = {
            let mut plan = self.state.plan.lock().unwrap_or_else(PoisonError::into_inner);
            if plan.skip > 0 {
                plan.skip -= 1;
                false
            } else if plan.fail > 0 {
                plan.fail -= 1;
                true
            } else {
                false
            }
        };

        if fail {
            self.state.injected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(write = n, what, "injecting storage fault");
            return Err(StorageError::Injected(format!("write #{n} ({what})")));
        }
        op(&self.inner)
    }
}

impl<S: Storage> Storage for FaultyStorage<S> {
    fn load_board(&self, board_id: BoardId) -> Result<Option<BoardRecord>, StorageError> {
        self.inner.load_board(board_id)
    }

    fn store_board(&self, board: &BoardRecord) -> Result<(), StorageError> {
        self.write("store_board", |s| s.store_board(board))
    }

    fn delete_board(&self, board_id: BoardId) -> Result<(), StorageError> {
        self.write("delete_board", |s| s.delete_board(board_id))
    }

    fn load_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
        self.inner.load_list(list_id)
    }

    fn store_list(&self, list: &ListRecord) -> Result<(), StorageError> {
        self.write("store_list", |s| s.store_list(list))
    }

    fn delete_list(&self, list_id: ListId) -> Result<(), StorageError> {
        self.write("delete_list", |s| s.delete_list(list_id))
    }

    fn load_card(&self, card_id: CardId) -> Result<Option<Card>, StorageError> {
        self.inner.load_card(card_id)
    }

    fn store_card(&self, card: &Card) -> Result<(), StorageError> {
        self.write("store_card", |s| s.store_card(card))
    }

    fn delete_card(&self, card_id: CardId) -> Result<(), StorageError> {
        self.write("delete_card", |s| s.delete_card(card_id))
    }

    fn load_tasks(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError> {
        self.inner.load_tasks(user_id)
    }

    fn store_tasks(&self, user_id: UserId, tasks: &[CardId]) -> Result<(), StorageError> {
        self.write("store_tasks", |s| s.store_tasks(user_id, tasks))
    }

    fn append_notification(&self, notification: &Notification) -> Result<(), StorageError> {
        self.write("append_notification", |s| s.append_notification(notification))
    }

    fn load_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StorageError> {
        self.inner.load_notifications(user_id)
    }

    fn store_notifications(
        &self,
        user_id: UserId,
        notifications: &[Notification],
    ) -> Result<(), StorageError> {
        self.write("store_notifications", |s| s.store_notifications(user_id, notifications))
    }
}

#[cfg(test)]
mod tests {
    use pinboard_core::Sequence;
    use pinboard_proto::WorkspaceId;
    use pinboard_server::MemoryStorage;

    use super::*;

    fn board(version: u64) -> BoardRecord {
        BoardRecord {
            id: BoardId::new(1),
            title: "b".into(),
            workspace_id: WorkspaceId::new(1),
            lists: Sequence::new(),
            version,
        }
    }

    #[test]
    fn window_fails_exactly_planned_writes() {
        let storage = FaultyStorage::new(MemoryStorage::new());
        storage.fail_after(1, 2);

        assert!(storage.store_board(&board(1)).is_ok());
        assert!(matches!(storage.store_board(&board(2)), Err(StorageError::Injected(_))));
        assert!(storage.store_board(&board(3)).is_err());
        assert!(storage.store_board(&board(4)).is_ok());

        assert_eq!(storage.writes(), 4);
        assert_eq!(storage.injected(), 2);
        assert_eq!(storage.load_board(BoardId::new(1)).unwrap().unwrap().version, 4);
    }

    #[test]
    fn reads_never_fail() {
        let storage = FaultyStorage::new(MemoryStorage::new());
        storage.fail_next_writes(u64::MAX);
        assert!(storage.load_board(BoardId::new(1)).unwrap().is_none());
        assert!(storage.load_tasks(UserId::new(1)).unwrap().is_empty());
        storage.heal();
        assert!(storage.store_board(&board(1)).is_ok());
    }
}
