//! In-memory storage for tests and ephemeral servers.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use pinboard_proto::{
    BoardId, CardId, ListId, UserId,
    payloads::model::{Card, Notification},
};

use super::{BoardRecord, ListRecord, Storage, StorageError};

#[derive(Debug, Default)]
struct Tables {
    boards: HashMap<BoardId, BoardRecord>,
    lists: HashMap<ListId, ListRecord>,
    cards: HashMap<CardId, Card>,
    tasks: HashMap<UserId, Vec<CardId>>,
    notifications: HashMap<UserId, Vec<Notification>>,
}

/// Storage backed by hash maps. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cards.
    pub fn card_count(&self) -> usize {
        self.read().map(|t| t.cards.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Storage for MemoryStorage {
    fn load_board(&self, board_id: BoardId) -> Result<Option<BoardRecord>, StorageError> {
        Ok(self.read()?.boards.get(&board_id).cloned())
    }

    fn store_board(&self, board: &BoardRecord) -> Result<(), StorageError> {
        self.write()?.boards.insert(board.id, board.clone());
        Ok(())
    }

    fn delete_board(&self, board_id: BoardId) -> Result<(), StorageError> {
        self.write()?.boards.remove(&board_id);
        Ok(())
    }

    fn load_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
        Ok(self.read()?.lists.get(&list_id).cloned())
    }

    fn store_list(&self, list: &ListRecord) -> Result<(), StorageError> {
        self.write()?.lists.insert(list.id, list.clone());
        Ok(())
    }

    fn delete_list(&self, list_id: ListId) -> Result<(), StorageError> {
        self.write()?.lists.remove(&list_id);
        Ok(())
    }

    fn load_card(&self, card_id: CardId) -> Result<Option<Card>, StorageError> {
        Ok(self.read()?.cards.get(&card_id).cloned())
    }

    fn store_card(&self, card: &Card) -> Result<(), StorageError> {
        self.write()?.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn delete_card(&self, card_id: CardId) -> Result<(), StorageError> {
        self.write()?.cards.remove(&card_id);
        Ok(())
    }

    fn load_tasks(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError> {
        Ok(self.read()?.tasks.get(&user_id).cloned().unwrap_or_default())
    }

    fn store_tasks(&self, user_id: UserId, tasks: &[CardId]) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if tasks.is_empty() {
            tables.tasks.remove(&user_id);
        } else {
            tables.tasks.insert(user_id, tasks.to_vec());
        }
        Ok(())
    }

    fn append_notification(&self, notification: &Notification) -> Result<(), StorageError> {
        self.write()?
            .notifications
            .entry(notification.recipient)
            .or_default()
            .push(notification.clone());
        Ok(())
    }

    fn load_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StorageError> {
        Ok(self.read()?.notifications.get(&user_id).cloned().unwrap_or_default())
    }

    fn store_notifications(
        &self,
        user_id: UserId,
        notifications: &[Notification],
    ) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if notifications.is_empty() {
            tables.notifications.remove(&user_id);
        } else {
            tables.notifications.insert(user_id, notifications.to_vec());
        }
        Ok(())
    }
}
