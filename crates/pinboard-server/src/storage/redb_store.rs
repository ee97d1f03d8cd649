//! Durable storage on redb.
//!
//! One table per record kind, keyed by the big-endian bytes of the id, with
//! CBOR values. Each call is its own redb transaction.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use pinboard_proto::{
    BoardId, CardId, ListId, UserId,
    payloads::model::{Card, Notification},
};

use super::{BoardRecord, ListRecord, Storage, StorageError, decode_record, encode_record};

type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

const BOARDS: Table = TableDefinition::new("boards");
const LISTS: Table = TableDefinition::new("lists");
const CARDS: Table = TableDefinition::new("cards");
const TASKS: Table = TableDefinition::new("tasks");
const NOTIFICATIONS: Table = TableDefinition::new("notifications");

/// redb-backed storage. Clones share the database handle.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl RedbStorage {
    /// Open or create the database at `path` and make sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(backend)?;

        let txn = db.begin_write().map_err(backend)?;
        for table in [BOARDS, LISTS, CARDS, TASKS, NOTIFICATIONS] {
            txn.open_table(table).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> Result<Option<T>, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(table).map_err(backend)?;
        match table.get(key).map_err(backend)? {
            Some(guard) => decode_record(guard.value()).map(Some),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, table: Table, key: &[u8], value: &T) -> Result<(), StorageError> {
        let bytes = encode_record(value)?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(table).map_err(backend)?;
            table.insert(key, bytes.as_slice()).map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    fn remove(&self, table: Table, key: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(table).map_err(backend)?;
            table.remove(key).map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }
}

impl Storage for RedbStorage {
    fn load_board(&self, board_id: BoardId) -> Result<Option<BoardRecord>, StorageError> {
        self.get(BOARDS, &board_id.get().to_be_bytes())
    }

    fn store_board(&self, board: &BoardRecord) -> Result<(), StorageError> {
        self.put(BOARDS, &board.id.get().to_be_bytes(), board)
    }

    fn delete_board(&self, board_id: BoardId) -> Result<(), StorageError> {
        self.remove(BOARDS, &board_id.get().to_be_bytes())
    }

    fn load_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
        self.get(LISTS, &list_id.get().to_be_bytes())
    }

    fn store_list(&self, list: &ListRecord) -> Result<(), StorageError> {
        self.put(LISTS, &list.id.get().to_be_bytes(), list)
    }

    fn delete_list(&self, list_id: ListId) -> Result<(), StorageError> {
        self.remove(LISTS, &list_id.get().to_be_bytes())
    }

    fn load_card(&self, card_id: CardId) -> Result<Option<Card>, StorageError> {
        self.get(CARDS, &card_id.get().to_be_bytes())
    }

    fn store_card(&self, card: &Card) -> Result<(), StorageError> {
        self.put(CARDS, &card.id.get().to_be_bytes(), card)
    }

    fn delete_card(&self, card_id: CardId) -> Result<(), StorageError> {
        self.remove(CARDS, &card_id.get().to_be_bytes())
    }

    fn load_tasks(&self, user_id: UserId) -> Result<Vec<CardId>, StorageError> {
        Ok(self.get(TASKS, &user_id.get().to_be_bytes())?.unwrap_or_default())
    }

    fn store_tasks(&self, user_id: UserId, tasks: &[CardId]) -> Result<(), StorageError> {
        let key = user_id.get().to_be_bytes();
        if tasks.is_empty() { self.remove(TASKS, &key) } else { self.put(TASKS, &key, &tasks) }
    }

    fn append_notification(&self, notification: &Notification) -> Result<(), StorageError> {
        let key = notification.recipient.get().to_be_bytes();
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(NOTIFICATIONS).map_err(backend)?;
            let mut inbox: Vec<Notification> = match table.get(key.as_slice()).map_err(backend)? {
                Some(guard) => decode_record(guard.value())?,
                None => Vec::new(),
            };
            inbox.push(notification.clone());
            let bytes = encode_record(&inbox)?;
            table.insert(key.as_slice(), bytes.as_slice()).map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    fn load_notifications(&self, user_id: UserId) -> Result<Vec<Notification>, StorageError> {
        Ok(self.get(NOTIFICATIONS, &user_id.get().to_be_bytes())?.unwrap_or_default())
    }

    fn store_notifications(
        &self,
        user_id: UserId,
        notifications: &[Notification],
    ) -> Result<(), StorageError> {
        let key = user_id.get().to_be_bytes();
        if notifications.is_empty() {
            self.remove(NOTIFICATIONS, &key)
        } else {
            self.put(NOTIFICATIONS, &key, &notifications)
        }
    }
}

fn backend(err: impl Display) -> StorageError {
    StorageError::Backend(err.to_string())
}
