//! Frame opcodes.
//!
//! Opcodes are grouped by range:
//!
//! - `0x00xx`: session (handshake, keepalive)
//! - `0x01xx`: board subscription, snapshots and per-user queries
//! - `0x02xx`: mutation requests (client to server)
//! - `0x03xx`: board events (server broadcast)
//! - `0x04xx`: request outcomes (server to initiator)

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Operation carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum Opcode {
    /// Client greeting carrying the authenticated user id.
    Hello = 0x0001,
    /// Server reply assigning a session id.
    HelloReply = 0x0002,
    /// Keepalive request.
    Ping = 0x0003,
    /// Keepalive reply.
    Pong = 0x0004,
    /// Graceful disconnect.
    Goodbye = 0x0005,

    /// Subscribe to a board's broadcast group.
    JoinBoard = 0x0100,
    /// Unsubscribe from a board's broadcast group.
    LeaveBoard = 0x0101,
    /// Request the full board state.
    FetchBoard = 0x0102,
    /// Full board state.
    BoardSnapshot = 0x0103,
    /// Create a board.
    CreateBoard = 0x0104,
    /// Request the sender's notifications.
    FetchNotifications = 0x0105,
    /// The sender's notifications, newest first.
    Notifications = 0x0106,
    /// Mark some or all of the sender's notifications read.
    MarkNotificationsRead = 0x0107,
    /// Request the cards assigned to the sender.
    FetchTasks = 0x0108,
    /// Cards assigned to the sender.
    Tasks = 0x0109,

    /// Move a card within or across lists.
    MoveCard = 0x0200,
    /// Reorder a list within its board.
    MoveList = 0x0201,
    /// Create a card at the end of a list.
    CreateCard = 0x0202,
    /// Update card fields.
    UpdateCard = 0x0203,
    /// Delete a card.
    DeleteCard = 0x0204,
    /// Create a list at the end of a board.
    CreateList = 0x0205,
    /// Add a checklist to a card.
    AddChecklist = 0x0206,
    /// Add an item to a checklist.
    AddChecklistItem = 0x0207,
    /// Update a checklist item.
    UpdateChecklistItem = 0x0208,
    /// Change a list's title.
    RenameList = 0x0209,

    /// A card moved; carries the authoritative sequences.
    CardMoved = 0x0300,
    /// A list moved; carries the board's list sequence.
    ListMoved = 0x0301,
    /// A card was created.
    CardCreated = 0x0302,
    /// A card's fields changed.
    CardUpdated = 0x0303,
    /// A card was deleted.
    CardDeleted = 0x0304,
    /// A list was created.
    ListCreated = 0x0305,
    /// A notification was issued on this board.
    NewNotification = 0x0306,
    /// A list's title changed.
    ListRenamed = 0x0307,

    /// Request accepted.
    Ack = 0x0400,
    /// Request rejected; nothing was persisted or broadcast.
    RequestFailed = 0x0401,
}

impl Opcode {
    /// Raw wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        let opcode = match value {
            0x0001 => Self::Hello,
            0x0002 => Self::HelloReply,
            0x0003 => Self::Ping,
            0x0004 => Self::Pong,
            0x0005 => Self::Goodbye,
            0x0100 => Self::JoinBoard,
            0x0101 => Self::LeaveBoard,
            0x0102 => Self::FetchBoard,
            0x0103 => Self::BoardSnapshot,
            0x0104 => Self::CreateBoard,
            0x0105 => Self::FetchNotifications,
            0x0106 => Self::Notifications,
            0x0107 => Self::MarkNotificationsRead,
            0x0108 => Self::FetchTasks,
            0x0109 => Self::Tasks,
            0x0200 => Self::MoveCard,
            0x0201 => Self::MoveList,
            0x0202 => Self::CreateCard,
            0x0203 => Self::UpdateCard,
            0x0204 => Self::DeleteCard,
            0x0205 => Self::CreateList,
            0x0206 => Self::AddChecklist,
            0x0207 => Self::AddChecklistItem,
            0x0208 => Self::UpdateChecklistItem,
            0x0209 => Self::RenameList,
            0x0300 => Self::CardMoved,
            0x0301 => Self::ListMoved,
            0x0302 => Self::CardCreated,
            0x0303 => Self::CardUpdated,
            0x0304 => Self::CardDeleted,
            0x0305 => Self::ListCreated,
            0x0306 => Self::NewNotification,
            0x0307 => Self::ListRenamed,
            0x0400 => Self::Ack,
            0x0401 => Self::RequestFailed,
            _ => return None,
        };
        Some(opcode)
    }

    /// Whether this opcode mutates board state and requires a board grant.
    pub fn is_mutation(self) -> bool {
        (0x0200..0x0300).contains(&self.to_u16()) || self == Self::CreateBoard
    }

    /// Whether this opcode is a board event fanned out to subscribers.
    pub fn is_board_event(self) -> bool {
        (0x0300..0x0400).contains(&self.to_u16())
    }
}
