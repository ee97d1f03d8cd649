//! Typed frame payloads.
//!
//! The opcode in the header selects the payload type; the payload itself is
//! CBOR. [`Payload`] ties the two together so callers never pair an opcode
//! with the wrong body.

pub mod events;
pub mod model;
pub mod outcome;
pub mod requests;
pub mod session;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    header::FrameHeader,
    opcodes::Opcode,
};

/// Every payload the protocol carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Client greeting.
    Hello(session::Hello),
    /// Session assignment.
    HelloReply(session::HelloReply),
    /// Keepalive request.
    Ping,
    /// Keepalive reply.
    Pong,
    /// Graceful disconnect.
    Goodbye(session::Goodbye),

    /// Subscribe to the header's board.
    JoinBoard,
    /// Unsubscribe from the header's board.
    LeaveBoard,
    /// Request the header's board state.
    FetchBoard,
    /// Full board state.
    BoardSnapshot(events::BoardSnapshot),
    /// Create a board.
    CreateBoard(requests::CreateBoard),
    /// Request the sender's notifications.
    FetchNotifications,
    /// The sender's notifications.
    Notifications(outcome::Notifications),
    /// Mark notifications read.
    MarkNotificationsRead(requests::MarkNotificationsRead),
    /// Request the sender's assigned cards.
    FetchTasks,
    /// The sender's assigned cards.
    Tasks(outcome::Tasks),

    /// Move a card.
    MoveCard(requests::MoveCard),
    /// Reorder a list.
    MoveList(requests::MoveList),
    /// Create a card.
    CreateCard(requests::CreateCard),
    /// Update card fields.
    UpdateCard(requests::UpdateCard),
    /// Delete a card.
    DeleteCard(requests::DeleteCard),
    /// Create a list.
    CreateList(requests::CreateList),
    /// Add a checklist.
    AddChecklist(requests::AddChecklist),
    /// Add a checklist item.
    AddChecklistItem(requests::AddChecklistItem),
    /// Update a checklist item.
    UpdateChecklistItem(requests::UpdateChecklistItem),
    /// Rename a list.
    RenameList(requests::RenameList),

    /// Card moved.
    CardMoved(events::CardMoved),
    /// List moved.
    ListMoved(events::ListMoved),
    /// Card created.
    CardCreated(events::CardCreated),
    /// Card updated.
    CardUpdated(events::CardUpdated),
    /// Card deleted.
    CardDeleted(events::CardDeleted),
    /// List created.
    ListCreated(events::ListCreated),
    /// Notification issued.
    NewNotification(events::NewNotification),
    /// List renamed.
    ListRenamed(events::ListRenamed),

    /// Request accepted.
    Ack(outcome::Ack),
    /// Request rejected.
    RequestFailed(outcome::RequestFailed),
}

impl Payload {
    /// Opcode that identifies this payload on the wire.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::JoinBoard => Opcode::JoinBoard,
            Self::LeaveBoard => Opcode::LeaveBoard,
            Self::FetchBoard => Opcode::FetchBoard,
            Self::BoardSnapshot(_) => Opcode::BoardSnapshot,
            Self::CreateBoard(_) => Opcode::CreateBoard,
            Self::FetchNotifications => Opcode::FetchNotifications,
            Self::Notifications(_) => Opcode::Notifications,
            Self::MarkNotificationsRead(_) => Opcode::MarkNotificationsRead,
            Self::FetchTasks => Opcode::FetchTasks,
            Self::Tasks(_) => Opcode::Tasks,
            Self::MoveCard(_) => Opcode::MoveCard,
            Self::MoveList(_) => Opcode::MoveList,
            Self::CreateCard(_) => Opcode::CreateCard,
            Self::UpdateCard(_) => Opcode::UpdateCard,
            Self::DeleteCard(_) => Opcode::DeleteCard,
            Self::CreateList(_) => Opcode::CreateList,
            Self::AddChecklist(_) => Opcode::AddChecklist,
            Self::AddChecklistItem(_) => Opcode::AddChecklistItem,
            Self::UpdateChecklistItem(_) => Opcode::UpdateChecklistItem,
            Self::RenameList(_) => Opcode::RenameList,
            Self::CardMoved(_) => Opcode::CardMoved,
            Self::ListMoved(_) => Opcode::ListMoved,
            Self::CardCreated(_) => Opcode::CardCreated,
            Self::CardUpdated(_) => Opcode::CardUpdated,
            Self::CardDeleted(_) => Opcode::CardDeleted,
            Self::ListCreated(_) => Opcode::ListCreated,
            Self::NewNotification(_) => Opcode::NewNotification,
            Self::ListRenamed(_) => Opcode::ListRenamed,
            Self::Ack(_) => Opcode::Ack,
            Self::RequestFailed(_) => Opcode::RequestFailed,
        }
    }

    /// Encode into a frame. The header's opcode is overwritten to match the
    /// payload; every other header field is kept.
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        header.set_opcode(self.opcode());

        let body = match &self {
            Self::Ping
            | Self::Pong
            | Self::JoinBoard
            | Self::LeaveBoard
            | Self::FetchBoard
            | Self::FetchNotifications
            | Self::FetchTasks => Vec::new(),
            Self::Hello(p) => encode(p)?,
            Self::HelloReply(p) => encode(p)?,
            Self::Goodbye(p) => encode(p)?,
            Self::BoardSnapshot(p) => encode(p)?,
            Self::CreateBoard(p) => encode(p)?,
            Self::Notifications(p) => encode(p)?,
            Self::MarkNotificationsRead(p) => encode(p)?,
            Self::Tasks(p) => encode(p)?,
            Self::MoveCard(p) => encode(p)?,
            Self::MoveList(p) => encode(p)?,
            Self::CreateCard(p) => encode(p)?,
            Self::UpdateCard(p) => encode(p)?,
            Self::DeleteCard(p) => encode(p)?,
            Self::CreateList(p) => encode(p)?,
            Self::AddChecklist(p) => encode(p)?,
            Self::AddChecklistItem(p) => encode(p)?,
            Self::UpdateChecklistItem(p) => encode(p)?,
            Self::RenameList(p) => encode(p)?,
            Self::CardMoved(p) => encode(p)?,
            Self::ListMoved(p) => encode(p)?,
            Self::CardCreated(p) => encode(p)?,
            Self::CardUpdated(p) => encode(p)?,
            Self::CardDeleted(p) => encode(p)?,
            Self::ListCreated(p) => encode(p)?,
            Self::NewNotification(p) => encode(p)?,
            Self::ListRenamed(p) => encode(p)?,
            Self::Ack(p) => encode(p)?,
            Self::RequestFailed(p) => encode(p)?,
        };

        if body.len() > Frame::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: body.len(),
                max: Frame::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Frame::new(header, body))
    }

    /// Decode the payload selected by the frame's opcode.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        let bytes = frame.payload.as_ref();

        let payload = match opcode {
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::JoinBoard => Self::JoinBoard,
            Opcode::LeaveBoard => Self::LeaveBoard,
            Opcode::FetchBoard => Self::FetchBoard,
            Opcode::FetchNotifications => Self::FetchNotifications,
            Opcode::FetchTasks => Self::FetchTasks,
            Opcode::Hello => Self::Hello(decode(bytes)?),
            Opcode::HelloReply => Self::HelloReply(decode(bytes)?),
            Opcode::Goodbye => Self::Goodbye(decode(bytes)?),
            Opcode::BoardSnapshot => Self::BoardSnapshot(decode(bytes)?),
            Opcode::CreateBoard => Self::CreateBoard(decode(bytes)?),
            Opcode::Notifications => Self::Notifications(decode(bytes)?),
            Opcode::MarkNotificationsRead => Self::MarkNotificationsRead(decode(bytes)?),
            Opcode::Tasks => Self::Tasks(decode(bytes)?),
            Opcode::MoveCard => Self::MoveCard(decode(bytes)?),
            Opcode::MoveList => Self::MoveList(decode(bytes)?),
            Opcode::CreateCard => Self::CreateCard(decode(bytes)?),
            Opcode::UpdateCard => Self::UpdateCard(decode(bytes)?),
            Opcode::DeleteCard => Self::DeleteCard(decode(bytes)?),
            Opcode::CreateList => Self::CreateList(decode(bytes)?),
            Opcode::AddChecklist => Self::AddChecklist(decode(bytes)?),
            Opcode::AddChecklistItem => Self::AddChecklistItem(decode(bytes)?),
            Opcode::UpdateChecklistItem => Self::UpdateChecklistItem(decode(bytes)?),
            Opcode::RenameList => Self::RenameList(decode(bytes)?),
            Opcode::CardMoved => Self::CardMoved(decode(bytes)?),
            Opcode::ListMoved => Self::ListMoved(decode(bytes)?),
            Opcode::CardCreated => Self::CardCreated(decode(bytes)?),
            Opcode::CardUpdated => Self::CardUpdated(decode(bytes)?),
            Opcode::CardDeleted => Self::CardDeleted(decode(bytes)?),
            Opcode::ListCreated => Self::ListCreated(decode(bytes)?),
            Opcode::NewNotification => Self::NewNotification(decode(bytes)?),
            Opcode::ListRenamed => Self::ListRenamed(decode(bytes)?),
            Opcode::Ack => Self::Ack(decode(bytes)?),
            Opcode::RequestFailed => Self::RequestFailed(decode(bytes)?),
        };

        Ok(payload)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BoardId, CardId, ListId, UserId};

    fn card_moved(dest_sequence: Option<Vec<CardId>>) -> events::CardMoved {
        events::CardMoved {
            card_id: CardId::new(2),
            source_list_id: ListId::new(10),
            dest_list_id: if dest_sequence.is_some() { ListId::new(11) } else { ListId::new(10) },
            source_sequence: vec![CardId::new(1), CardId::new(3)],
            dest_sequence,
            source_version: 4,
            dest_version: None,
        }
    }

    #[test]
    fn into_frame_sets_opcode_and_keeps_routing() {
        let mut header = FrameHeader::new(Opcode::Ping);
        header.set_board_id(BoardId::new(99));
        header.set_sender_id(UserId::new(5));

        let frame = Payload::CardMoved(card_moved(None)).into_frame(header).unwrap();

        assert_eq!(frame.header.opcode_enum(), Some(Opcode::CardMoved));
        assert_eq!(frame.header.board_id(), BoardId::new(99));
        assert_eq!(frame.header.sender_id(), UserId::new(5));
        assert_eq!(frame.header.payload_size() as usize, frame.payload.len());
    }

    #[test]
    fn same_list_move_omits_dest_sequence() {
        let same = Payload::CardMoved(card_moved(None))
            .into_frame(FrameHeader::new(Opcode::CardMoved))
            .unwrap();
        let cross = Payload::CardMoved(card_moved(Some(vec![CardId::new(2)])))
            .into_frame(FrameHeader::new(Opcode::CardMoved))
            .unwrap();

        assert!(same.payload.len() < cross.payload.len());

        let Payload::CardMoved(decoded) = Payload::from_frame(&same).unwrap() else {
            panic!("expected CardMoved");
        };
        assert_eq!(decoded.dest_sequence, None);
        assert!(decoded.is_same_list());
    }

    #[test]
    fn empty_payloads_have_no_body() {
        let frame = Payload::JoinBoard.into_frame(FrameHeader::new(Opcode::Ping)).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(Payload::from_frame(&frame).unwrap(), Payload::JoinBoard);
    }

    #[test]
    fn garbage_body_is_decode_error() {
        let frame = Frame::new(FrameHeader::new(Opcode::MoveCard), vec![0xff, 0x00, 0x13]);
        assert!(matches!(Payload::from_frame(&frame), Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn request_failed_round_trip() {
        let payload = Payload::RequestFailed(outcome::RequestFailed {
            kind: outcome::ErrorKind::InconsistentState,
            message: "card:2 not in list:a".into(),
        });
        let frame = payload.clone().into_frame(FrameHeader::new(Opcode::Ack)).unwrap();
        assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
    }
}
