//! Client state machine.
//!
//! [`Client`] consumes [`ClientEvent`]s (user gestures and frames from the
//! server) and returns [`ClientAction`]s for the caller to perform. It never
//! touches the network itself.
//!
//! Moves are applied optimistically: the client runs the same resolver as
//! the server against its local view, shows the result immediately, and
//! sends the gesture. The server's `CardMoved` broadcast then replaces the
//! local sequences with the authoritative ones, which is a no-op when the
//! prediction was right. If the server rejects the move, the touched lists
//! are restored and the board is re-fetched.

use std::{
    cmp::Reverse,
    collections::HashMap,
    time::{Duration, Instant},
};

use pinboard_core::{Environment, MoveRequest, Resolution, resolver};
use pinboard_proto::{
    BoardId, CardId, Frame, FrameHeader, ListId, NotificationId, Opcode, Payload, UserId,
    WorkspaceId,
    payloads::{
        events::{CardMoved, ListMoved},
        model::{Card, Notification},
        outcome::{EntityRef, ErrorKind},
        requests::{
            AddChecklist, AddChecklistItem, CreateBoard, CreateCard, CreateList, DeleteCard,
            ExpectedVersions, MarkNotificationsRead, MoveCard, MoveList, RenameList, UpdateCard,
            UpdateChecklistItem,
        },
        session::{Goodbye, Hello},
    },
};

use crate::{
    error::ClientError,
    reconciler::{BoardView, ListView},
};

/// Requests without an answer for this long are abandoned on tick.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected client that has sent nothing for this long pings on tick.
///
/// A third of the server's default idle timeout, so a passive viewer
/// survives two lost pings.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Who the client acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Authenticated user.
    pub user_id: UserId,
}

/// Inputs to the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport is up; start the handshake.
    Connect,
    /// A frame arrived from the server.
    FrameReceived(Frame),
    /// Subscribe to a board and fetch its state.
    OpenBoard {
        /// Board to open.
        board_id: BoardId,
    },
    /// Unsubscribe from the open board.
    CloseBoard,
    /// Re-fetch the open board.
    Refresh,
    /// Create a board.
    CreateBoard {
        /// Title.
        title: String,
        /// Owning workspace.
        workspace_id: WorkspaceId,
    },
    /// Append a list to the open board.
    CreateList {
        /// Title.
        title: String,
    },
    /// Retitle a list of the open board.
    RenameList {
        /// List to rename.
        list_id: ListId,
        /// New title.
        title: String,
    },
    /// Append a card to a list of the open board.
    CreateCard(CreateCard),
    /// Change a card's fields.
    UpdateCard(UpdateCard),
    /// Delete a card.
    DeleteCard {
        /// Card to delete.
        card_id: CardId,
    },
    /// Drag-and-drop of a card.
    MoveCard {
        /// Card being dragged.
        card_id: CardId,
        /// List it was dragged from.
        source_list_id: ListId,
        /// List it was dropped into.
        dest_list_id: ListId,
        /// Position in the source list.
        source_index: u32,
        /// Drop position in the post-removal destination list.
        dest_index: u32,
    },
    /// Drag-and-drop of a list.
    MoveList {
        /// List being dragged.
        list_id: ListId,
        /// Position it occupied.
        source_index: u32,
        /// Drop position.
        dest_index: u32,
    },
    /// Add a checklist to a card.
    AddChecklist(AddChecklist),
    /// Add an item to a checklist.
    AddChecklistItem(AddChecklistItem),
    /// Change a checklist item.
    UpdateChecklistItem(UpdateChecklistItem),
    /// Fetch this user's notifications.
    FetchNotifications,
    /// Mark notifications read; an empty list marks all of them.
    MarkNotificationsRead {
        /// Notifications to mark.
        ids: Vec<NotificationId>,
    },
    /// Fetch the cards assigned to this user.
    FetchTasks,
    /// Leave gracefully.
    Disconnect {
        /// Reason sent to the server.
        reason: String,
    },
    /// The transport closed underneath the client.
    ///
    /// In-flight requests are rolled back. The next handshake re-joins and
    /// re-fetches the open board.
    Disconnected,
    /// Periodic housekeeping.
    Tick,
}

/// Effects requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send a frame to the server.
    Send(Frame),
    /// Handshake completed.
    Connected {
        /// Session id assigned by the server.
        session_id: u64,
    },
    /// The local view of a board changed; re-render.
    BoardUpdated(BoardId),
    /// A notification for this user arrived.
    Notification(Notification),
    /// This user's notifications, newest first.
    Inbox(Vec<Notification>),
    /// Cards assigned to this user.
    Tasks(Vec<Card>),
    /// The server rejected a request.
    Rejected {
        /// Request that failed.
        request_id: u64,
        /// Failure class.
        kind: ErrorKind,
        /// Detail.
        message: String,
    },
    /// The server created an entity on our behalf.
    Created(EntityRef),
}

/// What to undo if a request fails.
#[derive(Debug, Clone)]
enum Rollback {
    None,
    Lists(Vec<ListView>),
    ListOrder { order: Vec<ListId>, version: u64 },
}

#[derive(Debug, Clone)]
struct Pending {
    sent_at: Instant,
    rollback: Rollback,
}

/// Sans-IO board client.
pub struct Client<E: Environment> {
    env: E,
    identity: ClientIdentity,
    session_id: Option<u64>,
    board_id: Option<BoardId>,
    board: Option<BoardView>,
    next_request: u64,
    pending: HashMap<u64, Pending>,
    last_sent: Option<Instant>,
}

impl<E: Environment> Client<E> {
    /// New, unconnected client.
    pub fn new(env: E, identity: ClientIdentity) -> Self {
        Self {
            env,
            identity,
            session_id: None,
            board_id: None,
            board: None,
            next_request: 1,
            pending: HashMap::new(),
            last_sent: None,
        }
    }

    /// Identity this client acts as.
    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    /// Session id once connected.
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Open board, if loaded.
    pub fn board(&self) -> Option<&BoardView> {
        self.board.as_ref()
    }

    /// Requests awaiting an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Process one event.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Connect => {
                let hello = Payload::Hello(Hello {
                    version: FrameHeader::VERSION,
                    user_id: self.identity.user_id,
                    auth_token: None,
                });
                Ok(vec![self.send(BoardId::new(0), hello, Rollback::None)?])
            },
            ClientEvent::FrameReceived(frame) => self.handle_frame(&frame),
            ClientEvent::Tick => self.handle_tick(),
            ClientEvent::Disconnected => Ok(self.handle_disconnected()),
            event => {
                if self.session_id.is_none() {
                    return Err(ClientError::NotConnected);
                }
                self.handle_request(event)
            },
        }
    }

    fn handle_request(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::OpenBoard { board_id } => {
                if self.board_id != Some(board_id) {
                    self.board = None;
                }
                self.board_id = Some(board_id);
                Ok(vec![
                    self.send(board_id, Payload::JoinBoard, Rollback::None)?,
                    self.send(board_id, Payload::FetchBoard, Rollback::None)?,
                ])
            },
            ClientEvent::CloseBoard => {
                let board_id = self.open_board()?;
                self.board_id = None;
                self.board = None;
                Ok(vec![self.send(board_id, Payload::LeaveBoard, Rollback::None)?])
            },
            ClientEvent::Refresh => {
                let board_id = self.open_board()?;
                Ok(vec![self.send(board_id, Payload::FetchBoard, Rollback::None)?])
            },
            ClientEvent::CreateBoard { title, workspace_id } => {
                let payload = Payload::CreateBoard(CreateBoard { title, workspace_id });
                Ok(vec![self.send(BoardId::new(0), payload, Rollback::None)?])
            },
            ClientEvent::CreateList { title } => {
                self.board_request(Payload::CreateList(CreateList { title }))
            },
            ClientEvent::RenameList { list_id, title } => {
                self.board_request(Payload::RenameList(RenameList { list_id, title }))
            },
            ClientEvent::CreateCard(request) => self.board_request(Payload::CreateCard(request)),
            ClientEvent::UpdateCard(request) => self.board_request(Payload::UpdateCard(request)),
            ClientEvent::DeleteCard { card_id } => {
                self.board_request(Payload::DeleteCard(DeleteCard { card_id }))
            },
            ClientEvent::AddChecklist(request) => self.board_request(Payload::AddChecklist(request)),
            ClientEvent::AddChecklistItem(request) => {
                self.board_request(Payload::AddChecklistItem(request))
            },
            ClientEvent::UpdateChecklistItem(request) => {
                self.board_request(Payload::UpdateChecklistItem(request))
            },
            ClientEvent::MoveCard { card_id, source_list_id, dest_list_id, source_index, dest_index } => {
                let request = MoveCard {
                    card_id,
                    source_list_id,
                    dest_list_id,
                    source_index,
                    dest_index,
                    expected_versions: None,
                };
                self.move_card(request)
            },
            ClientEvent::MoveList { list_id, source_index, dest_index } => {
                self.move_list(MoveList { list_id, source_index, dest_index, expected_version: None })
            },
            ClientEvent::FetchNotifications => {
                Ok(vec![self.send(BoardId::new(0), Payload::FetchNotifications, Rollback::None)?])
            },
            ClientEvent::MarkNotificationsRead { ids } => {
                let payload = Payload::MarkNotificationsRead(MarkNotificationsRead { ids });
                Ok(vec![self.send(BoardId::new(0), payload, Rollback::None)?])
            },
            ClientEvent::FetchTasks => {
                Ok(vec![self.send(BoardId::new(0), Payload::FetchTasks, Rollback::None)?])
            },
            ClientEvent::Disconnect { reason } => {
                let frame = self.send(BoardId::new(0), Payload::Goodbye(Goodbye { reason }), Rollback::None)?;
                self.session_id = None;
                self.pending.clear();
                Ok(vec![frame])
            },
            ClientEvent::Connect
            | ClientEvent::FrameReceived(_)
            | ClientEvent::Tick
            | ClientEvent::Disconnected => Ok(Vec::new()),
        }
    }

    /// Resolve locally, show the result, then send the gesture.
    fn move_card(&mut self, mut request: MoveCard) -> Result<Vec<ClientAction>, ClientError> {
        let board_id = self.open_board()?;
        let view = self.board.as_mut().ok_or(ClientError::BoardNotLoaded)?;

        let source = view.list(request.source_list_id).ok_or(ClientError::UnknownList(request.source_list_id))?;
        let dest = view.list(request.dest_list_id).ok_or(ClientError::UnknownList(request.dest_list_id))?;
        let saved = if source.id == dest.id { vec![source.clone()] } else { vec![source.clone(), dest.clone()] };

        let outcome =
            match resolver::resolve(&MoveRequest::from(&request), &source.card_order(), &dest.card_order())? {
                Resolution::Unchanged => return Ok(Vec::new()),
                Resolution::Moved(outcome) => outcome,
            };

        let same_list = outcome.is_same_list();
        request.expected_versions = Some(ExpectedVersions {
            source: source.version,
            dest: (!same_list).then_some(dest.version),
        });
        let predicted: CardMoved = outcome.to_event(source.version, Some(dest.version));
        view.apply_card_moved(&predicted);

        Ok(vec![
            ClientAction::BoardUpdated(board_id),
            self.send(board_id, Payload::MoveCard(request), Rollback::Lists(saved))?,
        ])
    }

    fn move_list(&mut self, mut request: MoveList) -> Result<Vec<ClientAction>, ClientError> {
        let board_id = self.open_board()?;
        let view = self.board.as_mut().ok_or(ClientError::BoardNotLoaded)?;

        let order = view.list_order();
        let version = view.summary().version;
        let Some(reordered) = resolver::resolve_list_move(
            board_id,
            request.list_id,
            request.source_index as usize,
            request.dest_index as usize,
            &order,
        )?
        else {
            return Ok(Vec::new());
        };

        request.expected_version = Some(version);
        view.apply_list_moved(&ListMoved {
            list_id: request.list_id,
            sequence: reordered.into_vec(),
            version,
        });

        let rollback = Rollback::ListOrder { order: order.into_vec(), version };
        Ok(vec![
            ClientAction::BoardUpdated(board_id),
            self.send(board_id, Payload::MoveList(request), rollback)?,
        ])
    }

    fn board_request(&mut self, payload: Payload) -> Result<Vec<ClientAction>, ClientError> {
        let board_id = self.open_board()?;
        Ok(vec![self.send(board_id, payload, Rollback::None)?])
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let header = frame.header;
        let payload = Payload::from_frame(frame)?;

        match payload {
            Payload::HelloReply(reply) => {
                self.pending.remove(&header.request_id());
                self.session_id = Some(reply.session_id);
                let mut actions = vec![ClientAction::Connected { session_id: reply.session_id }];
                // A new session starts with no subscriptions.
                if let Some(board_id) = self.board_id {
                    actions.push(self.send(board_id, Payload::JoinBoard, Rollback::None)?);
                    actions.push(self.send(board_id, Payload::FetchBoard, Rollback::None)?);
                }
                Ok(actions)
            },
            Payload::Pong => {
                self.pending.remove(&header.request_id());
                Ok(Vec::new())
            },
            Payload::Goodbye(_) => {
                self.session_id = None;
                Ok(Vec::new())
            },
            Payload::Ack(ack) => {
                self.pending.remove(&header.request_id());
                Ok(ack.created.map(ClientAction::Created).into_iter().collect())
            },
            Payload::RequestFailed(failed) => {
                let request_id = header.request_id();
                let mut actions = self.abandon(request_id)?;
                actions.insert(0, ClientAction::Rejected {
                    request_id,
                    kind: failed.kind,
                    message: failed.message,
                });
                Ok(actions)
            },
            Payload::BoardSnapshot(snapshot) => {
                self.pending.remove(&header.request_id());
                let board_id = snapshot.board.id;
                if self.board_id != Some(board_id) {
                    return Ok(Vec::new());
                }
                self.board = Some(BoardView::from_snapshot(snapshot));
                Ok(vec![ClientAction::BoardUpdated(board_id)])
            },
            Payload::Notifications(reply) => {
                self.pending.remove(&header.request_id());
                Ok(vec![ClientAction::Inbox(reply.notifications)])
            },
            Payload::Tasks(reply) => {
                self.pending.remove(&header.request_id());
                Ok(vec![ClientAction::Tasks(reply.cards)])
            },
            Payload::NewNotification(event) => {
                if event.notification.recipient == self.identity.user_id {
                    Ok(vec![ClientAction::Notification(event.notification)])
                } else {
                    Ok(Vec::new())
                }
            },
            event if event.opcode().is_board_event() => {
                let board_id = header.board_id();
                match self.board.as_mut() {
                    Some(view) if view.id() == board_id => {
                        if view.apply_event(&event) {
                            Ok(vec![ClientAction::BoardUpdated(board_id)])
                        } else {
                            Ok(Vec::new())
                        }
                    },
                    _ => Ok(Vec::new()),
                }
            },
            _ => Ok(Vec::new()),
        }
    }

    fn handle_tick(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.sent_at) >= REQUEST_TIMEOUT)
            .map(|(&request_id, _)| request_id)
            .collect();

        let mut actions = Vec::new();
        let mut resync = false;
        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                resync |= self.undo(pending.rollback);
            }
        }
        if resync && let Some(board_id) = self.board_id {
            actions.push(ClientAction::BoardUpdated(board_id));
            if self.session_id.is_some() {
                actions.push(self.send(board_id, Payload::FetchBoard, Rollback::None)?);
            }
        }

        let quiet = self.last_sent.is_none_or(|at| now.saturating_duration_since(at) >= KEEPALIVE_INTERVAL);
        if self.session_id.is_some() && quiet {
            actions.push(self.send(BoardId::new(0), Payload::Ping, Rollback::None)?);
        }
        Ok(actions)
    }

    fn handle_disconnected(&mut self) -> Vec<ClientAction> {
        self.session_id = None;

        let mut abandoned: Vec<(u64, Pending)> = self.pending.drain().collect();
        abandoned.sort_by_key(|(request_id, _)| Reverse(*request_id));
        let mut changed = false;
        for (_, pending) in abandoned {
            changed |= self.undo(pending.rollback);
        }

        match self.board_id {
            Some(board_id) if changed => vec![ClientAction::BoardUpdated(board_id)],
            _ => Vec::new(),
        }
    }

    /// Undo a failed request and resynchronize from the server.
    fn abandon(&mut self, request_id: u64) -> Result<Vec<ClientAction>, ClientError> {
        let Some(pending) = self.pending.remove(&request_id) else {
            return Ok(Vec::new());
        };
        let Some(board_id) = self.board_id else {
            return Ok(Vec::new());
        };

        let mut actions = Vec::new();
        if self.undo(pending.rollback) {
            actions.push(ClientAction::BoardUpdated(board_id));
        }
        if self.session_id.is_some() {
            actions.push(self.send(board_id, Payload::FetchBoard, Rollback::None)?);
        }
        Ok(actions)
    }

    /// Returns whether the view changed.
    fn undo(&mut self, rollback: Rollback) -> bool {
        let Some(view) = self.board.as_mut() else {
            return false;
        };
        match rollback {
            Rollback::None => false,
            Rollback::Lists(lists) => {
                view.restore_lists(&lists);
                true
            },
            Rollback::ListOrder { order, version } => {
                view.restore_list_order(&order, version);
                true
            },
        }
    }

    fn open_board(&self) -> Result<BoardId, ClientError> {
        self.board_id.ok_or(ClientError::NoBoard)
    }

    fn send(
        &mut self,
        board_id: BoardId,
        payload: Payload,
        rollback: Rollback,
    ) -> Result<ClientAction, ClientError> {
        let request_id = self.next_request;
        self.next_request += 1;

        let mut header = FrameHeader::new(Opcode::Ping);
        header.set_request_id(request_id);
        header.set_board_id(board_id);
        header.set_sender_id(self.identity.user_id);
        let frame = payload.into_frame(header)?;

        let now = self.env.now();
        self.pending.insert(request_id, Pending { sent_at: now, rollback });
        self.last_sent = Some(now);
        Ok(ClientAction::Send(frame))
    }
}
