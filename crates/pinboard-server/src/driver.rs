//! Server driver.
//!
//! The driver is the sans-IO core of the server: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s. It owns the connection
//! registry and board manager and processes exactly one event at a time, so
//! every mutation is resolved, applied and broadcast before the next frame
//! is looked at. Readers therefore never observe a half-applied move.
//!
//! ```text
//! runtime ──ServerEvent──▶ ServerDriver ──ServerAction──▶ execute_actions
//!                               │
//!                 BoardManager ─┴─ ConnectionRegistry
//! ```

use pinboard_core::Environment;
use pinboard_proto::{
    BoardId, Frame, FrameFlags, FrameHeader, Opcode, Payload, UserId,
    payloads::{
        events::NewNotification,
        outcome::{Ack, EntityRef, ErrorKind, Notifications, RequestFailed, Tasks},
        session::{Hello, HelloReply},
    },
};

use crate::{
    auth::{AllowAll, Authorizer},
    board_manager::{BoardError, BoardManager, Mutation},
    config::DriverConfig,
    error::ServerError,
    registry::ConnectionRegistry,
    storage::Storage,
};

/// Inputs to the driver.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A transport connection was established.
    ConnectionAccepted {
        /// Session id assigned by the runtime.
        session_id: u64,
    },
    /// A transport connection ended.
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
        /// Why it closed.
        reason: String,
    },
    /// A complete frame arrived.
    FrameReceived {
        /// Session it arrived on.
        session_id: u64,
        /// The frame.
        frame: Frame,
    },
    /// Periodic housekeeping (idle timeouts).
    Tick,
}

/// Effects requested by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame to one session.
    SendToSession {
        /// Recipient.
        session_id: u64,
        /// Frame to send.
        frame: Frame,
    },
    /// Send a frame to every session subscribed to a board.
    Broadcast {
        /// Board whose subscribers receive the frame.
        board_id: BoardId,
        /// Frame to send.
        frame: Frame,
    },
    /// Close a session's transport.
    CloseConnection {
        /// Session to close.
        session_id: u64,
        /// Reason, for logs.
        reason: String,
    },
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message.
        message: String,
    },
}

/// Log severity for [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Rejected requests and recoverable problems.
    Warn,
    /// Integrity problems.
    Error,
}

/// Sans-IO server state machine.
pub struct ServerDriver<E: Environment, S: Storage, A: Authorizer = AllowAll> {
    env: E,
    storage: S,
    authorizer: A,
    config: DriverConfig,
    registry: ConnectionRegistry,
    boards: BoardManager,
}

impl<E: Environment, S: Storage> ServerDriver<E, S, AllowAll> {
    /// Driver that lets every authenticated user access every board.
    pub fn new(env: E, storage: S, config: DriverConfig) -> Self {
        Self::with_authorizer(env, storage, config, AllowAll)
    }
}

impl<E: Environment, S: Storage, A: Authorizer> ServerDriver<E, S, A> {
    /// Driver with an explicit access policy.
    pub fn with_authorizer(env: E, storage: S, config: DriverConfig, authorizer: A) -> Self {
        let boards = BoardManager::new(&config);
        Self { env, storage, authorizer, config, registry: ConnectionRegistry::new(), boards }
    }

    /// Connection and subscription state.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Access policy, e.g. to add grants.
    pub fn authorizer_mut(&mut self) -> &mut A {
        &mut self.authorizer
    }

    /// Process one event.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                if !self.registry.register_session(session_id, self.env.now()) {
                    return Err(ServerError::DuplicateSession(session_id));
                }
                Ok(vec![log(LogLevel::Debug, format!("session {session_id} accepted"))])
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                match self.registry.unregister_session(session_id) {
                    Some(_) => {
                        Ok(vec![log(LogLevel::Debug, format!("session {session_id} closed: {reason}"))])
                    },
                    None => Ok(Vec::new()),
                }
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                if self.registry.session(session_id).is_none() {
                    return Err(ServerError::UnknownSession(session_id));
                }
                self.registry.touch(session_id, self.env.now());
                self.handle_frame(session_id, &frame)
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let idle = self.registry.idle_sessions(self.env.now(), self.config.idle_timeout);
        let mut actions = Vec::with_capacity(idle.len());
        for session_id in idle {
            self.registry.unregister_session(session_id);
            actions.push(ServerAction::CloseConnection {
                session_id,
                reason: "idle timeout".to_owned(),
            });
        }
        actions
    }

    fn handle_frame(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let header = frame.header;
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => return reject(session_id, &header, ErrorKind::Validation, e.to_string()),
        };

        match payload {
            Payload::Hello(hello) => self.handle_hello(session_id, &header, &hello),
            Payload::Ping => Ok(vec![respond(session_id, &header, Payload::Pong)?]),
            Payload::Goodbye(goodbye) => {
                self.registry.unregister_session(session_id);
                Ok(vec![ServerAction::CloseConnection { session_id, reason: goodbye.reason }])
            },
            request => match self.registry.user(session_id) {
                Some(user_id) => self.handle_request(session_id, user_id, &header, request),
                None => reject(session_id, &header, ErrorKind::Unauthorized, "hello required"),
            },
        }
    }

    fn handle_hello(
        &mut self,
        session_id: u64,
        header: &FrameHeader,
        hello: &Hello,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if hello.version != FrameHeader::VERSION {
            let mut actions = reject(
                session_id,
                header,
                ErrorKind::Validation,
                format!("unsupported protocol version {}", hello.version),
            )?;
            self.registry.unregister_session(session_id);
            actions.push(ServerAction::CloseConnection {
                session_id,
                reason: "version mismatch".to_owned(),
            });
            return Ok(actions);
        }

        self.registry.authenticate(session_id, hello.user_id);
        Ok(vec![
            respond(session_id, header, Payload::HelloReply(HelloReply { session_id }))?,
            log(LogLevel::Info, format!("session {session_id} authenticated as {}", hello.user_id)),
        ])
    }

    fn handle_request(
        &mut self,
        session_id: u64,
        user_id: UserId,
        header: &FrameHeader,
        request: Payload,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if let Payload::CreateBoard(create) = &request {
            let result = self.boards.create_board(&self.env, &self.storage, create);
            if let Ok(Mutation { created: Some(EntityRef::Board(id)), .. }) = &result {
                self.authorizer.board_created(user_id, *id);
            }
            return self.finish(session_id, user_id, header, "create_board", result);
        }

        // Inbox and task queries are scoped to the sender, not to a board.
        let (storage, boards) = (&self.storage, &self.boards);
        let reply = match &request {
            Payload::FetchNotifications => Some((
                "fetch_notifications",
                boards
                    .notifications(storage, user_id)
                    .map(|notifications| Payload::Notifications(Notifications { notifications })),
            )),
            Payload::MarkNotificationsRead(req) => Some((
                "mark_notifications_read",
                boards
                    .mark_notifications_read(storage, user_id, req)
                    .map(|_| Payload::Ack(Ack { created: None })),
            )),
            Payload::FetchTasks => Some((
                "fetch_tasks",
                boards.tasks(storage, user_id).map(|mut cards| {
                    cards.retain(|card| self.authorizer.can_access(user_id, card.board_id));
                    Payload::Tasks(Tasks { cards })
                }),
            )),
            _ => None,
        };
        if let Some((operation, result)) = reply {
            return match result {
                Ok(payload) => Ok(vec![respond(session_id, header, payload)?]),
                Err(e) => self.fail(session_id, header, operation, &e),
            };
        }

        let board_id = header.board_id();
        if !self.authorizer.can_access(user_id, board_id) {
            return reject(
                session_id,
                header,
                ErrorKind::Unauthorized,
                format!("{user_id} has no access to {board_id}"),
            );
        }

        let (env, storage, boards) = (&self.env, &self.storage, &self.boards);
        let (operation, result) = match request {
            Payload::JoinBoard => return self.join(session_id, header),
            Payload::LeaveBoard => {
                self.registry.leave(session_id, board_id);
                return Ok(vec![respond(session_id, header, Payload::Ack(Ack { created: None }))?]);
            },
            Payload::FetchBoard => {
                return match boards.snapshot(storage, board_id) {
                    Ok(snapshot) => {
                        Ok(vec![respond(session_id, header, Payload::BoardSnapshot(snapshot))?])
                    },
                    Err(e) => self.fail(session_id, header, "fetch_board", &e),
                };
            },
            Payload::MoveCard(req) => {
                ("move_card", boards.move_card(env, storage, user_id, board_id, &req))
            },
            Payload::MoveList(req) => ("move_list", boards.move_list(storage, board_id, &req)),
            Payload::CreateList(req) => {
                ("create_list", boards.create_list(env, storage, board_id, &req))
            },
            Payload::RenameList(req) => ("rename_list", boards.rename_list(storage, board_id, &req)),
            Payload::CreateCard(req) => {
                ("create_card", boards.create_card(env, storage, user_id, board_id, &req))
            },
            Payload::UpdateCard(req) => {
                ("update_card", boards.update_card(env, storage, user_id, board_id, &req))
            },
            Payload::DeleteCard(req) => ("delete_card", boards.delete_card(storage, board_id, &req)),
            Payload::AddChecklist(req) => {
                ("add_checklist", boards.add_checklist(env, storage, board_id, &req))
            },
            Payload::AddChecklistItem(req) => {
                ("add_checklist_item", boards.add_checklist_item(env, storage, board_id, &req))
            },
            Payload::UpdateChecklistItem(req) => {
                ("update_checklist_item", boards.update_checklist_item(storage, board_id, &req))
            },
            other => {
                return reject(
                    session_id,
                    header,
                    ErrorKind::Validation,
                    format!("unexpected {:?} from client", other.opcode()),
                );
            },
        };

        self.finish(session_id, user_id, header, operation, result)
    }

    fn join(
        &mut self,
        session_id: u64,
        header: &FrameHeader,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let board_id = header.board_id();
        match self.boards.has_board(&self.storage, board_id) {
            Ok(true) => {
                self.registry.join(session_id, board_id);
                Ok(vec![respond(session_id, header, Payload::Ack(Ack { created: None }))?])
            },
            Ok(false) => self.fail(session_id, header, "join_board", &BoardError::BoardNotFound(board_id)),
            Err(e) => self.fail(session_id, header, "join_board", &e),
        }
    }

    /// Turn an operation result into broadcasts plus an acknowledgement, or a
    /// rejection addressed to the initiator only.
    fn finish(
        &self,
        session_id: u64,
        user_id: UserId,
        header: &FrameHeader,
        operation: &str,
        result: Result<Mutation, BoardError>,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let mutation = match result {
            Ok(mutation) => mutation,
            Err(e) => return self.fail(session_id, header, operation, &e),
        };

        let board_id = header.board_id();
        let mut actions = Vec::with_capacity(mutation.events.len() + mutation.notifications.len() + 2);

        if mutation.is_noop() {
            actions.push(log(LogLevel::Debug, format!("{operation} on {board_id}: no change")));
        }
        for warning in mutation.warnings {
            actions.push(log(LogLevel::Warn, format!("{operation} on {board_id}: {warning}")));
        }

        let broadcast = broadcast_header(header, user_id);
        for event in mutation.events {
            actions.push(ServerAction::Broadcast { board_id, frame: event.into_frame(broadcast)? });
        }
        for notification in mutation.notifications {
            let event = Payload::NewNotification(NewNotification { notification });
            actions.push(ServerAction::Broadcast { board_id, frame: event.into_frame(broadcast)? });
        }

        actions.push(respond(session_id, header, Payload::Ack(Ack { created: mutation.created }))?);
        Ok(actions)
    }

    fn fail(
        &self,
        session_id: u64,
        header: &FrameHeader,
        operation: &str,
        error: &BoardError,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let kind = error.kind();
        let level = if error.is_fatal() {
            LogLevel::Error
        } else {
            match kind {
                ErrorKind::InconsistentState | ErrorKind::Integrity => LogLevel::Warn,
                _ => LogLevel::Debug,
            }
        };
        let prefix = if error.is_fatal() { "FATAL integrity failure, rollback incomplete: " } else { "" };

        let mut actions = vec![log(
            level,
            format!("{prefix}{operation} from session {session_id} rejected ({kind:?}): {error}"),
        )];
        actions.extend(reject(session_id, header, kind, error.to_string())?);
        Ok(actions)
    }
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}

fn response_header(request: &FrameHeader) -> FrameHeader {
    let mut header = FrameHeader::new(Opcode::Ack);
    header.set_request_id(request.request_id());
    header.set_board_id(request.board_id());
    header.set_flags(FrameFlags::RESPONSE);
    header
}

fn broadcast_header(request: &FrameHeader, sender: UserId) -> FrameHeader {
    let mut header = FrameHeader::new(Opcode::Ack);
    header.set_request_id(request.request_id());
    header.set_board_id(request.board_id());
    header.set_sender_id(sender);
    header.set_flags(FrameFlags::BROADCAST);
    header
}

fn respond(
    session_id: u64,
    request: &FrameHeader,
    payload: Payload,
) -> Result<ServerAction, ServerError> {
    Ok(ServerAction::SendToSession { session_id, frame: payload.into_frame(response_header(request))? })
}

fn reject(
    session_id: u64,
    request: &FrameHeader,
    kind: ErrorKind,
    message: impl Into<String>,
) -> Result<Vec<ServerAction>, ServerError> {
    let payload = Payload::RequestFailed(RequestFailed { kind, message: message.into() });
    Ok(vec![respond(session_id, request, payload)?])
}
