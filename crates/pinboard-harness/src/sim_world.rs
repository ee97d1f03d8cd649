//! In-process simulation world.
//!
//! One [`ServerDriver`] and any number of [`Client`]s exchange frames
//! through per-client inboxes instead of sockets. Requests reach the server
//! the moment a client emits them; replies and broadcasts wait in the
//! recipient's inbox until a test delivers them. Holding inboxes back is how
//! races are built, and dropping them is how broadcast loss is simulated.
//!
//! Client `i` is always session `i` and user `i + 1`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use pinboard_client::{BoardView, Client, ClientAction, ClientError, ClientEvent, ClientIdentity};
use pinboard_core::{MemoryOrdering, OrderingStore};
use pinboard_proto::{
    BoardId, CardId, Frame, ListId, Payload, UserId, WorkspaceId,
    payloads::{outcome::EntityRef, requests::CreateCard},
};
use pinboard_server::{
    ActionExecutor, DriverConfig, ExecutorError, LogLevel, MemoryStorage, ServerAction,
    ServerDriver, ServerError, ServerEvent, Storage, StorageError, execute_actions,
};
use thiserror::Error;

use crate::sim_env::SimEnv;

/// Failures that abort a simulation step.
#[derive(Debug, Error)]
pub enum WorldError {
    /// No client with this index.
    #[error("no client {0}")]
    UnknownClient(usize),

    /// A client rejected an event locally.
    #[error("client {index}: {source}")]
    Client {
        /// Client index.
        index: usize,
        /// Underlying failure.
        source: ClientError,
    },

    /// The server driver failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Reading server state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Setup did not produce what it expected.
    #[error("setup failed: {0}")]
    Setup(String),
}

/// Per-list card order, in board order.
pub type BoardOrder = Vec<(ListId, Vec<CardId>)>;

/// A board created by [`SimWorld::seed_board`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededBoard {
    /// The board.
    pub board_id: BoardId,
    /// Its lists and their cards, as created.
    pub lists: BoardOrder,
}

impl SeededBoard {
    /// Every card, list by list.
    pub fn cards(&self) -> impl Iterator<Item = CardId> + '_ {
        self.lists.iter().flat_map(|(_, cards)| cards.iter().copied())
    }
}

#[derive(Debug)]
struct Inboxes {
    env: SimEnv,
    queues: HashMap<u64, VecDeque<Frame>>,
    loss_per_mille: u64,
    lost: usize,
    closed: Vec<u64>,
    logs: Vec<(LogLevel, String)>,
}

impl ActionExecutor for Inboxes {
    fn send(&mut self, session_id: u64, frame: &Frame) -> Result<(), ExecutorError> {
        if self.loss_per_mille > 0 && self.env.below(1000) < self.loss_per_mille {
            self.lost += 1;
            return Ok(());
        }
        self.queues.entry(session_id).or_default().push_back(frame.clone());
        Ok(())
    }

    fn close(&mut self, session_id: u64, _reason: &str) {
        self.queues.remove(&session_id);
        self.closed.push(session_id);
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        self.logs.push((level, message.to_owned()));
    }
}

/// Server, clients and the frames in flight between them.
pub struct SimWorld<S: Storage = MemoryStorage> {
    env: SimEnv,
    server: ServerDriver<SimEnv, S>,
    clients: Vec<Client<SimEnv>>,
    inboxes: Inboxes,
    actions: Vec<Vec<ClientAction>>,
    broadcasts: Vec<Frame>,
}

impl SimWorld<MemoryStorage> {
    /// In-memory server with `clients` connected clients.
    pub fn new(clients: usize, seed: u64) -> Result<Self, WorldError> {
        Self::with_storage(MemoryStorage::new(), DriverConfig::default(), clients, seed)
    }
}

impl<S: Storage> SimWorld<S> {
    /// Server over `storage` with `clients` connected, handshaken clients.
    pub fn with_storage(
        storage: S,
        config: DriverConfig,
        clients: usize,
        seed: u64,
    ) -> Result<Self, WorldError> {
        let env = SimEnv::with_seed(seed);
        let mut world = Self {
            server: ServerDriver::new(env.clone(), storage, config),
            clients: Vec::with_capacity(clients),
            inboxes: Inboxes {
                env: env.clone(),
                queues: HashMap::new(),
                loss_per_mille: 0,
                lost: 0,
                closed: Vec::new(),
                logs: Vec::new(),
            },
            actions: vec![Vec::new(); clients],
            broadcasts: Vec::new(),
            env,
        };

        for index in 0..clients {
            let user_id = UserId::new(index as u64 + 1);
            world.clients.push(Client::new(world.env.clone(), ClientIdentity { user_id }));
            world.server_event(ServerEvent::ConnectionAccepted { session_id: index as u64 })?;
            world.act(index, ClientEvent::Connect)?;
            world.deliver(index)?;
        }

        Ok(world)
    }

    /// The shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The server driver.
    pub fn server(&self) -> &ServerDriver<SimEnv, S> {
        &self.server
    }

    /// The server's storage.
    pub fn storage(&self) -> &S {
        self.server.storage()
    }

    /// Number of clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Client `index`.
    pub fn client(&self, index: usize) -> Option<&Client<SimEnv>> {
        self.clients.get(index)
    }

    /// Everything client `index` reported except sends, oldest first.
    pub fn actions(&self, index: usize) -> &[ClientAction] {
        self.actions.get(index).map_or(&[], Vec::as_slice)
    }

    /// Most recent entity the server acknowledged creating for `index`.
    pub fn last_created(&self, index: usize) -> Option<EntityRef> {
        self.actions(index).iter().rev().find_map(|action| match action {
            ClientAction::Created(entity) => Some(*entity),
            _ => None,
        })
    }

    /// Every broadcast the server emitted, in server order.
    pub fn broadcasts(&self) -> &[Frame] {
        &self.broadcasts
    }

    /// Log lines the server emitted.
    pub fn server_logs(&self) -> &[(LogLevel, String)] {
        &self.inboxes.logs
    }

    /// Sessions the server closed.
    pub fn closed_sessions(&self) -> &[u64] {
        &self.inboxes.closed
    }

    /// Frames dropped by the loss model.
    pub fn lost_frames(&self) -> usize {
        self.inboxes.lost
    }

    /// Frames waiting for client `index`.
    pub fn pending(&self, index: usize) -> usize {
        self.inboxes.queues.get(&(index as u64)).map_or(0, VecDeque::len)
    }

    /// Drop each outbound frame with probability `per_mille / 1000`.
    pub fn set_loss(&mut self, per_mille: u16) {
        self.inboxes.loss_per_mille = u64::from(per_mille.min(1000));
    }

    /// Feed a client event and push whatever it sends to the server.
    ///
    /// Returns the number of frames the client sent.
    pub fn act(&mut self, index: usize, event: ClientEvent) -> Result<usize, WorldError> {
        let client = self.clients.get_mut(index).ok_or(WorldError::UnknownClient(index))?;
        let actions = client.handle(event).map_err(|source| WorldError::Client { index, source })?;
        self.route(index, actions)
    }

    /// Hand client `index` everything in its inbox, including frames
    /// produced while doing so. Returns the number delivered.
    pub fn deliver(&mut self, index: usize) -> Result<usize, WorldError> {
        let mut delivered = 0;
        while let Some(frame) =
            self.inboxes.queues.get_mut(&(index as u64)).and_then(VecDeque::pop_front)
        {
            delivered += 1;
            self.act(index, ClientEvent::FrameReceived(frame))?;
        }
        Ok(delivered)
    }

    /// Deliver until every inbox is empty.
    pub fn settle(&mut self) -> Result<(), WorldError> {
        loop {
            let mut delivered = 0;
            for index in 0..self.clients.len() {
                delivered += self.deliver(index)?;
            }
            if delivered == 0 {
                return Ok(());
            }
        }
    }

    /// Throw away client `index`'s inbox. Returns the number dropped.
    pub fn lose_inbox(&mut self, index: usize) -> usize {
        self.inboxes.queues.remove(&(index as u64)).map_or(0, |queue| queue.len())
    }

    /// Move the clock forward and tick every client.
    pub fn advance(&mut self, duration: Duration) -> Result<(), WorldError> {
        self.env.advance(duration);
        for index in 0..self.clients.len() {
            self.act(index, ClientEvent::Tick)?;
        }
        Ok(())
    }

    /// Whether the server still holds client `index`'s session.
    pub fn is_connected(&self, index: usize) -> bool {
        self.server.registry().session(index as u64).is_some()
    }

    /// Open a new connection for client `index` under its old session id
    /// and complete the handshake, which re-joins and re-fetches its board.
    pub fn reconnect(&mut self, index: usize) -> Result<(), WorldError> {
        if index >= self.clients.len() {
            return Err(WorldError::UnknownClient(index));
        }
        self.server_event(ServerEvent::ConnectionAccepted { session_id: index as u64 })?;
        self.act(index, ClientEvent::Connect)?;
        self.deliver(index)?;
        Ok(())
    }

    /// Tick the server.
    pub fn tick_server(&mut self) -> Result<(), WorldError> {
        self.server_event(ServerEvent::Tick)
    }

    /// Open `board_id` on every client and wait for the snapshots.
    pub fn open_everywhere(&mut self, board_id: BoardId) -> Result<(), WorldError> {
        for index in 0..self.clients.len() {
            self.act(index, ClientEvent::OpenBoard { board_id })?;
            self.deliver(index)?;
        }
        Ok(())
    }

    /// Client 0 creates a board with `lists` lists of `cards_per_list`
    /// cards; every client opens it. Returns with all inboxes drained.
    pub fn seed_board(
        &mut self,
        lists: usize,
        cards_per_list: usize,
    ) -> Result<SeededBoard, WorldError> {
        self.act(0, ClientEvent::CreateBoard {
            title: "Simulation".into(),
            workspace_id: WorkspaceId::new(1),
        })?;
        self.deliver(0)?;
        let Some(EntityRef::Board(board_id)) = self.last_created(0) else {
            return Err(WorldError::Setup("board was not created".into()));
        };
        self.open_everywhere(board_id)?;

        let mut seeded = SeededBoard { board_id, lists: Vec::with_capacity(lists) };
        for l in 0..lists {
            self.act(0, ClientEvent::CreateList { title: format!("list {l}") })?;
            self.deliver(0)?;
            let Some(EntityRef::List(list_id)) = self.last_created(0) else {
                return Err(WorldError::Setup(format!("list {l} was not created")));
            };

            let mut cards = Vec::with_capacity(cards_per_list);
            for c in 0..cards_per_list {
                self.act(0, ClientEvent::CreateCard(CreateCard {
                    list_id,
                    title: format!("card {l}.{c}"),
                    description: String::new(),
                    members: Vec::new(),
                    due: None,
                    labels: Vec::new(),
                }))?;
                self.deliver(0)?;
                let Some(EntityRef::Card(card_id)) = self.last_created(0) else {
                    return Err(WorldError::Setup(format!("card {l}.{c} was not created")));
                };
                cards.push(card_id);
            }
            seeded.lists.push((list_id, cards));
        }

        self.settle()?;
        Ok(seeded)
    }

    /// Authoritative order of `board_id`, read from storage.
    pub fn server_order(&self, board_id: BoardId) -> Result<BoardOrder, WorldError> {
        let storage = self.server.storage();
        let board = storage
            .load_board(board_id)?
            .ok_or_else(|| WorldError::Setup(format!("board {board_id} missing")))?;

        let mut order = Vec::with_capacity(board.lists.len());
        for &list_id in board.lists.iter() {
            let list = storage
                .load_list(list_id)?
                .ok_or_else(|| WorldError::Setup(format!("list {list_id} missing")))?;
            order.push((list_id, list.cards.into_vec()));
        }
        Ok(order)
    }

    /// Board order rebuilt from broadcasts alone.
    ///
    /// Every event carries whole sequences, so a subscriber that missed
    /// nothing holds exactly this.
    pub fn replayed_order(&self, board_id: BoardId) -> BoardOrder {
        let mut replay = MemoryOrdering::new();
        for frame in self.broadcasts.iter().filter(|f| f.header.board_id() == board_id) {
            match Payload::from_frame(frame) {
                Ok(Payload::CardMoved(event)) => {
                    replay.set_card_order(event.source_list_id, event.source_sequence.into());
                    if let Some(dest) = event.dest_sequence {
                        replay.set_card_order(event.dest_list_id, dest.into());
                    }
                },
                Ok(Payload::CardCreated(event)) => {
                    replay.set_card_order(event.card.list_id, event.sequence.into());
                },
                Ok(Payload::CardDeleted(event)) => {
                    replay.set_card_order(event.list_id, event.sequence.into());
                },
                Ok(Payload::ListCreated(event)) => {
                    replay.set_card_order(
                        event.list.id,
                        event.list.cards.iter().map(|card| card.id).collect(),
                    );
                    replay.set_list_order(board_id, event.board_sequence.into());
                },
                Ok(Payload::ListMoved(event)) => {
                    replay.set_list_order(board_id, event.sequence.into());
                },
                _ => {},
            }
        }

        replay
            .list_order(board_id)
            .map(|lists| {
                lists
                    .iter()
                    .map(|&list_id| {
                        let cards = replay.card_order(list_id).cloned().unwrap_or_default();
                        (list_id, cards.into_vec())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Client `index`'s view of its open board.
    pub fn client_order(&self, index: usize) -> Option<BoardOrder> {
        self.client(index).and_then(Client::board).map(view_order)
    }

    /// Check that card records and list sequences agree in both
    /// directions for every card the server ever announced.
    ///
    /// Returns a description of each violation.
    pub fn integrity_violations(&self, board_id: BoardId) -> Result<Vec<String>, WorldError> {
        let storage = self.server.storage();
        let order = self.server_order(board_id)?;
        let mut violations = Vec::new();
        let mut placed = HashSet::new();

        for (list_id, cards) in &order {
            for &card_id in cards {
                if !placed.insert(card_id) {
                    violations.push(format!("{card_id} appears in more than one position"));
                }
                match storage.load_card(card_id)? {
                    None => violations.push(format!("{card_id} in {list_id} has no record")),
                    Some(card) if card.list_id != *list_id => violations.push(format!(
                        "{card_id} sits in {list_id} but its record names {}",
                        card.list_id
                    )),
                    Some(_) => {},
                }
            }
        }

        for card_id in self.announced_cards() {
            if let Some(card) = storage.load_card(card_id)?
                && !placed.contains(&card_id)
            {
                violations.push(format!("{card_id} names {} but no list holds it", card.list_id));
            }
        }

        Ok(violations)
    }

    fn announced_cards(&self) -> Vec<CardId> {
        self.broadcasts
            .iter()
            .filter_map(|frame| match Payload::from_frame(frame) {
                Ok(Payload::CardCreated(event)) => Some(event.card.id),
                _ => None,
            })
            .collect()
    }

    fn route(&mut self, index: usize, actions: Vec<ClientAction>) -> Result<usize, WorldError> {
        let mut sent = 0;
        for action in actions {
            match action {
                ClientAction::Send(_) if !self.is_connected(index) => {
                    tracing::debug!(client = index, "frame sent on a closed connection");
                },
                ClientAction::Send(frame) => {
                    sent += 1;
                    self.server_event(ServerEvent::FrameReceived {
                        session_id: index as u64,
                        frame,
                    })?;
                },
                other => self.actions[index].push(other),
            }
        }
        Ok(sent)
    }

    fn server_event(&mut self, event: ServerEvent) -> Result<(), WorldError> {
        let mut pending = VecDeque::from([event]);
        let mut hung_up = Vec::new();

        while let Some(event) = pending.pop_front() {
            let actions = self.server.process_event(event)?;
            for action in &actions {
                if let ServerAction::Broadcast { frame, .. } = action {
                    self.broadcasts.push(frame.clone());
                }
            }

            let policy = self.server.config().broadcast;
            let report = execute_actions(&mut self.inboxes, self.server.registry(), policy, actions);
            for session_id in report.closed {
                if self.server.registry().session(session_id).is_some() {
                    pending.push_back(ServerEvent::ConnectionClosed {
                        session_id,
                        reason: "closed by server".into(),
                    });
                }
                hung_up.push(session_id as usize);
            }
        }

        // The client notices its transport went away.
        for index in hung_up {
            if index < self.clients.len() {
                self.act(index, ClientEvent::Disconnected)?;
            }
        }
        Ok(())
    }
}

/// Card order of a client view, in board order.
pub fn view_order(view: &BoardView) -> BoardOrder {
    view.lists().iter().map(|list| (list.id, list.card_order().into_vec())).collect()
}
