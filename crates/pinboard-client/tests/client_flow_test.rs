//! End-to-end tests for the client state machine against the server driver.
//!
//! Frames are routed in-process. Each client has an inbox that is only
//! drained when a test says so, which lets tests hold back broadcasts and
//! build races deterministically.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use pinboard_client::{Client, ClientAction, ClientEvent, ClientIdentity};
use pinboard_core::Environment;
use pinboard_proto::{
    BoardId, CardId, Frame, ListId, UserId, WorkspaceId,
    payloads::{
        outcome::{EntityRef, ErrorKind},
        requests::CreateCard,
    },
};
use pinboard_server::{
    ActionExecutor, DriverConfig, ExecutorError, LogLevel, MemoryStorage, ServerDriver, ServerEvent,
    execute_actions,
};

#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async move {
            tokio::time::sleep(duration).await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[derive(Default)]
struct Mailboxes(HashMap<u64, Vec<Frame>>);

impl ActionExecutor for Mailboxes {
    fn send(&mut self, session_id: u64, frame: &Frame) -> Result<(), ExecutorError> {
        self.0.entry(session_id).or_default().push(frame.clone());
        Ok(())
    }

    fn close(&mut self, _session_id: u64, _reason: &str) {}

    fn log(&mut self, _level: LogLevel, _message: &str) {}
}

struct World {
    server: ServerDriver<TestEnv, MemoryStorage>,
    clients: Vec<Client<TestEnv>>,
    mail: Mailboxes,
    events: Vec<Vec<ClientAction>>,
}

impl World {
    /// Server plus `n` clients; client `i` is session `i` and user `i + 1`.
    fn new(n: usize) -> Self {
        let mut world = Self {
            server: ServerDriver::new(TestEnv, MemoryStorage::new(), DriverConfig::default()),
            clients: Vec::new(),
            mail: Mailboxes::default(),
            events: vec![Vec::new(); n],
        };
        for i in 0..n {
            let user_id = UserId::new(i as u64 + 1);
            world.clients.push(Client::new(TestEnv, ClientIdentity { user_id }));
            world.server.process_event(ServerEvent::ConnectionAccepted { session_id: i as u64 }).unwrap();
            world.act(i, ClientEvent::Connect);
            world.deliver(i);
        }
        world
    }

    /// Run a client event and push whatever it sends to the server. Replies
    /// stay in the inboxes until delivered.
    fn act(&mut self, i: usize, event: ClientEvent) {
        let actions = self.clients[i].handle(event).unwrap();
        self.route(i, actions);
    }

    fn route(&mut self, i: usize, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Send(frame) => {
                    let out = self
                        .server
                        .process_event(ServerEvent::FrameReceived { session_id: i as u64, frame })
                        .unwrap();
                    let policy = self.server.config().broadcast;
                    execute_actions(&mut self.mail, self.server.registry(), policy, out);
                },
                other => self.events[i].push(other),
            }
        }
    }

    /// Hand client `i` everything in its inbox, routing what it sends back.
    fn deliver(&mut self, i: usize) {
        while let Some(frames) = self.mail.0.remove(&(i as u64)) {
            for frame in frames {
                let actions = self.clients[i].handle(ClientEvent::FrameReceived(frame)).unwrap();
                self.route(i, actions);
            }
        }
    }

    fn settle(&mut self) {
        while !self.mail.0.values().all(Vec::is_empty) {
            for i in 0..self.clients.len() {
                self.deliver(i);
            }
            self.mail.0.retain(|_, frames| !frames.is_empty());
        }
    }

    fn last_created(&mut self, i: usize) -> EntityRef {
        self.events[i]
            .iter()
            .rev()
            .find_map(|a| match a {
                ClientAction::Created(entity) => Some(*entity),
                _ => None,
            })
            .unwrap()
    }

    fn order(&self, i: usize, list: ListId) -> Vec<CardId> {
        self.clients[i].board().unwrap().list(list).unwrap().card_order().into_vec()
    }

    /// Board with lists A and B; A holds three cards, B one. Every client
    /// has it open.
    fn seeded_board(&mut self) -> (BoardId, ListId, ListId, Vec<CardId>) {
        self.act(0, ClientEvent::CreateBoard { title: "Team".into(), workspace_id: WorkspaceId::new(1) });
        self.deliver(0);
        let EntityRef::Board(board) = self.last_created(0) else { panic!("expected board") };

        for i in 0..self.clients.len() {
            self.act(i, ClientEvent::OpenBoard { board_id: board });
            self.deliver(i);
        }

        let mut lists = Vec::new();
        for title in ["A", "B"] {
            self.act(0, ClientEvent::CreateList { title: title.into() });
            self.deliver(0);
            let EntityRef::List(list) = self.last_created(0) else { panic!("expected list") };
            lists.push(list);
        }

        let mut cards = Vec::new();
        for (title, list) in [("c1", lists[0]), ("c2", lists[0]), ("c3", lists[0]), ("c4", lists[1])] {
            self.act(0, ClientEvent::CreateCard(CreateCard {
                list_id: list,
                title: title.into(),
                description: String::new(),
                members: vec![],
                due: None,
                labels: vec![],
            }));
            self.deliver(0);
            let EntityRef::Card(card) = self.last_created(0) else { panic!("expected card") };
            cards.push(card);
        }

        self.settle();
        (board, lists[0], lists[1], cards)
    }
}

#[test]
fn handshake_assigns_session() {
    let world = World::new(2);
    assert_eq!(world.clients[0].session_id(), Some(0));
    assert_eq!(world.clients[1].session_id(), Some(1));
}

#[test]
fn requests_before_handshake_fail_locally() {
    let mut client = Client::new(TestEnv, ClientIdentity { user_id: UserId::new(1) });
    let result = client.handle(ClientEvent::OpenBoard { board_id: BoardId::new(1) });
    assert!(result.is_err());
}

#[test]
fn all_clients_see_created_entities() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();

    for i in 0..2 {
        assert_eq!(world.order(i, a), cards[..3].to_vec());
        assert_eq!(world.order(i, b), vec![cards[3]]);
    }
}

#[test]
fn optimistic_move_shows_before_echo() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();
    let [c1, c2, c3, c4] = cards[..] else { unreachable!() };

    world.act(0, ClientEvent::MoveCard {
        card_id: c2,
        source_list_id: a,
        dest_list_id: b,
        source_index: 1,
        dest_index: 0,
    });

    // Client 0 already shows the prediction; client 1 has not heard yet.
    assert_eq!(world.order(0, a), vec![c1, c3]);
    assert_eq!(world.order(0, b), vec![c2, c4]);
    assert_eq!(world.order(1, a), vec![c1, c2, c3]);

    world.settle();

    for i in 0..2 {
        assert_eq!(world.order(i, a), vec![c1, c3]);
        assert_eq!(world.order(i, b), vec![c2, c4]);
        assert_eq!(world.clients[i].board().unwrap().card(c2).unwrap().list_id, b);
    }
    assert_eq!(world.clients[0].pending_requests(), 0);
}

#[test]
fn same_position_drop_sends_nothing() {
    let mut world = World::new(1);
    let (_, a, _, cards) = world.seeded_board();

    let actions = world.clients[0]
        .handle(ClientEvent::MoveCard {
            card_id: cards[0],
            source_list_id: a,
            dest_list_id: a,
            source_index: 0,
            dest_index: 0,
        })
        .unwrap();
    assert!(actions.is_empty());
}

#[test]
fn rejected_move_rolls_back_and_refetches() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();
    let [c1, c2, c3, c4] = cards[..] else { unreachable!() };

    // Client 1 deletes c2; client 0 has not received the broadcast yet.
    world.act(1, ClientEvent::DeleteCard { card_id: c2 });
    world.deliver(1);

    world.act(0, ClientEvent::MoveCard {
        card_id: c2,
        source_list_id: a,
        dest_list_id: b,
        source_index: 1,
        dest_index: 0,
    });
    assert_eq!(world.order(0, b), vec![c2, c4]);

    world.settle();

    let rejected = world.events[0].iter().find_map(|a| match a {
        ClientAction::Rejected { kind, .. } => Some(*kind),
        _ => None,
    });
    assert_eq!(rejected, Some(ErrorKind::InconsistentState));
    for i in 0..2 {
        assert_eq!(world.order(i, a), vec![c1, c3]);
        assert_eq!(world.order(i, b), vec![c4]);
    }
}

#[test]
fn concurrent_moves_converge_to_last_writer() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();
    let [c1, c2, c3, c4] = cards[..] else { unreachable!() };

    // Both drag c1 before hearing about the other's move.
    world.act(0, ClientEvent::MoveCard {
        card_id: c1,
        source_list_id: a,
        dest_list_id: a,
        source_index: 0,
        dest_index: 2,
    });
    world.act(1, ClientEvent::MoveCard {
        card_id: c1,
        source_list_id: a,
        dest_list_id: b,
        source_index: 0,
        dest_index: 1,
    });
    world.settle();

    for i in 0..2 {
        assert_eq!(world.order(i, a), vec![c2, c3]);
        assert_eq!(world.order(i, b), vec![c4, c1]);
    }
}

#[test]
fn list_reorder_reaches_everyone() {
    let mut world = World::new(2);
    let (_, a, b, _) = world.seeded_board();

    world.act(1, ClientEvent::MoveList { list_id: b, source_index: 1, dest_index: 0 });
    world.settle();

    for i in 0..2 {
        let order: Vec<ListId> = world.clients[i].board().unwrap().lists().iter().map(|l| l.id).collect();
        assert_eq!(order, vec![b, a]);
    }
}

#[test]
fn missed_broadcast_repaired_by_refresh() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();

    world.act(0, ClientEvent::MoveCard {
        card_id: cards[0],
        source_list_id: a,
        dest_list_id: b,
        source_index: 0,
        dest_index: 0,
    });
    world.deliver(0);
    // Client 1 loses its broadcast.
    world.mail.0.remove(&1);
    assert_eq!(world.order(1, a), cards[..3].to_vec());

    world.act(1, ClientEvent::Refresh);
    world.settle();

    assert_eq!(world.order(1, a), world.order(0, a));
    assert_eq!(world.order(1, b), world.order(0, b));
}

#[test]
fn dropped_connection_rolls_back_and_rejoins() {
    let mut world = World::new(2);
    let (_, a, b, cards) = world.seeded_board();
    let [c1, c2, c3, c4] = cards[..] else { unreachable!() };

    // The move is shown locally but never reaches the server.
    let unsent = world.clients[0]
        .handle(ClientEvent::MoveCard {
            card_id: c2,
            source_list_id: a,
            dest_list_id: b,
            source_index: 1,
            dest_index: 0,
        })
        .unwrap();
    assert!(unsent.iter().any(|action| matches!(action, ClientAction::Send(_))));
    assert_eq!(world.order(0, a), vec![c1, c3]);

    let actions = world.clients[0].handle(ClientEvent::Disconnected).unwrap();
    assert!(actions.iter().any(|action| matches!(action, ClientAction::BoardUpdated(_))));
    assert_eq!(world.clients[0].session_id(), None);
    assert_eq!(world.clients[0].pending_requests(), 0);
    assert_eq!(world.order(0, a), vec![c1, c2, c3]);
    assert!(world.clients[0].handle(ClientEvent::Refresh).is_err());

    // Someone else moves while client 0 is away.
    world
        .server
        .process_event(ServerEvent::ConnectionClosed { session_id: 0, reason: "reset".into() })
        .unwrap();
    world.act(1, ClientEvent::MoveCard {
        card_id: c1,
        source_list_id: a,
        dest_list_id: b,
        source_index: 0,
        dest_index: 1,
    });
    world.settle();

    // Reconnecting re-joins the board and re-fetches it.
    world.server.process_event(ServerEvent::ConnectionAccepted { session_id: 0 }).unwrap();
    world.act(0, ClientEvent::Connect);
    world.settle();

    assert_eq!(world.clients[0].session_id(), Some(0));
    assert_eq!(world.order(0, a), vec![c2, c3]);
    assert_eq!(world.order(0, b), vec![c4, c1]);
    assert!(world.server.registry().is_subscribed(0, world.clients[0].board().unwrap().id()));
}

#[test]
fn renamed_list_reaches_every_view() {
    let mut world = World::new(2);
    let (_, a, _, cards) = world.seeded_board();

    world.act(0, ClientEvent::RenameList { list_id: a, title: "Doing".into() });
    world.settle();

    for i in 0..2 {
        let list = world.clients[i].board().unwrap().list(a).unwrap();
        assert_eq!(list.title, "Doing");
        assert_eq!(list.card_order().into_vec(), cards[..3].to_vec());
    }
    assert!(world.events[1].iter().any(|action| matches!(action, ClientAction::BoardUpdated(_))));
}

#[test]
fn assignee_reads_inbox_and_tasks() {
    let mut world = World::new(2);
    let (_, _, b, _) = world.seeded_board();

    world.act(0, ClientEvent::CreateCard(CreateCard {
        list_id: b,
        title: "Handover".into(),
        description: String::new(),
        members: vec![UserId::new(2)],
        due: None,
        labels: vec![],
    }));
    world.settle();
    assert!(world.events[1].iter().any(|action| matches!(action, ClientAction::Notification(_))));

    let inbox = |world: &mut World| {
        world.act(1, ClientEvent::FetchNotifications);
        world.deliver(1);
        world.events[1]
            .iter()
            .rev()
            .find_map(|action| match action {
                ClientAction::Inbox(notifications) => Some(notifications.clone()),
                _ => None,
            })
            .unwrap()
    };

    let unread = inbox(&mut world);
    assert_eq!(unread.len(), 1);
    assert!(!unread[0].is_read);

    world.act(1, ClientEvent::MarkNotificationsRead { ids: vec![unread[0].id] });
    world.deliver(1);
    assert!(inbox(&mut world)[0].is_read);

    world.act(1, ClientEvent::FetchTasks);
    world.deliver(1);
    let tasks = world.events[1]
        .iter()
        .find_map(|action| match action {
            ClientAction::Tasks(cards) => Some(cards.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(tasks.iter().map(|card| card.title.as_str()).collect::<Vec<_>>(), vec!["Handover"]);
    assert_eq!(world.clients[1].pending_requests(), 0);
}
