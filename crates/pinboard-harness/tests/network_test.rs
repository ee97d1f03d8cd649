//! End-to-end tests over turmoil's simulated TCP.
//!
//! The server runs the real runtime glue (driver task, ticker, per-session
//! queues); clients are [`SimPeer`]s. Virtual time makes idle timeouts and
//! latency cheap to exercise.

use std::time::Duration;

use pinboard_client::{BoardView, ClientAction, ClientEvent};
use pinboard_core::Environment;
use pinboard_harness::{PeerError, SimEnv, SimPeer, SimTransport, view_order};
use pinboard_proto::{
    BoardId, ListId, UserId, WorkspaceId,
    payloads::{outcome::EntityRef, requests::CreateCard},
};
use pinboard_server::{DriverConfig, MemoryStorage, ServerDriver, spawn_driver};

const ADDR: &str = "server:7878";

fn add_server(sim: &mut turmoil::Sim<'_>) {
    sim.host("server", || async {
        let driver =
            ServerDriver::new(SimEnv::with_seed(1), MemoryStorage::new(), DriverConfig::default());
        let handle = spawn_driver(driver);
        SimTransport::bind("0.0.0.0:7878").await?.serve(handle).await?;
        Ok(())
    });
}

/// Wait for a creation acknowledgement.
async fn created(peer: &mut SimPeer) -> Result<EntityRef, PeerError> {
    match peer.until(|a| matches!(a, ClientAction::Created(_))).await? {
        ClientAction::Created(entity) => Ok(entity),
        _ => unreachable!("until returns a matching action"),
    }
}

/// Process frames until the open board satisfies `done`.
async fn until_view<F>(peer: &mut SimPeer, mut done: F) -> Result<(), PeerError>
where
    F: FnMut(&BoardView) -> bool,
{
    while !peer.client().board().is_some_and(&mut done) {
        peer.until(|a| matches!(a, ClientAction::BoardUpdated(_))).await?;
    }
    Ok(())
}

async fn open(peer: &mut SimPeer, board_id: BoardId) -> Result<(), PeerError> {
    peer.act(ClientEvent::OpenBoard { board_id }).await?;
    until_view(peer, |view| view.id() == board_id).await
}

async fn create_list(peer: &mut SimPeer, title: &str) -> Result<ListId, Box<dyn std::error::Error>> {
    peer.act(ClientEvent::CreateList { title: title.into() }).await?;
    match created(peer).await? {
        EntityRef::List(id) => Ok(id),
        other => Err(format!("expected a list, got {other:?}").into()),
    }
}

fn card(list_id: ListId, title: &str) -> ClientEvent {
    ClientEvent::CreateCard(CreateCard {
        list_id,
        title: title.into(),
        description: String::new(),
        members: vec![],
        due: None,
        labels: vec![],
    })
}

#[test]
fn move_reaches_every_subscriber() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(60))
        .min_message_latency(Duration::from_millis(5))
        .max_message_latency(Duration::from_millis(60))
        .rng_seed(12345)
        .build();
    add_server(&mut sim);

    sim.client("users", async {
        let env = SimEnv::with_seed(2);
        let mut alice = SimPeer::connect(ADDR, env.clone(), UserId::new(1)).await?;
        let mut bob = SimPeer::connect(ADDR, env.clone(), UserId::new(2)).await?;

        alice
            .act(ClientEvent::CreateBoard { title: "Launch".into(), workspace_id: WorkspaceId::new(1) })
            .await?;
        let EntityRef::Board(board_id) = created(&mut alice).await? else {
            return Err("expected a board".into());
        };
        open(&mut alice, board_id).await?;
        open(&mut bob, board_id).await?;

        let todo = create_list(&mut alice, "Todo").await?;
        let done = create_list(&mut alice, "Done").await?;
        let mut cards = Vec::new();
        for title in ["design", "build", "ship"] {
            alice.act(card(todo, title)).await?;
            let EntityRef::Card(id) = created(&mut alice).await? else {
                return Err("expected a card".into());
            };
            cards.push(id);
        }
        until_view(&mut bob, |view| view.card_count() == 3).await?;

        // Alice drags "build" into Done; the optimistic view is immediate.
        alice
            .act(ClientEvent::MoveCard {
                card_id: cards[1],
                source_list_id: todo,
                dest_list_id: done,
                source_index: 1,
                dest_index: 0,
            })
            .await?;
        let expected = vec![(todo, vec![cards[0], cards[2]]), (done, vec![cards[1]])];
        let alice_view = alice.client().board().map(view_order);
        if alice_view.as_ref() != Some(&expected) {
            return Err(format!("alice shows {alice_view:?}").into());
        }

        until_view(&mut bob, |view| view.list(done).is_some_and(|l| !l.cards.is_empty())).await?;
        let bob_view = bob.client().board().map(view_order);
        if bob_view != Some(expected) {
            return Err(format!("bob shows {bob_view:?}").into());
        }
        if bob.client().board().and_then(|v| v.card(cards[1])).map(|c| c.list_id) != Some(done) {
            return Err("bob's card record still names the old list".into());
        }
        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn idle_session_is_closed_by_ticker() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(300)).build();
    add_server(&mut sim);

    sim.client("sleeper", async {
        let env = SimEnv::with_seed(3);
        let mut peer = SimPeer::connect(ADDR, env.clone(), UserId::new(7)).await?;
        if peer.client().session_id().is_none() {
            return Err("handshake did not complete".into());
        }

        env.sleep(Duration::from_secs(120)).await;

        match peer.until(|_| false).await {
            Err(PeerError::Closed) if peer.client().session_id().is_none() => Ok(()),
            other => Err(format!("expected the server to hang up, got {other:?}").into()),
        }
    });

    sim.run().unwrap();
}

#[test]
fn refresh_over_the_wire_matches_server() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();
    add_server(&mut sim);

    sim.client("users", async {
        let env = SimEnv::with_seed(4);
        let mut alice = SimPeer::connect(ADDR, env.clone(), UserId::new(1)).await?;
        let mut carol = SimPeer::connect(ADDR, env.clone(), UserId::new(3)).await?;

        alice
            .act(ClientEvent::CreateBoard { title: "Ops".into(), workspace_id: WorkspaceId::new(2) })
            .await?;
        let EntityRef::Board(board_id) = created(&mut alice).await? else {
            return Err("expected a board".into());
        };
        open(&mut alice, board_id).await?;

        let a = create_list(&mut alice, "A").await?;
        let b = create_list(&mut alice, "B").await?;
        alice.act(card(a, "one")).await?;
        created(&mut alice).await?;
        alice.act(ClientEvent::MoveList { list_id: b, source_index: 1, dest_index: 0 }).await?;

        // Carol opens late and gets everything from the snapshot.
        open(&mut carol, board_id).await?;
        until_view(&mut carol, |view| view.list_order().as_slice() == [b, a]).await?;
        let carol_view = carol.client().board().map(view_order);
        let alice_view = alice.client().board().map(view_order);
        if carol_view != alice_view {
            return Err(format!("carol {carol_view:?} != alice {alice_view:?}").into());
        }
        Ok(())
    });

    sim.run().unwrap();
}
