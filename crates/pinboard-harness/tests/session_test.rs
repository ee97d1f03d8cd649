//! Session liveness: keepalives, idle closes and reconnects.

use std::time::Duration;

use pinboard_client::{ClientEvent, KEEPALIVE_INTERVAL};
use pinboard_harness::{SeededBoard, SimWorld};

fn drag_first_across(world: &mut SimWorld, seeded: &SeededBoard) {
    let (a, cards) = &seeded.lists[0];
    let (b, _) = &seeded.lists[1];
    world
        .act(0, ClientEvent::MoveCard {
            card_id: cards[0],
            source_list_id: *a,
            dest_list_id: *b,
            source_index: 0,
            dest_index: 0,
        })
        .unwrap();
    world.settle().unwrap();
}

#[test]
fn passive_viewer_stays_subscribed() {
    let mut world = SimWorld::new(2, 5).unwrap();
    let seeded = world.seed_board(2, 2).unwrap();

    // Well past the idle timeout; client 1 never does anything but tick.
    for _ in 0..4 {
        world.advance(KEEPALIVE_INTERVAL + Duration::from_secs(1)).unwrap();
        world.settle().unwrap();
        world.tick_server().unwrap();
    }

    assert!(world.is_connected(1));
    assert!(world.closed_sessions().is_empty());
    assert_eq!(world.client(1).unwrap().pending_requests(), 0);

    drag_first_across(&mut world, &seeded);
    let server = world.server_order(seeded.board_id).unwrap();
    assert_eq!(world.client_order(1), Some(server));
}

#[test]
fn ticks_within_interval_send_nothing() {
    let mut world = SimWorld::new(1, 6).unwrap();
    world.seed_board(1, 1).unwrap();

    let sent = world.act(0, ClientEvent::Tick).unwrap();
    assert_eq!(sent, 0);

    world.env().advance(KEEPALIVE_INTERVAL);
    assert_eq!(world.act(0, ClientEvent::Tick).unwrap(), 1);
    assert_eq!(world.act(0, ClientEvent::Tick).unwrap(), 0);
}

#[test]
fn dropped_viewer_rejoins_and_catches_up() {
    let mut world = SimWorld::new(2, 7).unwrap();
    let seeded = world.seed_board(2, 2).unwrap();

    // Client 1 misses its ticks; client 0 keeps talking.
    world.env().advance(Duration::from_secs(100));
    world.act(0, ClientEvent::Refresh).unwrap();
    world.settle().unwrap();
    world.tick_server().unwrap();

    assert!(world.is_connected(0));
    assert!(!world.is_connected(1));
    assert_eq!(world.closed_sessions(), &[1]);
    assert_eq!(world.client(1).unwrap().session_id(), None);

    drag_first_across(&mut world, &seeded);
    let server = world.server_order(seeded.board_id).unwrap();
    assert_ne!(world.client_order(1), Some(server.clone()));

    world.reconnect(1).unwrap();
    world.settle().unwrap();

    assert!(world.is_connected(1));
    assert_eq!(world.client_order(1), Some(server));

    // Subscribed again: the next move reaches it without a refresh.
    let (b, b_cards) = world.server_order(seeded.board_id).unwrap()[1].clone();
    world
        .act(0, ClientEvent::MoveCard {
            card_id: b_cards[0],
            source_list_id: b,
            dest_list_id: b,
            source_index: 0,
            dest_index: 2,
        })
        .unwrap();
    world.settle().unwrap();
    let server = world.server_order(seeded.board_id).unwrap();
    assert_eq!(world.client_order(1), Some(server));
}
