//! Convergence of client views under races and broadcast loss.

use pinboard_client::{ClientAction, ClientEvent};
use pinboard_harness::{Operation, SimWorld, perform};

fn move_card(
    world: &mut SimWorld,
    client: usize,
    card: pinboard_proto::CardId,
    from: pinboard_proto::ListId,
    to: pinboard_proto::ListId,
    source_index: u32,
    dest_index: u32,
) {
    world
        .act(client, ClientEvent::MoveCard {
            card_id: card,
            source_list_id: from,
            dest_list_id: to,
            source_index,
            dest_index,
        })
        .unwrap();
}

#[test]
fn racing_moves_of_one_card_converge_without_refresh() {
    let mut world = SimWorld::new(3, 1).unwrap();
    let seeded = world.seed_board(3, 2).unwrap();
    let (a, a_cards) = seeded.lists[0].clone();
    let (b, _) = seeded.lists[1].clone();
    let (c, _) = seeded.lists[2].clone();
    let card = a_cards[0];

    // Everyone drags the same card before hearing from anyone else.
    move_card(&mut world, 0, card, a, b, 0, 0);
    move_card(&mut world, 1, card, a, c, 0, 1);
    move_card(&mut world, 2, card, a, a, 0, 1);
    world.settle().unwrap();

    let server = world.server_order(seeded.board_id).unwrap();
    // Client 0 won; the other two were based on a stale source and rejected.
    assert_eq!(server[1].1[0], card);
    for client in 0..3 {
        assert_eq!(world.client_order(client), Some(server.clone()), "client {client}");
    }

    let rejected = |client| {
        world.actions(client).iter().any(|a| matches!(a, ClientAction::Rejected { .. }))
    };
    assert!(!rejected(0));
    assert!(rejected(1));
    assert!(rejected(2));
}

#[test]
fn interleaved_delivery_converges() {
    let mut world = SimWorld::new(2, 2).unwrap();
    let seeded = world.seed_board(2, 3).unwrap();
    let (a, cards) = seeded.lists[0].clone();
    let (b, _) = seeded.lists[1].clone();

    move_card(&mut world, 0, cards[0], a, b, 0, 0);
    world.deliver(1).unwrap();
    // Client 1 saw the first move; client 0 has not seen its own echo yet.
    move_card(&mut world, 1, cards[2], a, a, 1, 0);
    move_card(&mut world, 0, cards[1], a, b, 1, 5);
    world.deliver(0).unwrap();
    world.deliver(1).unwrap();

    let server = world.server_order(seeded.board_id).unwrap();
    assert_eq!(world.client_order(0), Some(server.clone()));
    assert_eq!(world.client_order(1), Some(server));
}

#[test]
fn lossy_broadcasts_repaired_by_refresh() {
    let mut world = SimWorld::new(4, 3).unwrap();
    let seeded = world.seed_board(4, 4).unwrap();
    world.set_loss(300);

    for step in 0..200u32 {
        let op = Operation::MoveCard {
            client: (step % 4) as u8,
            card: (step * 7) as u8,
            dest_list: (step * 3) as u8,
            dest_index: (step * 5 % 7) as u8,
        };
        perform(&mut world, op).unwrap();
        if step % 5 == 0 {
            world.settle().unwrap();
        }
    }
    world.settle().unwrap();
    assert!(world.lost_frames() > 0);

    world.set_loss(0);
    for client in 0..4 {
        world.act(client, ClientEvent::Refresh).unwrap();
    }
    world.settle().unwrap();

    let server = world.server_order(seeded.board_id).unwrap();
    for client in 0..4 {
        assert_eq!(world.client_order(client), Some(server.clone()), "client {client}");
    }
    assert!(world.integrity_violations(seeded.board_id).unwrap().is_empty());
}

#[test]
fn list_reorders_race_to_one_order() {
    let mut world = SimWorld::new(2, 4).unwrap();
    let seeded = world.seed_board(4, 0).unwrap();
    let lists: Vec<_> = seeded.lists.iter().map(|(id, _)| *id).collect();

    world.act(0, ClientEvent::MoveList { list_id: lists[0], source_index: 0, dest_index: 3 }).unwrap();
    world.act(1, ClientEvent::MoveList { list_id: lists[3], source_index: 3, dest_index: 0 }).unwrap();
    world.settle().unwrap();

    let server = world.server_order(seeded.board_id).unwrap();
    let order: Vec<_> = server.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![lists[3], lists[1], lists[2], lists[0]]);
    assert_eq!(world.client_order(0), Some(server.clone()));
    assert_eq!(world.client_order(1), Some(server));
}
