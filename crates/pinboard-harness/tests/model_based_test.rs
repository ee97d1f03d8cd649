//! Model-based testing for the board ordering protocol.
//!
//! Random operation sequences run against the real server and clients in a
//! [`SimWorld`] and against a naive [`ModelBoard`]. After every step the
//! server's stored order must equal the model's, card records must agree
//! with list sequences, and every accepted mutation must have produced a
//! broadcast while every rejected or no-op one produced none. Replaying the
//! broadcast journal alone must rebuild the stored order. At the end,
//! every client that re-fetches must show exactly the server's order.

use arbitrary::{Arbitrary, Unstructured};
use pinboard_client::{ClientEvent, REQUEST_TIMEOUT};
use pinboard_harness::{ModelBoard, Operation, SimWorld, perform};
use proptest::prelude::*;

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let client = 0..4u8;

    prop_oneof![
        // Weight towards moves, the interesting part
        6 => (client.clone(), any::<u8>(), any::<u8>(), any::<u8>()).prop_map(
            |(client, card, dest_list, dest_index)| Operation::MoveCard {
                client,
                card,
                dest_list,
                dest_index
            }
        ),
        2 => (client.clone(), any::<u8>(), any::<u8>())
            .prop_map(|(client, list, dest_index)| Operation::MoveList { client, list, dest_index }),
        2 => (client.clone(), any::<u8>())
            .prop_map(|(client, list)| Operation::CreateCard { client, list }),
        1 => (client.clone(), any::<u8>())
            .prop_map(|(client, card)| Operation::DeleteCard { client, card }),
        4 => client.clone().prop_map(|client| Operation::Deliver { client }),
        1 => client.clone().prop_map(|client| Operation::LoseInbox { client }),
        1 => client.prop_map(|client| Operation::Refresh { client }),
        1 => any::<u16>().prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

/// Run `ops` against a fresh world and the model, checking agreement
/// after every step and convergence at the end.
fn check_against_model(seed: u64, clients: usize, ops: &[Operation]) -> Result<(), TestCaseError> {
    let mut world = SimWorld::new(clients, seed).unwrap();
    let seeded = world.seed_board(3, 3).unwrap();
    let board = seeded.board_id;
    let mut model = ModelBoard::new(seeded.lists.clone());

    for (i, op) in ops.iter().enumerate() {
        let before = world.broadcasts().len();
        let gesture = perform(&mut world, *op).unwrap();
        let broadcast = world.broadcasts().len() > before;

        match gesture {
            Some(gesture) => {
                let expected = model.apply(&gesture);
                prop_assert_eq!(
                    expected.unwrap_or(false),
                    broadcast,
                    "step {}: {:?} -> {:?}, model said {:?}",
                    i,
                    op,
                    gesture,
                    expected
                );
            },
            None => prop_assert!(!broadcast, "step {}: {:?} broadcast without a request", i, op),
        }

        let server = world.server_order(board).unwrap();
        prop_assert_eq!(&server, model.order(), "step {}: server diverged from model", i);
        prop_assert_eq!(
            world.replayed_order(board),
            server,
            "step {}: broadcasts do not reproduce the stored order",
            i
        );

        let violations = world.integrity_violations(board).unwrap();
        prop_assert!(violations.is_empty(), "step {}: {:?}", i, violations);
    }

    // Convergence: drain everything, let stranded requests expire, then
    // re-fetch everywhere.
    world.settle().unwrap();
    world.advance(REQUEST_TIMEOUT).unwrap();
    world.settle().unwrap();
    for client in 0..clients {
        world.act(client, ClientEvent::Refresh).unwrap();
    }
    world.settle().unwrap();

    let server = world.server_order(board).unwrap();
    for client in 0..clients {
        let order = world.client_order(client);
        prop_assert_eq!(
            order.as_ref(),
            Some(&server),
            "client {} did not converge",
            client
        );
        prop_assert_eq!(world.client(client).unwrap().pending_requests(), 0);
    }

    Ok(())
}

proptest! {
    /// Server, model and clients agree for random sessions.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        clients in 2..5usize,
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        check_against_model(seed, clients, &ops)?;
    }

    /// Same property with operations decoded from raw bytes, the way a
    /// fuzzer would produce them.
    #[test]
    fn prop_arbitrary_bytes_match_model(
        seed in any::<u64>(),
        bytes in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut source = Unstructured::new(&bytes);
        let mut ops = Vec::new();
        while ops.len() < 100 && let Ok(op) = Operation::arbitrary(&mut source) {
            ops.push(op);
            if source.is_empty() {
                break;
            }
        }
        check_against_model(seed, 3, &ops)?;
    }

    /// Moves never create or destroy cards.
    #[test]
    fn prop_moves_conserve_cards(
        seed in any::<u64>(),
        ops in prop::collection::vec(
            (0..3u8, any::<u8>(), any::<u8>(), any::<u8>()),
            1..40
        )
    ) {
        let mut world = SimWorld::new(3, seed).unwrap();
        let seeded = world.seed_board(4, 2).unwrap();
        let total = seeded.cards().count();

        for (client, card, dest_list, dest_index) in ops {
            perform(&mut world, Operation::MoveCard { client, card, dest_list, dest_index }).unwrap();
            perform(&mut world, Operation::Deliver { client: client + 1 }).unwrap();

            let server = world.server_order(seeded.board_id).unwrap();
            let count: usize = server.iter().map(|(_, cards)| cards.len()).sum();
            prop_assert_eq!(count, total);
        }
    }
}

#[test]
fn same_seed_replays_identically() {
    let ops = [
        Operation::MoveCard { client: 0, card: 1, dest_list: 2, dest_index: 0 },
        Operation::CreateCard { client: 1, list: 0 },
        Operation::MoveList { client: 1, list: 0, dest_index: 2 },
        Operation::Deliver { client: 0 },
        Operation::DeleteCard { client: 0, card: 4 },
    ];

    let run = |seed| {
        let mut world = SimWorld::new(2, seed).unwrap();
        let seeded = world.seed_board(3, 2).unwrap();
        for op in ops {
            perform(&mut world, op).unwrap();
        }
        world.settle().unwrap();
        let order = world.server_order(seeded.board_id).unwrap();
        (seeded, order)
    };

    assert_eq!(run(11), run(11));
}
