//! Deterministic simulation harness for Pinboard protocol testing.
//!
//! Two ways to run the real server and client code reproducibly:
//!
//! - [`SimWorld`]: everything in one thread, frames passed through inboxes
//!   the test controls. Used for races, broadcast loss and model-based
//!   testing against [`ModelBoard`].
//! - [`SimTransport`] / [`SimPeer`]: the tokio runtime glue over turmoil's
//!   simulated TCP.
//!
//! All randomness flows from [`SimEnv`], and storage faults are injected
//! with [`FaultyStorage`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty_storage;
pub mod model;
pub mod sim_env;
pub mod sim_transport;
pub mod sim_world;

pub use faulty_storage::{FaultPlan, FaultyStorage};
pub use model::{Gesture, ModelBoard, ModelError, Operation, perform};
pub use sim_env::SimEnv;
pub use sim_transport::{PeerError, SimConnection, SimPeer, SimTransport};
pub use sim_world::{BoardOrder, SeededBoard, SimWorld, WorldError, view_order};
