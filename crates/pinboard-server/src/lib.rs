//! Pinboard server.
//!
//! The server owns the authoritative ordering of every board. Requests are
//! handled by a sans-IO [`ServerDriver`]: it resolves a move against the
//! stored list sequences, applies the resulting write set through the
//! [`MutationApplier`] and, only once everything is persisted, broadcasts the
//! authoritative sequences to every session subscribed to the board.
//!
//! The [`runtime`] module connects the driver to tokio TCP streams; tests
//! and the simulation harness drive it directly through
//! [`ServerDriver::process_event`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod applier;
pub mod auth;
pub mod board_manager;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod notify;
pub mod registry;
pub mod runtime;
pub mod storage;

pub use applier::{AppliedMove, ApplyError, MutationApplier, Write};
pub use auth::{AllowAll, Authorizer, GrantTable};
pub use board_manager::{BoardError, BoardManager, Mutation};
pub use config::{BroadcastPolicy, ConcurrencyPolicy, DriverConfig, ServerArgs};
pub use driver::{LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use executor::{ActionExecutor, ExecutionReport, ExecutorError, execute_actions};
pub use registry::{ConnectionRegistry, SessionInfo};
pub use runtime::{DriverHandle, SystemEnv, serve, spawn_driver};
pub use storage::{BoardRecord, ListRecord, MemoryStorage, RedbStorage, Storage, StorageError};
