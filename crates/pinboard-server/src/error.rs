//! Server error types.

use pinboard_proto::ProtocolError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that stop the driver from processing an event.
///
/// Request-level failures are not errors at this level; they become
/// `RequestFailed` frames addressed to the initiator.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A connection was accepted with an id that is already registered.
    #[error("session {0} already registered")]
    DuplicateSession(u64),

    /// A frame arrived for a session that was never registered.
    #[error("unknown session {0}")]
    UnknownSession(u64),

    /// A response frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Storage could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Network I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver task is gone.
    #[error("driver task stopped")]
    DriverStopped,
}
