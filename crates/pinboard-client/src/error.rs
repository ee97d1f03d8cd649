//! Client error types.

use pinboard_core::ResolveError;
use pinboard_proto::{ListId, ProtocolError};
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The session has not completed its handshake.
    #[error("not connected")]
    NotConnected,

    /// The operation needs an open board.
    #[error("no board is open")]
    NoBoard,

    /// The open board has not been fetched yet.
    #[error("board not loaded")]
    BoardNotLoaded,

    /// The list is not part of the local view.
    #[error("unknown list {0}")]
    UnknownList(ListId),

    /// The gesture does not match the local ordering.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
