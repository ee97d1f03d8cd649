//! Session payloads.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Client greeting.
///
/// Authentication happens outside the protocol; by the time a client sends
/// Hello its `user_id` has already been established by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub version: u8,
    /// Authenticated user.
    pub user_id: UserId,
    /// Opaque token forwarded to the authorization collaborator.
    pub auth_token: Option<String>,
}

/// Server reply to [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Session id assigned by the server.
    pub session_id: u64,
}

/// Graceful disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason.
    pub reason: String,
}
