//! Board access control.
//!
//! Authentication happens before a session reaches the driver; this module
//! only answers whether an authenticated user may read and mutate a board.

use std::collections::HashSet;

use pinboard_proto::{BoardId, UserId};

/// Decides board access. Consulted before any resolution or write.
pub trait Authorizer: Send + 'static {
    /// Whether `user_id` may access `board_id`.
    fn can_access(&self, user_id: UserId, board_id: BoardId) -> bool;

    /// Called after `owner` created `board_id`.
    fn board_created(&mut self, owner: UserId, board_id: BoardId) {
        let _ = (owner, board_id);
    }
}

/// Grants every user access to every board.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_access(&self, _user_id: UserId, _board_id: BoardId) -> bool {
        true
    }
}

/// Explicit per-board grants. Board creators are granted automatically.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: HashSet<(UserId, BoardId)>,
}

impl GrantTable {
    /// No grants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `user_id` on `board_id`.
    pub fn grant(&mut self, user_id: UserId, board_id: BoardId) {
        self.grants.insert((user_id, board_id));
    }

    /// Revoke access.
    pub fn revoke(&mut self, user_id: UserId, board_id: BoardId) {
        self.grants.remove(&(user_id, board_id));
    }
}

impl Authorizer for GrantTable {
    fn can_access(&self, user_id: UserId, board_id: BoardId) -> bool {
        self.grants.contains(&(user_id, board_id))
    }

    fn board_created(&mut self, owner: UserId, board_id: BoardId) {
        self.grant(owner, board_id);
    }
}
