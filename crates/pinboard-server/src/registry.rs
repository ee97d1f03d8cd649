//! Connection registry.
//!
//! Tracks sessions, the user each session authenticated as, and which
//! boards each session is subscribed to. Subscription sets are the
//! broadcast groups: a board event goes to every session in its board's
//! set, the initiator included.
//!
//! Ordered maps keep fan-out order deterministic under simulation.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use pinboard_proto::{BoardId, UserId};

/// Per-session state.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Authenticated user, once Hello has been processed.
    pub user_id: Option<UserId>,
    /// Boards this session receives events for.
    pub boards: BTreeSet<BoardId>,
    /// Last time a frame arrived on this session.
    pub last_activity: Instant,
}

/// Session and subscription bookkeeping.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: BTreeMap<u64, SessionInfo>,
    subscribers: BTreeMap<BoardId, BTreeSet<u64>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Returns `false` if the id is already in use.
    pub fn register_session(&mut self, session_id: u64, now: Instant) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(
            session_id,
            SessionInfo { user_id: None, boards: BTreeSet::new(), last_activity: now },
        );
        true
    }

    /// Remove a session and all its subscriptions.
    pub fn unregister_session(&mut self, session_id: u64) -> Option<SessionInfo> {
        let info = self.sessions.remove(&session_id)?;
        for board_id in &info.boards {
            self.remove_subscriber(*board_id, session_id);
        }
        Some(info)
    }

    /// Bind a session to a user.
    pub fn authenticate(&mut self, session_id: u64, user_id: UserId) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(info) => {
                info.user_id = Some(user_id);
                true
            },
            None => false,
        }
    }

    /// Session state.
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// User a session authenticated as.
    pub fn user(&self, session_id: u64) -> Option<UserId> {
        self.sessions.get(&session_id).and_then(|info| info.user_id)
    }

    /// Record activity on a session.
    pub fn touch(&mut self, session_id: u64, now: Instant) {
        if let Some(info) = self.sessions.get_mut(&session_id) {
            info.last_activity = now;
        }
    }

    /// Subscribe a session to a board. Idempotent; returns whether the
    /// subscription is new.
    pub fn join(&mut self, session_id: u64, board_id: BoardId) -> bool {
        let Some(info) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        let added = info.boards.insert(board_id);
        self.subscribers.entry(board_id).or_default().insert(session_id);
        added
    }

    /// Unsubscribe a session from a board. Returns whether it was
    /// subscribed.
    pub fn leave(&mut self, session_id: u64, board_id: BoardId) -> bool {
        let removed =
            self.sessions.get_mut(&session_id).is_some_and(|info| info.boards.remove(&board_id));
        self.remove_subscriber(board_id, session_id);
        removed
    }

    /// Sessions subscribed to a board, in ascending id order.
    pub fn subscribers(&self, board_id: BoardId) -> impl Iterator<Item = u64> + '_ {
        self.subscribers.get(&board_id).into_iter().flatten().copied()
    }

    /// Whether a session is subscribed to a board.
    pub fn is_subscribed(&self, session_id: u64, board_id: BoardId) -> bool {
        self.subscribers.get(&board_id).is_some_and(|set| set.contains(&session_id))
    }

    /// Sessions with no activity for longer than `timeout`.
    pub fn idle_sessions(&self, now: Instant, timeout: Duration) -> Vec<u64> {
        self.sessions
            .iter()
            .filter(|(_, info)| now.saturating_duration_since(info.last_activity) > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn remove_subscriber(&mut self, board_id: BoardId, session_id: u64) {
        if let Some(set) = self.subscribers.get_mut(&board_id) {
            set.remove(&session_id);
            if set.is_empty() {
                self.subscribers.remove(&board_id);
            }
        }
    }
}
