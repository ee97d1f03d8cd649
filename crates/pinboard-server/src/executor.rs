//! Executes driver actions against a transport.
//!
//! The driver only describes effects. [`execute_actions`] resolves
//! broadcasts against the registry's subscription sets and hands individual
//! frames to an [`ActionExecutor`]. A failed delivery is a delivery gap: it
//! is never reported to the initiator, and depending on
//! [`BroadcastPolicy`] the lagging session is either skipped or closed.

use pinboard_proto::Frame;
use thiserror::Error;

use crate::{
    config::BroadcastPolicy,
    driver::{LogLevel, ServerAction},
    registry::ConnectionRegistry,
};

/// Delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The session's outbound queue is full or closed.
    #[error("delivery gap on session {0}")]
    DeliveryGap(u64),

    /// No transport is attached to the session.
    #[error("no transport for session {0}")]
    UnknownSession(u64),
}

/// Transport-side effects.
pub trait ActionExecutor {
    /// Queue a frame for one session.
    fn send(&mut self, session_id: u64, frame: &Frame) -> Result<(), ExecutorError>;

    /// Close a session's transport.
    fn close(&mut self, session_id: u64, reason: &str);

    /// Emit a driver log line.
    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// What happened while executing a batch of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Frames handed to the transport.
    pub delivered: usize,
    /// Sessions that missed a frame.
    pub gaps: Vec<u64>,
    /// Sessions closed by this batch. The caller must tell the driver.
    pub closed: Vec<u64>,
}

/// Execute `actions` in order.
pub fn execute_actions<X: ActionExecutor>(
    executor: &mut X,
    registry: &ConnectionRegistry,
    policy: BroadcastPolicy,
    actions: Vec<ServerAction>,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                deliver(executor, &mut report, policy, session_id, &frame);
            },
            ServerAction::Broadcast { board_id, frame } => {
                let subscribers: Vec<u64> = registry.subscribers(board_id).collect();
                for session_id in subscribers {
                    if report.closed.contains(&session_id) {
                        continue;
                    }
                    deliver(executor, &mut report, policy, session_id, &frame);
                }
            },
            ServerAction::CloseConnection { session_id, reason } => {
                if !report.closed.contains(&session_id) {
                    executor.close(session_id, &reason);
                    report.closed.push(session_id);
                }
            },
            ServerAction::Log { level, message } => executor.log(level, &message),
        }
    }

    report
}

fn deliver<X: ActionExecutor>(
    executor: &mut X,
    report: &mut ExecutionReport,
    policy: BroadcastPolicy,
    session_id: u64,
    frame: &Frame,
) {
    match executor.send(session_id, frame) {
        Ok(()) => report.delivered += 1,
        Err(err) => {
            tracing::debug!(%err, "delivery gap");
            report.gaps.push(session_id);
            if policy == BroadcastPolicy::DisconnectOnFailure {
                executor.close(session_id, "delivery failed");
                report.closed.push(session_id);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Instant};

    use pinboard_proto::{BoardId, FrameHeader, Opcode};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(u64, Opcode)>,
        closed: Vec<u64>,
        broken: HashSet<u64>,
    }

    impl ActionExecutor for Recorder {
        fn send(&mut self, session_id: u64, frame: &Frame) -> Result<(), ExecutorError> {
            if self.broken.contains(&session_id) {
                return Err(ExecutorError::DeliveryGap(session_id));
            }
            self.sent.push((session_id, frame.header.opcode_enum().unwrap_or(Opcode::Ping)));
            Ok(())
        }

        fn close(&mut self, session_id: u64, _reason: &str) {
            self.closed.push(session_id);
        }
    }

    fn registry() -> ConnectionRegistry {
        let mut registry = ConnectionRegistry::new();
        for session in 1..=3 {
            registry.register_session(session, Instant::now());
            registry.join(session, BoardId::new(1));
        }
        registry
    }

    fn broadcast() -> ServerAction {
        ServerAction::Broadcast {
            board_id: BoardId::new(1),
            frame: Frame::new(FrameHeader::new(Opcode::CardMoved), Vec::new()),
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let mut recorder = Recorder::default();
        let report =
            execute_actions(&mut recorder, &registry(), BroadcastPolicy::BestEffort, vec![broadcast()]);

        assert_eq!(report.delivered, 3);
        assert_eq!(
            recorder.sent,
            vec![(1, Opcode::CardMoved), (2, Opcode::CardMoved), (3, Opcode::CardMoved)]
        );
    }

    #[test]
    fn best_effort_skips_failed_subscriber() {
        let mut recorder = Recorder { broken: HashSet::from([2]), ..Recorder::default() };
        let report =
            execute_actions(&mut recorder, &registry(), BroadcastPolicy::BestEffort, vec![broadcast()]);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.gaps, vec![2]);
        assert!(report.closed.is_empty());
    }

    #[test]
    fn disconnect_policy_closes_failed_subscriber_once() {
        let mut recorder = Recorder { broken: HashSet::from([2]), ..Recorder::default() };
        let report = execute_actions(
            &mut recorder,
            &registry(),
            BroadcastPolicy::DisconnectOnFailure,
            vec![broadcast(), broadcast()],
        );

        assert_eq!(report.closed, vec![2]);
        assert_eq!(recorder.closed, vec![2]);
        assert_eq!(report.delivered, 4);
    }
}
