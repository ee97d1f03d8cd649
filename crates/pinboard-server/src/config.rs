//! Server configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::applier::DEFAULT_ATTEMPTS;

/// How concurrent moves against the same list are arbitrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ConcurrencyPolicy {
    /// Every well-formed move is resolved against the current order and
    /// wins.
    #[default]
    LastWriterWins,
    /// Moves must carry the list versions they were based on; a mismatch is
    /// rejected with `StaleVersion`.
    RejectStale,
}

/// What happens when a broadcast cannot be delivered to a subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BroadcastPolicy {
    /// Skip the subscriber. Its view stays stale until it re-fetches.
    #[default]
    BestEffort,
    /// Close the subscriber's session so it reconnects and re-fetches.
    DisconnectOnFailure,
}

/// Configuration for [`crate::ServerDriver`].
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Move arbitration.
    pub concurrency: ConcurrencyPolicy,
    /// Broadcast failure handling.
    pub broadcast: BroadcastPolicy,
    /// Attempts per mutation before reporting an integrity failure.
    pub apply_attempts: u32,
    /// Sessions silent for longer than this are closed on tick.
    pub idle_timeout: Duration,
    /// Interval between ticks in the network runtime.
    pub tick_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyPolicy::default(),
            broadcast: BroadcastPolicy::default(),
            apply_attempts: DEFAULT_ATTEMPTS,
            idle_timeout: Duration::from_secs(90),
            tick_interval: Duration::from_secs(5),
        }
    }
}

/// Command-line arguments of the server binary.
#[derive(Debug, Parser)]
#[command(name = "pinboard-server", about = "Pinboard board server", version)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:4450")]
    pub bind: SocketAddr,

    /// Directory for the redb database. Omit to keep state in memory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Move arbitration policy.
    #[arg(long, value_enum, default_value_t = ConcurrencyPolicy::LastWriterWins)]
    pub concurrency: ConcurrencyPolicy,

    /// Broadcast failure policy.
    #[arg(long, value_enum, default_value_t = BroadcastPolicy::BestEffort)]
    pub broadcast_policy: BroadcastPolicy,

    /// Attempts per mutation before giving up.
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
    pub apply_attempts: u32,

    /// Idle session timeout in seconds.
    #[arg(long, default_value_t = 90)]
    pub idle_timeout_secs: u64,
}

impl ServerArgs {
    /// Driver configuration described by these arguments.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            concurrency: self.concurrency,
            broadcast: self.broadcast_policy,
            apply_attempts: self.apply_attempts,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..DriverConfig::default()
        }
    }
}
