//! Environment abstraction.
//!
//! Everything non-deterministic (monotonic time, wall-clock time, sleeping,
//! randomness) is supplied through [`Environment`], so the server driver and
//! client state machines can run unchanged under a seeded simulation.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic time, used for timeouts.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for timestamps that leave the process.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random 64-bit value. The simulation draws frame-loss decisions from it.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Random 128-bit value, used for entity ids.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
