//! Pool tuning knobs.

use std::time::Duration;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections per shard.
    pub max_connections_per_shard: usize,
    /// How long to wait for a free slot.
    pub acquire_timeout: Duration,
    /// How long to wait for a new connection to be established.
    pub connect_timeout: Duration,
    /// How long the caller's operation may run on a connection.
    pub query_timeout: Duration,
    /// Same-shard retry of transient acquisition failures.
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_shard: 10,
            acquire_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
        }
    }
}

/// Exponential backoff for retrying acquisition against the same shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on the delay between retries.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }

    /// Delay before retry number `attempt` (1-based): doubles each time up
    /// to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
