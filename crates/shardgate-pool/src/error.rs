//! Error types for the connection pool.

use std::fmt;
use std::time::Duration;

use shardgate_store::StoreError;
use shardgate_types::ShardId;

/// Which suspension point ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Waiting for a free connection slot.
    Acquire,
    /// Establishing a new connection.
    Connect,
    /// Running the caller's operation on the connection.
    Query,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Acquire => "acquire",
            Self::Connect => "connect",
            Self::Query => "query",
        })
    }
}

/// Errors raised by the pool itself.
///
/// Errors produced by the caller's operation are never wrapped in this type;
/// they are returned unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A connection to the shard could not be established.
    #[error("shard unavailable: {shard_id}: {source}")]
    ShardUnavailable {
        /// The shard that could not be reached.
        shard_id: ShardId,
        /// Why the connection failed.
        #[source]
        source: StoreError,
    },

    /// A suspension point exceeded its deadline.
    #[error("timed out during {stage} on shard {shard_id} after {after:?}")]
    Timeout {
        /// The shard being accessed.
        shard_id: ShardId,
        /// Where the time ran out.
        stage: TimeoutStage,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The shard has no registered endpoint.
    #[error("no endpoint registered for shard {0}")]
    UnknownShard(ShardId),

    /// The shard already has a registered endpoint.
    #[error("endpoint already registered for shard {0}")]
    DuplicateShard(ShardId),

    /// The pool has been shut down.
    #[error("connection pool is closed")]
    Closed,
}

impl PoolError {
    /// Whether retrying against the same shard may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ShardUnavailable { .. } | Self::Timeout { .. })
    }
}
