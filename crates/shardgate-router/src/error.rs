//! Error types for the router.

use std::time::Duration;

use shardgate_pool::{PoolError, TimeoutStage};
use shardgate_ring::RingError;
use shardgate_store::StoreError;
use shardgate_types::ShardId;

/// Errors returned by [`Router`](crate::Router) operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Ring misuse: empty ring, duplicate or unknown shard.
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    /// The owning shard could not be reached.
    #[error("shard {shard_id} unavailable: {source}")]
    ShardUnavailable {
        /// The shard that owns the key.
        shard_id: ShardId,
        /// Why the connection failed.
        #[source]
        source: StoreError,
    },

    /// Acquisition or the storage call ran out of time.
    #[error("timed out during {stage} on shard {shard_id} after {after:?}")]
    Timeout {
        /// The shard that owns the key.
        shard_id: ShardId,
        /// Where the time ran out.
        stage: TimeoutStage,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The storage engine failed to persist a record.
    #[error("write to shard {shard_id} failed: {source}")]
    StorageWrite {
        /// The shard that was written to.
        shard_id: ShardId,
        /// The storage failure.
        #[source]
        source: StoreError,
    },

    /// The storage engine failed to look up a record.
    #[error("read from shard {shard_id} failed: {source}")]
    StorageRead {
        /// The shard that was read from.
        shard_id: ShardId,
        /// The storage failure.
        #[source]
        source: StoreError,
    },

    /// Any other pool failure (closed pool, endpoint bookkeeping).
    #[error("pool error: {0}")]
    Pool(PoolError),

    /// The router was built with invalid settings.
    #[error("invalid router config: {0}")]
    InvalidConfig(String),
}

impl RouterError {
    /// Whether retrying the same request against the same shard may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ShardUnavailable { .. } | Self::Timeout { .. })
    }

    /// The shard involved, when the failure is tied to one.
    pub fn shard_id(&self) -> Option<&ShardId> {
        match self {
            Self::ShardUnavailable { shard_id, .. }
            | Self::Timeout { shard_id, .. }
            | Self::StorageWrite { shard_id, .. }
            | Self::StorageRead { shard_id, .. } => Some(shard_id),
            _ => None,
        }
    }
}

impl From<PoolError> for RouterError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::ShardUnavailable { shard_id, source } => {
                Self::ShardUnavailable { shard_id, source }
            }
            PoolError::Timeout {
                shard_id,
                stage,
                after,
            } => Self::Timeout {
                shard_id,
                stage,
                after,
            },
            other => Self::Pool(other),
        }
    }
}
