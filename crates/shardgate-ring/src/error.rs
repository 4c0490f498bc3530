//! Error types for ring membership and lookup.

use shardgate_types::ShardId;

/// Errors raised by ring mutation or resolution.
///
/// All three indicate a configuration or programming mistake rather than a
/// transient condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// Resolution was attempted on a ring with no shards.
    #[error("hash ring is empty")]
    EmptyRing,

    /// The shard is already a ring member.
    #[error("shard already on ring: {0}")]
    DuplicateShard(ShardId),

    /// The shard is not a ring member.
    #[error("unknown shard: {0}")]
    UnknownShard(ShardId),
}
