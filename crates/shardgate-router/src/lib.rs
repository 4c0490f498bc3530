//! Request routing for shardgate.
//!
//! The [`Router`] derives a partition key from each entity key, resolves the
//! owning shard on the consistent hash ring, and runs the storage command on
//! a pooled connection to that shard. It holds no record data itself.
//!
//! There is no cross-shard fallback: if the owning shard is down, the
//! request fails with that shard's error.

pub mod error;
pub mod router;

pub use error::RouterError;
pub use router::{ReadOutcome, Router, RouterConfig, WriteReceipt};

#[cfg(test)]
mod tests;
