//! Consistent hashing ring for deterministic shard selection.
//!
//! [`Ring`] maps arbitrary keys (in practice, partition keys) to the shard
//! that owns them. Each shard is placed on a u64 ring at several virtual
//! node positions, `blake3(shard_id ++ vnode_index)`; a key is owned by the
//! first vnode at or after `blake3(key)`, wrapping around. Adding or removing
//! a shard only moves the keys that border its vnodes.
//!
//! [`SharedRing`] publishes ring snapshots copy-on-write so routing never
//! observes a half-applied membership change.

mod error;
mod ring;
mod shared;

pub use error::RingError;
pub use ring::{Remap, Ring};
pub use shared::SharedRing;
