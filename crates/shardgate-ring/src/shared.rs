//! Copy-on-write publication of ring snapshots.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use shardgate_types::ShardId;
use tracing::info;

use crate::error::RingError;
use crate::ring::Ring;

/// Process-wide ring handle shared by all routing tasks.
///
/// Readers take an `Arc<Ring>` snapshot and resolve against it without
/// holding any lock. Writers clone the current ring, apply the change to
/// the clone, and swap the new snapshot in. A resolve therefore sees either
/// the pre-change or the post-change ring, never a partial one.
pub struct SharedRing {
    current: RwLock<Arc<Ring>>,
    /// Serializes writers so two concurrent changes cannot both start from
    /// the same base snapshot and lose one update.
    write_lock: Mutex<()>,
}

impl SharedRing {
    /// Wrap an initial ring.
    pub fn new(ring: Ring) -> Self {
        Self {
            current: RwLock::new(Arc::new(ring)),
            write_lock: Mutex::new(()),
        }
    }

    /// Return the current snapshot.
    pub fn snapshot(&self) -> Arc<Ring> {
        Arc::clone(&self.current.read())
    }

    /// Resolve `key` against the current snapshot.
    pub fn resolve(&self, key: &[u8]) -> Result<ShardId, RingError> {
        self.snapshot().resolve(key).cloned()
    }

    /// Add a shard and publish the new snapshot.
    pub fn add(&self, shard_id: ShardId) -> Result<Arc<Ring>, RingError> {
        self.update(|ring| ring.add(shard_id.clone()))
            .inspect(|ring| info!(%shard_id, shards = ring.shard_count(), "shard joined ring"))
    }

    /// Remove a shard and publish the new snapshot.
    pub fn remove(&self, shard_id: &ShardId) -> Result<Arc<Ring>, RingError> {
        self.update(|ring| ring.remove(shard_id))
            .inspect(|ring| info!(%shard_id, shards = ring.shard_count(), "shard left ring"))
    }

    /// Apply `change` to a copy of the current ring and publish it on success.
    ///
    /// On error the published snapshot is left untouched.
    fn update<F>(&self, change: F) -> Result<Arc<Ring>, RingError>
    where
        F: FnOnce(&mut Ring) -> Result<(), RingError>,
    {
        let _guard = self.write_lock.lock();
        let mut next = Ring::clone(&self.snapshot());
        change(&mut next)?;

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        Ok(next)
    }
}

impl std::fmt::Debug for SharedRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.snapshot();
        f.debug_struct("SharedRing")
            .field("shards", &ring.shard_count())
            .field("vnodes", &ring.vnode_count())
            .finish()
    }
}
