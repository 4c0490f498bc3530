//! Consistent hashing ring implementation.

use std::collections::{BTreeMap, HashMap};

use shardgate_types::ShardId;
use tracing::{debug, warn};

use crate::error::RingError;

/// A key whose owning shard differs between two ring states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    /// The key that moved.
    pub key: String,
    /// Owner in the old ring.
    pub from: ShardId,
    /// Owner in the new ring.
    pub to: ShardId,
}

/// Consistent hashing ring for deterministic shard selection.
///
/// Each shard is mapped to multiple virtual nodes (vnodes) on a u64 ring.
/// A key belongs to the first vnode found walking clockwise from the key's
/// own position.
#[derive(Debug, Clone)]
pub struct Ring {
    /// Virtual node positions: ring position -> owning shard.
    vnodes: BTreeMap<u64, ShardId>,
    /// Positions actually claimed by each shard.
    ///
    /// A vnode whose position is already taken by an earlier shard is
    /// skipped, so this is not always `weight` entries long.
    shards: HashMap<ShardId, Vec<u64>>,
    /// Number of vnodes given to a shard added with [`Ring::add`].
    vnodes_per_shard: u16,
}

impl Ring {
    /// Create a new empty ring.
    pub fn new(vnodes_per_shard: u16) -> Self {
        Self {
            vnodes: BTreeMap::new(),
            shards: HashMap::new(),
            vnodes_per_shard: vnodes_per_shard.max(1),
        }
    }

    /// Build a ring from a list of shards, failing on the first duplicate.
    pub fn with_shards<I>(vnodes_per_shard: u16, shards: I) -> Result<Self, RingError>
    where
        I: IntoIterator<Item = ShardId>,
    {
        let mut ring = Self::new(vnodes_per_shard);
        for shard_id in shards {
            ring.add(shard_id)?;
        }
        Ok(ring)
    }

    /// Add a shard with the ring's default vnode count.
    pub fn add(&mut self, shard_id: ShardId) -> Result<(), RingError> {
        self.add_with_weight(shard_id, self.vnodes_per_shard)
    }

    /// Add a shard with an explicit number of vnodes.
    ///
    /// A shard with twice the weight owns roughly twice the key space.
    pub fn add_with_weight(&mut self, shard_id: ShardId, weight: u16) -> Result<(), RingError> {
        if self.shards.contains_key(&shard_id) {
            return Err(RingError::DuplicateShard(shard_id));
        }

        let mut claimed = Vec::with_capacity(weight as usize);
        for i in 0..weight.max(1) {
            let pos = vnode_position(&shard_id, i);
            match self.vnodes.get(&pos) {
                // First claimant keeps a contested position.
                Some(owner) => warn!(%shard_id, %owner, pos, "vnode position collision, skipping"),
                None => {
                    self.vnodes.insert(pos, shard_id.clone());
                    claimed.push(pos);
                }
            }
        }

        debug!(%shard_id, vnodes = claimed.len(), "added shard to ring");
        self.shards.insert(shard_id, claimed);
        Ok(())
    }

    /// Remove a shard and all of its vnodes.
    pub fn remove(&mut self, shard_id: &ShardId) -> Result<(), RingError> {
        let positions = self
            .shards
            .remove(shard_id)
            .ok_or_else(|| RingError::UnknownShard(shard_id.clone()))?;

        for pos in positions {
            self.vnodes.remove(&pos);
        }
        debug!(%shard_id, "removed shard from ring");
        Ok(())
    }

    /// Return the shard owning `key`.
    ///
    /// Walks clockwise from the key's position to the first vnode at or
    /// after it, wrapping to the lowest position when the walk runs off
    /// the end.
    pub fn resolve(&self, key: &[u8]) -> Result<&ShardId, RingError> {
        let pos = key_position(key);
        self.vnodes
            .range(pos..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, shard_id)| shard_id)
            .ok_or(RingError::EmptyRing)
    }

    /// List the keys whose owner differs between `old` and `new`.
    ///
    /// Keys that cannot be resolved in either ring (empty ring) are skipped.
    pub fn diff<K: AsRef<str>>(old: &Ring, new: &Ring, keys: &[K]) -> Vec<Remap> {
        keys.iter()
            .filter_map(|key| {
                let key = key.as_ref();
                let from = old.resolve(key.as_bytes()).ok()?;
                let to = new.resolve(key.as_bytes()).ok()?;
                (from != to).then(|| Remap {
                    key: key.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect()
    }

    /// Whether `shard_id` is a ring member.
    pub fn contains(&self, shard_id: &ShardId) -> bool {
        self.shards.contains_key(shard_id)
    }

    /// Number of member shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of vnodes on the ring.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Default vnode count for newly added shards.
    pub fn vnodes_per_shard(&self) -> u16 {
        self.vnodes_per_shard
    }

    /// Member shard IDs, sorted.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Compute a vnode's position: blake3(shard_id ++ vnode_index) truncated to u64.
fn vnode_position(shard_id: &ShardId, vnode_index: u16) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(shard_id.as_ref());
    hasher.update(&vnode_index.to_le_bytes());
    truncate(hasher.finalize())
}

/// Compute a key's position: blake3(key) truncated to u64.
fn key_position(key: &[u8]) -> u64 {
    truncate(blake3::hash(key))
}

fn truncate(hash: blake3::Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
