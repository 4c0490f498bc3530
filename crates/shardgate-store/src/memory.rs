//! In-process connector backed by [`MemoryEngine`]s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use shardgate_types::{Record, ShardEndpoint, ShardId};
use tracing::debug;

use crate::engine::MemoryEngine;
use crate::error::StoreError;
use crate::message::Command;
use crate::traits::{Connection, Connector};

/// Connector that routes each shard to an in-process [`MemoryEngine`].
///
/// Supports failure injection: shards marked down refuse new connections
/// and fail queries on existing ones. Engines are created on first connect,
/// so any shard ID is reachable unless marked down.
#[derive(Default)]
pub struct MemoryConnector {
    engines: RwLock<HashMap<ShardId, Arc<MemoryEngine>>>,
    down: Arc<RwLock<HashSet<ShardId>>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector with no engines yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine behind `shard_id`, creating it if needed.
    pub fn engine(&self, shard_id: &ShardId) -> Arc<MemoryEngine> {
        if let Some(engine) = self.engines.read().get(shard_id) {
            return Arc::clone(engine);
        }
        Arc::clone(self.engines.write().entry(shard_id.clone()).or_default())
    }

    /// Make `shard_id` unreachable.
    pub fn set_down(&self, shard_id: &ShardId) {
        self.down.write().insert(shard_id.clone());
    }

    /// Make `shard_id` reachable again.
    pub fn set_up(&self, shard_id: &ShardId) {
        self.down.write().remove(shard_id);
    }

    /// Number of successful `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Connection>, StoreError> {
        if self.down.read().contains(&endpoint.id) {
            return Err(StoreError::Unreachable(endpoint.addr()));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(shard_id = %endpoint.id, "opened in-memory connection");
        Ok(Box::new(MemoryConnection {
            shard_id: endpoint.id.clone(),
            engine: self.engine(&endpoint.id),
            down: Arc::clone(&self.down),
            broken: false,
        }))
    }
}

struct MemoryConnection {
    shard_id: ShardId,
    engine: Arc<MemoryEngine>,
    down: Arc<RwLock<HashSet<ShardId>>>,
    broken: bool,
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    async fn query(
        &mut self,
        command: Command,
        params: Vec<Bytes>,
    ) -> Result<Vec<Record>, StoreError> {
        if self.down.read().contains(&self.shard_id) {
            self.broken = true;
            return Err(StoreError::ConnectionClosed);
        }
        self.engine
            .execute(command, &params)
            .map_err(|e| StoreError::Engine(e.to_string()))
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}
