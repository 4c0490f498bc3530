//! [`Router`]: partition-key derivation, shard resolution and dispatch.

use std::sync::Arc;

use bytes::Bytes;
use shardgate_pool::{PoolConfig, ShardConnectionPool};
use shardgate_ring::{Ring, RingError, SharedRing};
use shardgate_store::{Command, Connector};
use shardgate_types::{
    DEFAULT_PARTITION_KEY_LEN, DEFAULT_VNODES_PER_SHARD, MAX_PARTITION_KEY_LEN, PartitionKey,
    Record, ShardEndpoint, ShardId,
};
use tracing::{debug, error, info};

use crate::error::RouterError;

/// Routing settings. Both values are fixed for the lifetime of the data:
/// changing either after records exist reroutes old keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Characters of the base64 digest kept as the partition key.
    pub partition_key_len: usize,
    /// Virtual nodes per shard on the ring.
    pub vnodes_per_shard: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            partition_key_len: DEFAULT_PARTITION_KEY_LEN,
            vnodes_per_shard: DEFAULT_VNODES_PER_SHARD,
        }
    }
}

impl RouterConfig {
    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), RouterError> {
        if !(1..=MAX_PARTITION_KEY_LEN).contains(&self.partition_key_len) {
            return Err(RouterError::InvalidConfig(format!(
                "partition_key_len must be in 1..={MAX_PARTITION_KEY_LEN}, got {}",
                self.partition_key_len
            )));
        }
        if self.vnodes_per_shard == 0 {
            return Err(RouterError::InvalidConfig(
                "vnodes_per_shard must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Where a write landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// The shard that stored the record.
    pub shard_id: ShardId,
    /// The key to read the record back with.
    pub partition_key: PartitionKey,
}

/// Result of a read. A missing record is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The owning shard had a record under the partition key.
    Found(Record),
    /// The owning shard had nothing under the partition key.
    NotFound,
}

/// Routes writes and reads to the shard that owns each partition key.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and requests
/// run fully in parallel.
#[derive(Debug)]
pub struct Router {
    ring: Arc<SharedRing>,
    pool: Arc<ShardConnectionPool>,
    partition_key_len: usize,
}

impl Router {
    /// Assemble a router from an existing ring and pool.
    ///
    /// The ring's members and the pool's registered endpoints must agree.
    pub fn new(
        ring: Arc<SharedRing>,
        pool: Arc<ShardConnectionPool>,
        partition_key_len: usize,
    ) -> Result<Self, RouterError> {
        RouterConfig {
            partition_key_len,
            vnodes_per_shard: ring.snapshot().vnodes_per_shard(),
        }
        .validate()?;

        Ok(Self {
            ring,
            pool,
            partition_key_len,
        })
    }

    /// Build the ring and pool for a static endpoint list.
    pub fn build(
        config: RouterConfig,
        endpoints: Vec<ShardEndpoint>,
        connector: Arc<dyn Connector>,
        pool_config: PoolConfig,
    ) -> Result<Self, RouterError> {
        config.validate()?;

        let ring = Ring::with_shards(
            config.vnodes_per_shard,
            endpoints.iter().map(|e| e.id.clone()),
        )?;
        let pool = ShardConnectionPool::with_endpoints(connector, pool_config, endpoints)?;

        info!(
            shards = ring.shard_count(),
            vnodes = ring.vnode_count(),
            partition_key_len = config.partition_key_len,
            "router ready"
        );
        Self::new(
            Arc::new(SharedRing::new(ring)),
            Arc::new(pool),
            config.partition_key_len,
        )
    }

    /// The shared ring.
    pub fn ring(&self) -> &Arc<SharedRing> {
        &self.ring
    }

    /// The shared connection pool.
    pub fn pool(&self) -> &Arc<ShardConnectionPool> {
        &self.pool
    }

    /// Configured partition key length.
    pub fn partition_key_len(&self) -> usize {
        self.partition_key_len
    }

    /// Partition key for an entity key.
    pub fn partition_key_for(&self, entity_key: &str) -> PartitionKey {
        PartitionKey::derive(entity_key, self.partition_key_len)
    }

    /// The shard currently owning `partition_key`.
    pub fn resolve(&self, partition_key: &PartitionKey) -> Result<ShardId, RouterError> {
        Ok(self.ring.resolve(partition_key.as_ref())?)
    }

    /// Store `value` under `entity_key` on the owning shard.
    pub async fn write(
        &self,
        entity_key: &str,
        value: impl Into<Bytes>,
    ) -> Result<WriteReceipt, RouterError> {
        let partition_key = self.partition_key_for(entity_key);
        let shard_id = self.resolve(&partition_key)?;
        debug!(%shard_id, partition_key = %partition_key, "routing write");

        let params = vec![
            Bytes::copy_from_slice(partition_key.as_str().as_bytes()),
            Bytes::copy_from_slice(entity_key.as_bytes()),
            value.into(),
        ];
        let target = shard_id.clone();
        self.pool
            .with_connection(&shard_id, move |conn| {
                Box::pin(async move {
                    match conn.query(Command::Insert, params).await {
                        Ok(_) => Ok(()),
                        Err(source) => {
                            error!(shard_id = %target, error = %source, "storage write failed");
                            Err(RouterError::StorageWrite {
                                shard_id: target,
                                source,
                            })
                        }
                    }
                })
            })
            .await?;

        Ok(WriteReceipt {
            shard_id,
            partition_key,
        })
    }

    /// Look up the record stored under `partition_key`.
    ///
    /// If several entity keys share the partition key, the earliest stored
    /// record is returned.
    pub async fn read(&self, partition_key: &PartitionKey) -> Result<ReadOutcome, RouterError> {
        self.read_located(partition_key)
            .await
            .map(|(_, outcome)| outcome)
    }

    /// Like [`read`](Self::read), also returning the shard that answered.
    pub async fn read_located(
        &self,
        partition_key: &PartitionKey,
    ) -> Result<(ShardId, ReadOutcome), RouterError> {
        let shard_id = self.resolve(partition_key)?;
        debug!(%shard_id, partition_key = %partition_key, "routing read");

        let params = vec![Bytes::copy_from_slice(partition_key.as_str().as_bytes())];
        let target = shard_id.clone();
        let rows = self
            .pool
            .with_connection(&shard_id, move |conn| {
                Box::pin(async move {
                    conn.query(Command::SelectByPartitionKey, params)
                        .await
                        .map_err(|source| {
                            error!(shard_id = %target, error = %source, "storage read failed");
                            RouterError::StorageRead {
                                shard_id: target,
                                source,
                            }
                        })
                })
            })
            .await?;

        let outcome = match rows.into_iter().next() {
            Some(record) => ReadOutcome::Found(record),
            None => ReadOutcome::NotFound,
        };
        Ok((shard_id, outcome))
    }

    /// Register a new shard with the pool and add it to the ring.
    ///
    /// Keys that now resolve to the new shard are not moved; records written
    /// before the change stay on their previous owner.
    pub fn add_shard(&self, endpoint: ShardEndpoint) -> Result<(), RouterError> {
        let shard_id = endpoint.id.clone();
        if self.ring.snapshot().contains(&shard_id) {
            return Err(RingError::DuplicateShard(shard_id).into());
        }

        self.pool.register(endpoint)?;
        if let Err(e) = self.ring.add(shard_id.clone()) {
            // Keep pool and ring membership in step.
            let _ = self.pool.unregister(&shard_id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove a shard from the ring, then drop its pooled connections.
    pub fn remove_shard(&self, shard_id: &ShardId) -> Result<(), RouterError> {
        self.ring.remove(shard_id)?;
        self.pool.unregister(shard_id)?;
        Ok(())
    }

    /// Close every pooled connection. Later requests fail.
    pub fn close(&self) {
        self.pool.close_all();
    }
}
