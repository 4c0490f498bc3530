//! Bounded per-shard connection pool.

use std::collections::HashMap;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use shardgate_store::{Connection, Connector};
use shardgate_types::{ShardEndpoint, ShardId};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, TimeoutStage};

/// Future returned by a [`ShardConnectionPool::with_connection`] operation.
///
/// The future borrows the connection for `'c`.
pub type ConnFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Snapshot of one shard's pool usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPoolStats {
    /// The shard.
    pub shard_id: ShardId,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Connections currently handed out.
    pub in_use: usize,
    /// Upper bound on open connections.
    pub max: usize,
}

/// Pool state for a single shard.
struct ShardSlot {
    endpoint: ShardEndpoint,
    /// One permit per connection the shard may have open.
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    in_use: AtomicUsize,
}

/// Owns and multiplexes storage connections for every shard.
///
/// Each shard gets at most `max_connections_per_shard` exclusive
/// connections. When all are busy, acquirers wait (up to
/// `acquire_timeout`) instead of opening more. Shards are independent:
/// a saturated shard never delays acquisition on another.
pub struct ShardConnectionPool {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    shards: RwLock<HashMap<ShardId, Arc<ShardSlot>>>,
    closed: Arc<AtomicBool>,
}

impl ShardConnectionPool {
    /// Create an empty pool that opens connections through `connector`.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            shards: RwLock::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a pool and register every endpoint.
    pub fn with_endpoints<I>(
        connector: Arc<dyn Connector>,
        config: PoolConfig,
        endpoints: I,
    ) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = ShardEndpoint>,
    {
        let pool = Self::new(connector, config);
        for endpoint in endpoints {
            pool.register(endpoint)?;
        }
        Ok(pool)
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register the endpoint for a shard. No connection is opened yet.
    pub fn register(&self, endpoint: ShardEndpoint) -> Result<(), PoolError> {
        let mut shards = self.shards.write();
        if shards.contains_key(&endpoint.id) {
            return Err(PoolError::DuplicateShard(endpoint.id));
        }

        debug!(shard_id = %endpoint.id, addr = %endpoint.addr(), "registered shard endpoint");
        let max = self.config.max_connections_per_shard.max(1);
        shards.insert(
            endpoint.id.clone(),
            Arc::new(ShardSlot {
                endpoint,
                permits: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(Vec::new()),
                in_use: AtomicUsize::new(0),
            }),
        );
        Ok(())
    }

    /// Forget a shard's endpoint and drop its idle connections.
    ///
    /// Connections currently handed out are closed when their guards drop.
    pub fn unregister(&self, shard_id: &ShardId) -> Result<(), PoolError> {
        let slot = self
            .shards
            .write()
            .remove(shard_id)
            .ok_or_else(|| PoolError::UnknownShard(shard_id.clone()))?;

        slot.permits.close();
        slot.idle.lock().clear();
        debug!(%shard_id, "unregistered shard endpoint");
        Ok(())
    }

    /// Open one connection to every registered shard, failing on the first
    /// unreachable one.
    pub async fn warm_up(&self) -> Result<(), PoolError> {
        for shard_id in self.shard_ids() {
            let _conn = self.acquire(&shard_id).await?;
        }
        Ok(())
    }

    /// Acquire a connection to `shard_id`, retrying transient failures
    /// against the same shard according to the retry policy.
    pub async fn acquire(&self, shard_id: &ShardId) -> Result<PooledConnection, PoolError> {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            match self.try_acquire(shard_id).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    attempt += 1;
                    let backoff = policy.backoff(attempt);
                    warn!(
                        %shard_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying connection acquisition"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single acquisition attempt: wait for a slot, then reuse an idle
    /// connection or open a new one.
    async fn try_acquire(&self, shard_id: &ShardId) -> Result<PooledConnection, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        let slot = self.slot(shard_id)?;

        let permit = match tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&slot.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // Permits close on pool shutdown or when the shard is unregistered.
            Ok(Err(_)) if self.closed.load(Ordering::Acquire) => return Err(PoolError::Closed),
            Ok(Err(_)) => return Err(PoolError::UnknownShard(shard_id.clone())),
            Err(_) => {
                return Err(PoolError::Timeout {
                    shard_id: shard_id.clone(),
                    stage: TimeoutStage::Acquire,
                    after: self.config.acquire_timeout,
                });
            }
        };

        let reused = slot.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.open(&slot).await?,
        };

        slot.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            slot,
            closed: Arc::clone(&self.closed),
            _permit: permit,
        })
    }

    /// Establish a new connection for `slot`.
    async fn open(&self, slot: &ShardSlot) -> Result<Box<dyn Connection>, PoolError> {
        let shard_id = &slot.endpoint.id;
        match tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&slot.endpoint),
        )
        .await
        {
            Ok(Ok(conn)) => {
                debug!(%shard_id, "opened shard connection");
                Ok(conn)
            }
            Ok(Err(source)) => {
                warn!(%shard_id, addr = %slot.endpoint.addr(), error = %source, "shard connection failed");
                Err(PoolError::ShardUnavailable {
                    shard_id: shard_id.clone(),
                    source,
                })
            }
            Err(_) => Err(PoolError::Timeout {
                shard_id: shard_id.clone(),
                stage: TimeoutStage::Connect,
                after: self.config.connect_timeout,
            }),
        }
    }

    /// Run `op` with a connection to `shard_id`.
    ///
    /// The connection is returned to the pool on every exit path: success,
    /// error from `op`, panic, or timeout. `op`'s own result or error is
    /// returned unchanged; pool failures are converted into `E`. If `op`
    /// exceeds `query_timeout` it is cancelled and a
    /// [`PoolError::Timeout`] is returned.
    pub async fn with_connection<T, E, F>(&self, shard_id: &ShardId, op: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> ConnFuture<'c, T, E>,
        E: From<PoolError>,
    {
        let mut conn = self.acquire(shard_id).await?;
        let deadline = self.config.query_timeout;

        let outcome = tokio::time::timeout(deadline, op(&mut *conn)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(%shard_id, timeout_ms = deadline.as_millis() as u64, "shard operation timed out");
                // Stream position is unknown after an interrupted call.
                conn.discard();
                Err(PoolError::Timeout {
                    shard_id: shard_id.clone(),
                    stage: TimeoutStage::Query,
                    after: deadline,
                }
                .into())
            }
        }
    }

    /// Shut the pool down: drop idle connections and refuse new
    /// acquisitions. Connections still in use are closed when released.
    pub fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let shards = self.shards.read();
        let mut dropped = 0;
        for slot in shards.values() {
            slot.permits.close();
            let mut idle = slot.idle.lock();
            dropped += idle.len();
            idle.clear();
        }
        info!(shards = shards.len(), dropped, "connection pool closed");
    }

    /// Whether [`close_all`](Self::close_all) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Registered shard IDs, sorted.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Per-shard usage, sorted by shard ID.
    pub fn stats(&self) -> Vec<ShardPoolStats> {
        let mut stats: Vec<ShardPoolStats> = self
            .shards
            .read()
            .iter()
            .map(|(shard_id, slot)| ShardPoolStats {
                shard_id: shard_id.clone(),
                idle: slot.idle.lock().len(),
                in_use: slot.in_use.load(Ordering::SeqCst),
                max: self.config.max_connections_per_shard.max(1),
            })
            .collect();
        stats.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        stats
    }

    fn slot(&self, shard_id: &ShardId) -> Result<Arc<ShardSlot>, PoolError> {
        self.shards
            .read()
            .get(shard_id)
            .cloned()
            .ok_or_else(|| PoolError::UnknownShard(shard_id.clone()))
    }
}

impl std::fmt::Debug for ShardConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardConnectionPool")
            .field("config", &self.config)
            .field("shards", &self.shard_ids())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// A connection checked out of the pool.
///
/// Dropping the guard puts the connection back into its shard's idle list,
/// unless it reports itself broken or the pool has been closed, in which
/// case it is discarded. The slot permit is released afterwards either way.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    slot: Arc<ShardSlot>,
    closed: Arc<AtomicBool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The shard this connection belongs to.
    pub fn shard_id(&self) -> &ShardId {
        &self.slot.endpoint.id
    }

    /// Close the connection instead of returning it to the pool, and
    /// release the slot.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            debug!(shard_id = %self.slot.endpoint.id, "discarding interrupted shard connection");
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.slot.in_use.fetch_sub(1, Ordering::SeqCst);
        let Some(conn) = self.conn.take() else {
            return;
        };

        let shard_id = &self.slot.endpoint.id;
        if conn.is_broken() {
            debug!(%shard_id, "discarding broken shard connection");
        } else if self.closed.load(Ordering::Acquire) || self.slot.permits.is_closed() {
            debug!(%shard_id, "discarding connection released after close");
        } else {
            self.slot.idle.lock().push(conn);
        }
    }
}
