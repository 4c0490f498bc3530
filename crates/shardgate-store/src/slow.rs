//! A [`Connector`] wrapper that adds configurable random latency.
//!
//! `SlowConnector` wraps any `Arc<dyn Connector>` and sleeps for a random
//! duration before each connect and each query. The RNG is seeded for
//! deterministic, reproducible behaviour across test runs.
//!
//! # Example
//!
//! ```ignore
//! let slow = SlowConnector::new(inner)
//!     .connect_latency(5, 20)  // 5–20 ms per connect
//!     .query_latency(10, 30)   // 10–30 ms per query
//!     .seed(42);
//! ```

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardgate_types::{Record, ShardEndpoint};

use crate::error::StoreError;
use crate::message::Command;
use crate::traits::{Connection, Connector};

/// A [`Connector`] wrapper that injects random latency.
///
/// Useful for exercising pool timeouts and contention without a real
/// network.
pub struct SlowConnector {
    inner: Arc<dyn Connector>,
    connect_latency_ms: (u64, u64),
    query_latency_ms: (u64, u64),
    rng: Arc<Mutex<StdRng>>,
}

impl SlowConnector {
    /// Wrap an existing connector with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn Connector>) -> Self {
        Self {
            inner,
            connect_latency_ms: (0, 0),
            query_latency_ms: (0, 0),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(0))),
        }
    }

    /// Set the connect latency range in milliseconds (uniform random).
    pub fn connect_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.connect_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the per-query latency range in milliseconds (uniform random).
    pub fn query_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.query_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed for deterministic behaviour.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            ..self
        }
    }
}

/// Sleep for a random duration in `[min, max]` milliseconds.
async fn delay(rng: &Mutex<StdRng>, range: (u64, u64)) {
    let (min, max) = range;
    if max == 0 {
        return;
    }

    let ms = if min >= max {
        max
    } else {
        rng.lock().random_range(min..=max)
    };

    if ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait::async_trait]
impl Connector for SlowConnector {
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Connection>, StoreError> {
        delay(&self.rng, self.connect_latency_ms).await;
        let inner = self.inner.connect(endpoint).await?;
        Ok(Box::new(SlowConnection {
            inner,
            query_latency_ms: self.query_latency_ms,
            rng: Arc::clone(&self.rng),
        }))
    }
}

struct SlowConnection {
    inner: Box<dyn Connection>,
    query_latency_ms: (u64, u64),
    rng: Arc<Mutex<StdRng>>,
}

#[async_trait::async_trait]
impl Connection for SlowConnection {
    async fn query(
        &mut self,
        command: Command,
        params: Vec<Bytes>,
    ) -> Result<Vec<Record>, StoreError> {
        delay(&self.rng, self.query_latency_ms).await;
        self.inner.query(command, params).await
    }

    fn is_broken(&self) -> bool {
        self.inner.is_broken()
    }
}
