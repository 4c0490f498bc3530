//! Shared test harness for shardgate integration tests.
//!
//! Provides [`TcpCluster`]: N storage nodes, each a [`StoreServer`] on an
//! ephemeral localhost port, plus helpers for building a [`Router`] that
//! reaches them through the real TCP protocol.

use std::sync::Arc;
use std::time::Duration;

use shardgate_pool::{PoolConfig, RetryPolicy};
use shardgate_router::{Router, RouterConfig};
use shardgate_store::{MemoryEngine, StoreServer, TcpConnector};
use shardgate_types::{Credentials, ShardEndpoint, ShardId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One storage node and the handle to stop it.
struct Node {
    endpoint: ShardEndpoint,
    engine: Arc<MemoryEngine>,
    /// `None` while the node is down.
    running: Option<(oneshot::Sender<()>, JoinHandle<std::io::Result<()>>)>,
}

/// A set of storage nodes listening on localhost.
///
/// Shard IDs are the nodes' port numbers. Engines outlive their servers, so
/// a node that is killed and revived still holds its records.
pub struct TcpCluster {
    nodes: Vec<Node>,
    credentials: Option<Credentials>,
}

impl TcpCluster {
    /// Start `n` nodes that accept any credentials.
    pub async fn start(n: usize) -> Self {
        Self::start_with(n, None).await
    }

    /// Start `n` nodes, optionally requiring `credentials`.
    pub async fn start_with(n: usize, credentials: Option<Credentials>) -> Self {
        let mut cluster = Self {
            nodes: Vec::with_capacity(n),
            credentials,
        };
        for _ in 0..n {
            cluster.add_node().await;
        }
        cluster
    }

    /// Start one more node and return its endpoint.
    pub async fn add_node(&mut self) -> ShardEndpoint {
        let engine = Arc::new(MemoryEngine::new());
        let server = self.bind("127.0.0.1:0", Arc::clone(&engine)).await;
        let port = server.local_addr().unwrap().port();

        let mut endpoint = ShardEndpoint::new(port.to_string(), "127.0.0.1", port);
        if let Some(credentials) = &self.credentials {
            endpoint = endpoint.with_credentials(credentials.clone());
        }

        self.nodes.push(Node {
            endpoint: endpoint.clone(),
            engine,
            running: Some(spawn(server)),
        });
        endpoint
    }

    async fn bind(&self, addr: &str, engine: Arc<MemoryEngine>) -> StoreServer {
        let server = StoreServer::bind(addr, engine).await.unwrap();
        match &self.credentials {
            Some(c) => server.with_credentials(c.clone()),
            None => server,
        }
    }

    /// Endpoints of every node, in start order.
    pub fn endpoints(&self) -> Vec<ShardEndpoint> {
        self.nodes.iter().map(|n| n.endpoint.clone()).collect()
    }

    /// Shard ID of node `i`.
    pub fn shard_id(&self, i: usize) -> ShardId {
        self.nodes[i].endpoint.id.clone()
    }

    /// Index of the node serving `shard_id`.
    pub fn index_of(&self, shard_id: &ShardId) -> usize {
        self.nodes
            .iter()
            .position(|n| n.endpoint.id == *shard_id)
            .unwrap()
    }

    /// Records stored on node `i`.
    pub fn record_count(&self, i: usize) -> usize {
        self.nodes[i].engine.record_count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stop node `i`: close its listener and drop every open session.
    pub async fn kill_node(&mut self, i: usize) {
        if let Some((stop, handle)) = self.nodes[i].running.take() {
            let _ = stop.send(());
            handle.await.unwrap().unwrap();
        }
    }

    /// Restart node `i` on its original port with its original records.
    pub async fn revive_node(&mut self, i: usize) {
        if self.nodes[i].running.is_some() {
            return;
        }
        let addr = self.nodes[i].endpoint.addr();
        let server = self.bind(&addr, Arc::clone(&self.nodes[i].engine)).await;
        self.nodes[i].running = Some(spawn(server));
    }

    /// Router over every node, reached through TCP.
    pub fn router(&self, pool_config: PoolConfig) -> Router {
        self.router_with(RouterConfig::default(), pool_config)
    }

    pub fn router_with(&self, config: RouterConfig, pool_config: PoolConfig) -> Router {
        Router::build(
            config,
            self.endpoints(),
            Arc::new(TcpConnector::new()),
            pool_config,
        )
        .unwrap()
    }
}

impl Drop for TcpCluster {
    fn drop(&mut self) {
        for node in &mut self.nodes {
            if let Some((stop, _handle)) = node.running.take() {
                let _ = stop.send(());
            }
        }
    }
}

fn spawn(server: StoreServer) -> (oneshot::Sender<()>, JoinHandle<std::io::Result<()>>) {
    let (stop_tx, stop_rx) = oneshot::channel();
    let handle = tokio::spawn(server.serve_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    (stop_tx, handle)
}

/// Pool settings with short deadlines so failure tests finish quickly.
pub fn test_pool_config() -> PoolConfig {
    PoolConfig {
        max_connections_per_shard: 4,
        acquire_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        query_timeout: Duration::from_secs(2),
        retry: RetryPolicy::none(),
    }
}

/// Generate deterministic, non-repeating test data.
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}
