//! Shared test utilities for shardgate-router tests.

use std::sync::Arc;
use std::time::Duration;

use shardgate_pool::{PoolConfig, RetryPolicy};
use shardgate_store::{Connector, MemoryConnector};
use shardgate_types::{ShardEndpoint, ShardId};

use crate::router::{Router, RouterConfig};

pub const EXAMPLE_URL: &str = "http://example.com";

/// The three shards of the reference deployment.
pub fn example_endpoints() -> Vec<ShardEndpoint> {
    [(5432, "172.17.0.2"), (5433, "172.17.0.3"), (5434, "172.17.0.4")]
        .into_iter()
        .map(|(port, host)| ShardEndpoint::new(port.to_string(), host, port))
        .collect()
}

pub fn shard(port: u16) -> ShardId {
    ShardId::new(port.to_string())
}

/// Pool settings with short deadlines so failure tests finish quickly.
pub fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        max_connections_per_shard: 4,
        acquire_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(200),
        query_timeout: Duration::from_millis(200),
        retry: RetryPolicy::none(),
    }
}

/// A router over the example shards backed by in-process engines.
pub fn memory_router() -> (Router, Arc<MemoryConnector>) {
    memory_router_with(RouterConfig::default(), fast_pool_config())
}

pub fn memory_router_with(
    config: RouterConfig,
    pool_config: PoolConfig,
) -> (Router, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    let router = Router::build(
        config,
        example_endpoints(),
        connector.clone(),
        pool_config,
    )
    .unwrap();
    (router, connector)
}

/// A router over the example shards using an arbitrary connector.
pub fn router_over(connector: Arc<dyn Connector>, pool_config: PoolConfig) -> Router {
    Router::build(
        RouterConfig::default(),
        example_endpoints(),
        connector,
        pool_config,
    )
    .unwrap()
}

/// First `key-{i}` whose partition key resolves to `target`.
pub fn key_owned_by(router: &Router, target: &ShardId) -> String {
    (0..10_000)
        .map(|i| format!("key-{i}"))
        .find(|k| router.resolve(&router.partition_key_for(k)).unwrap() == *target)
        .expect("some key maps to every shard")
}

/// First `key-{i}` whose partition key does not resolve to `avoid`.
pub fn key_not_owned_by(router: &Router, avoid: &ShardId) -> String {
    (0..10_000)
        .map(|i| format!("key-{i}"))
        .find(|k| router.resolve(&router.partition_key_for(k)).unwrap() != *avoid)
        .expect("some key maps elsewhere")
}
