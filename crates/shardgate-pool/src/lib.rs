//! Per-shard connection pooling.
//!
//! [`ShardConnectionPool`] owns the storage connections for every shard so
//! that routing code never opens ad-hoc connections. Each shard has its own
//! bounded set of exclusive connections, created lazily on first use and
//! reused afterwards. Acquisition hands out a [`PooledConnection`] guard that
//! returns the connection on drop, whatever the exit path.

mod config;
mod error;
mod pool;

pub use config::{PoolConfig, RetryPolicy};
pub use error::{PoolError, TimeoutStage};
pub use pool::{ConnFuture, PooledConnection, ShardConnectionPool, ShardPoolStats};
