//! Core traits for reaching a shard's storage engine.

use bytes::Bytes;
use shardgate_types::{Record, ShardEndpoint};

use crate::error::StoreError;
use crate::message::Command;

/// One open session with a storage engine.
///
/// A connection runs one command at a time, so callers need `&mut` access.
/// Implementations must be `Send` so pooled connections can move between
/// tasks.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Execute `command` with positional `params` and return the row set.
    async fn query(&mut self, command: Command, params: Vec<Bytes>)
    -> Result<Vec<Record>, StoreError>;

    /// Whether the connection is unusable and must not be reused.
    ///
    /// A query that was interrupted between sending the request and reading
    /// the reply leaves the stream position unknown, so such connections
    /// report broken until a full round trip completes.
    fn is_broken(&self) -> bool;
}

/// Opens connections to shard endpoints.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new session with the engine at `endpoint`.
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Connection>, StoreError>;
}
