//! TCP client for the storage protocol.

use bytes::Bytes;
use shardgate_types::{Record, ShardEndpoint};
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::{read_frame, write_frame};
use crate::error::StoreError;
use crate::message::{Command, Request, Response};
use crate::traits::{Connection, Connector};

/// Opens TCP sessions to storage engines served by [`StoreServer`].
///
/// [`StoreServer`]: crate::StoreServer
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &ShardEndpoint) -> Result<Box<dyn Connection>, StoreError> {
        let addr = endpoint.addr();
        debug!(shard_id = %endpoint.id, %addr, "connecting to storage engine");

        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let mut stream = BufStream::new(stream);

        write_frame(&mut stream, &Request::Hello(endpoint.credentials.clone())).await?;
        match read_frame::<_, Response>(&mut stream).await? {
            Some(Response::Ready) => {}
            Some(Response::Error(reason)) => return Err(StoreError::AuthRejected(reason)),
            Some(other) => {
                return Err(StoreError::UnexpectedResponse(format!(
                    "expected Ready, got {other:?}"
                )));
            }
            None => return Err(StoreError::ConnectionClosed),
        }

        Ok(Box::new(TcpConnection {
            stream,
            addr,
            broken: false,
        }))
    }
}

/// An authenticated TCP session with one storage engine.
struct TcpConnection {
    stream: BufStream<TcpStream>,
    addr: String,
    broken: bool,
}

#[async_trait::async_trait]
impl Connection for TcpConnection {
    async fn query(
        &mut self,
        command: Command,
        params: Vec<Bytes>,
    ) -> Result<Vec<Record>, StoreError> {
        // Cleared only once a full reply has been read.
        self.broken = true;

        write_frame(&mut self.stream, &Request::Query { command, params }).await?;
        match read_frame::<_, Response>(&mut self.stream).await? {
            Some(Response::Rows(rows)) => {
                self.broken = false;
                Ok(rows)
            }
            Some(Response::Error(reason)) => {
                self.broken = false;
                Err(StoreError::Engine(reason))
            }
            Some(Response::Ready) => Err(StoreError::UnexpectedResponse(format!(
                "unsolicited Ready from {}",
                self.addr
            ))),
            None => Err(StoreError::ConnectionClosed),
        }
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}
