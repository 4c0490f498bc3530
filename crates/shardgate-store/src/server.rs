//! TCP server exposing a [`MemoryEngine`] over the storage protocol.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use shardgate_types::Credentials;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec::{read_frame, write_frame};
use crate::engine::MemoryEngine;
use crate::error::StoreError;
use crate::message::{Request, Response};

/// A storage engine node reachable over TCP.
///
/// Used as the development collaborator behind each shard and by the
/// integration tests.
pub struct StoreServer {
    listener: TcpListener,
    engine: Arc<MemoryEngine>,
    /// If set, sessions must present exactly these credentials.
    credentials: Option<Credentials>,
}

impl StoreServer {
    /// Bind a listener on `addr` (use port 0 for an ephemeral port).
    pub async fn bind(addr: &str, engine: Arc<MemoryEngine>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            engine,
            credentials: None,
        })
    }

    /// Require sessions to authenticate with `credentials`.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the process exits.
    pub async fn serve(self) -> std::io::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then close the listener and abort all
    /// open sessions.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.local_addr()?;
        info!(%addr, "store server listening");

        let mut sessions = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = self.listener.accept() => {
                    // Reap sessions that already finished.
                    while sessions.try_join_next().is_some() {}

                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "failed to accept store connection");
                            continue;
                        }
                    };

                    let engine = Arc::clone(&self.engine);
                    let credentials = self.credentials.clone();
                    sessions.spawn(async move {
                        if let Err(e) = handle_session(stream, engine, credentials).await {
                            debug!(%peer, error = %e, "store session ended with error");
                        }
                    });
                }
            }
        }

        info!(%addr, open_sessions = sessions.len(), "store server shutting down");
        sessions.shutdown().await;
        Ok(())
    }
}

/// Run one client session: handshake, then answer queries until EOF.
async fn handle_session(
    stream: TcpStream,
    engine: Arc<MemoryEngine>,
    credentials: Option<Credentials>,
) -> Result<(), StoreError> {
    stream.set_nodelay(true)?;
    let mut stream = BufStream::new(stream);

    match read_frame::<_, Request>(&mut stream).await? {
        Some(Request::Hello(offered)) => {
            if credentials.as_ref().is_some_and(|expected| *expected != offered) {
                write_frame(&mut stream, &Response::Error("invalid credentials".into())).await?;
                return Err(StoreError::AuthRejected(offered.user));
            }
            write_frame(&mut stream, &Response::Ready).await?;
        }
        Some(Request::Query { .. }) => {
            write_frame(&mut stream, &Response::Error("handshake required".into())).await?;
            return Err(StoreError::UnexpectedResponse("query before hello".into()));
        }
        None => return Ok(()),
    }

    while let Some(request) = read_frame::<_, Request>(&mut stream).await? {
        let response = match request {
            Request::Query { command, params } => match engine.execute(command, &params) {
                Ok(rows) => Response::Rows(rows),
                Err(e) => Response::Error(e.to_string()),
            },
            Request::Hello(_) => Response::Error("session already established".into()),
        };
        write_frame(&mut stream, &response).await?;
    }

    Ok(())
}
