//! Storage collaborator for shardgate.
//!
//! The router never talks to storage directly; it goes through the
//! [`Connector`] / [`Connection`] traits defined here. A connection executes
//! one parameterized [`Command`] at a time and returns a row set of
//! [`Record`](shardgate_types::Record)s.
//!
//! Provided pieces:
//!
//! - [`MemoryEngine`]: an in-memory table that executes commands.
//! - [`StoreServer`]: exposes a `MemoryEngine` over TCP using the
//!   length-prefixed postcard protocol in [`message`].
//! - [`TcpConnector`]: client side of that protocol.
//! - [`MemoryConnector`]: in-process engines with failure injection.
//! - [`SlowConnector`]: wraps another connector and injects latency.

mod codec;
mod engine;
mod error;
mod memory;
pub mod message;
mod server;
mod slow;
mod tcp;
mod traits;

pub use engine::MemoryEngine;
pub use error::StoreError;
pub use memory::MemoryConnector;
pub use message::{Command, Request, Response};
pub use server::StoreServer;
pub use slow::SlowConnector;
pub use tcp::TcpConnector;
pub use traits::{Connection, Connector};
