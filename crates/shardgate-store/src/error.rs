//! Error types for storage operations.

use crate::message::Command;

/// Errors that can occur while talking to a shard's storage engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred on the connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A peer announced a frame larger than the protocol allows.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The engine refused the supplied credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The bound parameters do not fit the command.
    #[error("bad parameters for {command:?}: {reason}")]
    BadParams {
        /// The command being executed.
        command: Command,
        /// What was wrong.
        reason: String,
    },

    /// The engine executed the command and reported a failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// The peer answered with a response that does not fit the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// The shard's engine cannot be reached.
    #[error("shard unreachable: {0}")]
    Unreachable(String),
}
