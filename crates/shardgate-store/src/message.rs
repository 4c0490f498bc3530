//! Wire protocol between the router and a storage engine.
//!
//! Each message travels as a 4-byte big-endian length prefix followed by a
//! postcard-encoded payload. A session opens with [`Request::Hello`]; every
//! later request is a [`Request::Query`] answered by exactly one
//! [`Response`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardgate_types::{Credentials, Record};

/// Commands understood by the storage engine.
///
/// Parameters are bound positionally:
///
/// | command                  | params                                  |
/// |--------------------------|-----------------------------------------|
/// | `Insert`                 | partition key, entity key, value        |
/// | `SelectByPartitionKey`   | partition key                           |
/// | `Ping`                   | none                                    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Store a record, replacing any row with the same partition and entity key.
    Insert,
    /// Return every row stored under a partition key.
    SelectByPartitionKey,
    /// Liveness check; returns no rows.
    Ping,
}

impl Command {
    /// Number of positional parameters the command expects.
    pub fn arity(self) -> usize {
        match self {
            Self::Insert => 3,
            Self::SelectByPartitionKey => 1,
            Self::Ping => 0,
        }
    }
}

/// Messages sent from the router to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Session handshake, must be the first message on a connection.
    Hello(Credentials),
    /// Execute a command with bound parameters.
    Query {
        /// What to execute.
        command: Command,
        /// Positional parameters.
        params: Vec<Bytes>,
    },
}

/// Messages sent from the engine back to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Handshake accepted.
    Ready,
    /// Query succeeded with this row set (possibly empty).
    Rows(Vec<Record>),
    /// Handshake or query failed.
    Error(String),
}
