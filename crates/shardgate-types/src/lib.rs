//! Shared types and identifiers for shardgate.
//!
//! This crate defines the vocabulary used across the workspace:
//! identifiers ([`ShardId`], [`PartitionKey`]), the persisted [`Record`],
//! and shard connection details ([`ShardEndpoint`], [`Credentials`]).

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of base64 characters kept from the entity-key digest.
pub const DEFAULT_PARTITION_KEY_LEN: usize = 5;

/// Longest partition key: a SHA-256 digest is 43 unpadded base64 characters.
pub const MAX_PARTITION_KEY_LEN: usize = 43;

/// Default number of virtual nodes placed on the ring per shard.
pub const DEFAULT_VNODES_PER_SHARD: u16 = 128;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_name!(
    /// Opaque name of one backing store instance (e.g. `"5432"`).
    ShardId
);

define_name!(
    /// Short identifier derived from an entity key, used to pick a shard.
    PartitionKey
);

impl PartitionKey {
    /// Derive the partition key for an entity key.
    ///
    /// The key is the first `len` characters of the standard base64 encoding
    /// of `sha256(entity_key)`. `len` is clamped to `1..=MAX_PARTITION_KEY_LEN`.
    pub fn derive(entity_key: &str, len: usize) -> Self {
        let digest = Sha256::digest(entity_key.as_bytes());
        let encoded = STANDARD.encode(digest);
        let len = len.clamp(1, MAX_PARTITION_KEY_LEN);
        // base64 output is ASCII, so byte slicing is char slicing.
        Self(encoded[..len].to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A logical row persisted by the shard that owns its partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Partition key the record was routed by.
    pub partition_key: PartitionKey,
    /// The caller-supplied entity key.
    pub entity_key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Shard endpoints
// ---------------------------------------------------------------------------

/// Login details presented when opening a shard connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Where a shard's storage engine lives and how to log into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEndpoint {
    /// Ring identity of the shard.
    pub id: ShardId,
    /// Storage engine host.
    pub host: String,
    /// Storage engine port.
    pub port: u16,
    /// Login details.
    #[serde(default)]
    pub credentials: Credentials,
}

impl ShardEndpoint {
    /// Create an endpoint with empty credentials.
    pub fn new(id: impl Into<ShardId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            credentials: Credentials::default(),
        }
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// `host:port` string suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
