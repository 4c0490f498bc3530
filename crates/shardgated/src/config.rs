//! TOML configuration for the shardgate daemon.
//!
//! When no config file is provided, the defaults describe the reference
//! three-shard deployment (ports 5432-5434).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use shardgate_pool::{PoolConfig, RetryPolicy};
use shardgate_router::RouterConfig;
use shardgate_types::{
    Credentials, DEFAULT_PARTITION_KEY_LEN, DEFAULT_VNODES_PER_SHARD, ShardEndpoint,
};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Partitioning settings.
    pub router: RouterSection,
    /// Connection pool tuning.
    pub pool: PoolSection,
    /// Static shard endpoint list.
    pub shards: Vec<ShardEndpoint>,
    /// HTTP gateway settings.
    pub http: HttpSection,
    /// Logging configuration.
    pub log: LogSection,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            router: RouterSection::default(),
            pool: PoolSection::default(),
            shards: default_shards(),
            http: HttpSection::default(),
            log: LogSection::default(),
        }
    }
}

/// The reference deployment: three storage nodes with default logins.
fn default_shards() -> Vec<ShardEndpoint> {
    (0..3u16)
        .map(|i| {
            let port = 5432 + i;
            ShardEndpoint::new(port.to_string(), format!("172.17.0.{}", i + 2), port)
                .with_credentials(Credentials {
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    database: "postgres".to_string(),
                })
        })
        .collect()
}

/// `[router]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Base64 characters kept from the entity key digest.
    ///
    /// Changing this after data has been written makes old records
    /// unreachable.
    pub partition_key_len: Option<usize>,
    /// Virtual nodes per shard on the hash ring.
    pub vnodes_per_shard: Option<u16>,
}

/// `[pool]` section. Durations are in milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub max_connections_per_shard: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
    /// Same-shard retries for unavailable shards and timeouts.
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

/// `[http]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Address for the HTTP gateway.
    pub listen_addr: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use the defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("failed to parse {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Check the settings before anything is started.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shards.is_empty() {
            bail!("at least one [[shards]] entry is required");
        }

        let mut seen = HashSet::new();
        for shard in &self.shards {
            if !seen.insert(&shard.id) {
                bail!("duplicate shard id {}", shard.id);
            }
        }

        if self.pool_config().max_connections_per_shard == 0 {
            bail!("pool.max_connections_per_shard must be non-zero");
        }

        self.router_config().validate()?;
        Ok(())
    }

    /// Effective partitioning settings.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            partition_key_len: self
                .router
                .partition_key_len
                .unwrap_or(DEFAULT_PARTITION_KEY_LEN),
            vnodes_per_shard: self
                .router
                .vnodes_per_shard
                .unwrap_or(DEFAULT_VNODES_PER_SHARD),
        }
    }

    /// Effective pool settings.
    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        let retry = RetryPolicy::none();
        let ms = Duration::from_millis;

        PoolConfig {
            max_connections_per_shard: self
                .pool
                .max_connections_per_shard
                .unwrap_or(defaults.max_connections_per_shard),
            acquire_timeout: self
                .pool
                .acquire_timeout_ms
                .map_or(defaults.acquire_timeout, ms),
            connect_timeout: self
                .pool
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, ms),
            query_timeout: self
                .pool
                .query_timeout_ms
                .map_or(defaults.query_timeout, ms),
            retry: RetryPolicy {
                max_retries: self.pool.max_retries.unwrap_or(retry.max_retries),
                initial_backoff: self
                    .pool
                    .initial_backoff_ms
                    .map_or(retry.initial_backoff, ms),
                max_backoff: self.pool.max_backoff_ms.map_or(retry.max_backoff, ms),
            },
        }
    }
}
