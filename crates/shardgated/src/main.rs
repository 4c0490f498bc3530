//! `shardgated`: the shardgate daemon.
//!
//! Runs the HTTP gateway that routes each key to its shard, or a storage
//! node for development.
//!
//! # Usage
//!
//! ```text
//! shardgated serve                           # gateway with default shards
//! shardgated serve -c shardgate.toml         # gateway from a config file
//! shardgated serve --memory                  # in-process storage, no network
//! shardgated store -l 127.0.0.1:5432         # run one storage node
//! shardgated resolve http://example.com      # show partition key and shard
//! shardgated benchmark -n 1000               # in-memory write/read benchmark
//! ```

mod config;
mod error;
mod handler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardgate_router::{ReadOutcome, Router};
use shardgate_store::{Connector, MemoryConnector, MemoryEngine, StoreServer, TcpConnector};
use shardgate_types::Credentials;
use tokio::net::TcpListener;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "shardgated",
    version,
    about = "Consistent-hashing gateway for sharded key-value storage"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Serve {
        /// Override the gateway listen address (e.g. "127.0.0.1:3000").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Back every shard with an in-process engine instead of TCP.
        #[arg(short, long)]
        memory: bool,

        /// Open one connection per shard before accepting requests.
        #[arg(long)]
        warm_up: bool,
    },

    /// Run a storage engine node.
    Store {
        /// Address to listen on.
        #[arg(short = 'l', long, default_value = "127.0.0.1:5432")]
        listen_addr: String,

        /// Require this user name from clients.
        #[arg(long, env = "SHARDGATE_STORE_USER")]
        user: Option<String>,

        /// Required password (with --user).
        #[arg(long, env = "SHARDGATE_STORE_PASSWORD", default_value = "")]
        password: String,

        /// Required database name (with --user).
        #[arg(long, default_value = "")]
        database: String,
    },

    /// Print the partition key and owning shard for a key.
    Resolve {
        /// The entity key (e.g. a URL).
        key: String,
    },

    /// Run a quick write/read benchmark against in-process storage.
    Benchmark {
        /// Number of records to write and read.
        #[arg(short = 'n', long, default_value = "1000")]
        count: usize,

        /// Size of each value in bytes.
        #[arg(short, long, default_value = "256")]
        size: usize,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Serve {
            listen_addr,
            memory,
            warm_up,
        } => {
            // CLI args override config file values.
            if let Some(addr) = listen_addr {
                config.http.listen_addr = addr;
            }
            cmd_serve(config, memory, warm_up).await
        }
        Commands::Store {
            listen_addr,
            user,
            password,
            database,
        } => {
            let credentials = user.map(|user| Credentials {
                user,
                password,
                database,
            });
            cmd_store(&listen_addr, credentials).await
        }
        Commands::Resolve { key } => cmd_resolve(&config, &key),
        Commands::Benchmark { count, size } => cmd_benchmark(&config, count, size).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Build a router from the config.
fn build_router(config: &CliConfig, connector: Arc<dyn Connector>) -> Result<Router> {
    config.validate().context("invalid config")?;
    Router::build(
        config.router_config(),
        config.shards.clone(),
        connector,
        config.pool_config(),
    )
    .context("failed to build router")
}

// -----------------------------------------------------------------------
// shardgated serve
// -----------------------------------------------------------------------

async fn cmd_serve(config: CliConfig, memory: bool, warm_up: bool) -> Result<()> {
    info!("starting shardgated");
    let router_config = config.router_config();
    let pool_config = config.pool_config();
    info!(
        listen_addr = %config.http.listen_addr,
        shards = config.shards.len(),
        partition_key_len = router_config.partition_key_len,
        vnodes_per_shard = router_config.vnodes_per_shard,
        max_connections_per_shard = pool_config.max_connections_per_shard,
        storage = if memory { "memory" } else { "tcp" },
        "gateway configuration"
    );
    for shard in &config.shards {
        info!(shard_id = %shard.id, addr = %shard.addr(), "shard endpoint");
    }

    let connector: Arc<dyn Connector> = if memory {
        Arc::new(MemoryConnector::new())
    } else {
        Arc::new(TcpConnector::new())
    };
    let router = Arc::new(build_router(&config, connector)?);

    if warm_up {
        router
            .pool()
            .warm_up()
            .await
            .context("failed to connect to every shard")?;
        info!("all shards reachable");
    }

    let listener = TcpListener::bind(&config.http.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http.listen_addr))?;
    let result = handler::serve(listener, handler::app(Arc::clone(&router)), shutdown_signal()).await;

    router.close();
    info!("shardgated stopped");
    result.context("gateway failed")
}

// -----------------------------------------------------------------------
// shardgated store
// -----------------------------------------------------------------------

async fn cmd_store(listen_addr: &str, credentials: Option<Credentials>) -> Result<()> {
    let mut server = StoreServer::bind(listen_addr, Arc::new(MemoryEngine::new()))
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    if let Some(credentials) = credentials {
        info!(user = %credentials.user, "store requires authentication");
        server = server.with_credentials(credentials);
    }

    server
        .serve_with_shutdown(shutdown_signal())
        .await
        .context("store server failed")
}

// -----------------------------------------------------------------------
// shardgated resolve
// -----------------------------------------------------------------------

fn cmd_resolve(config: &CliConfig, key: &str) -> Result<()> {
    // Resolution never touches storage, so any connector will do.
    let router = build_router(config, Arc::new(MemoryConnector::new()))?;
    let partition_key = router.partition_key_for(key);
    let shard_id = router.resolve(&partition_key)?;

    let endpoint = config.shards.iter().find(|s| s.id == shard_id);
    println!("key:           {key}");
    println!("partition_key: {partition_key}");
    match endpoint {
        Some(e) => println!("shard:         {shard_id} ({})", e.addr()),
        None => println!("shard:         {shard_id}"),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// shardgated benchmark
// -----------------------------------------------------------------------

async fn cmd_benchmark(config: &CliConfig, count: usize, size: usize) -> Result<()> {
    let router = build_router(config, Arc::new(MemoryConnector::new()))?;

    println!("shardgate benchmark");
    println!("  records: {count}");
    println!("  size:    {size} bytes each");
    println!("  shards:  {}", config.shards.len());
    println!();

    let value = vec![0xA5u8; size];

    // --- Write ---
    print!("Writing {count} records... ");
    let start = Instant::now();
    let mut keys = Vec::with_capacity(count);
    for i in 0..count {
        let receipt = router.write(&format!("bench-{i}"), value.clone()).await?;
        keys.push(receipt.partition_key);
    }
    let write_dur = start.elapsed();
    println!(
        "{:.2}s ({:.0} ops/s)",
        write_dur.as_secs_f64(),
        count as f64 / write_dur.as_secs_f64()
    );

    // --- Read ---
    print!("Reading {count} records... ");
    let start = Instant::now();
    let mut missing = 0usize;
    for pk in &keys {
        if router.read(pk).await? == ReadOutcome::NotFound {
            missing += 1;
        }
    }
    let read_dur = start.elapsed();
    println!(
        "{:.2}s ({:.0} ops/s)",
        read_dur.as_secs_f64(),
        count as f64 / read_dur.as_secs_f64()
    );

    if missing > 0 {
        anyhow::bail!("{missing} records could not be read back");
    }

    println!();
    println!("Per-shard connections:");
    for stats in router.pool().stats() {
        println!("  {}: idle={} max={}", stats.shard_id, stats.idle, stats.max);
    }

    router.close();
    Ok(())
}
