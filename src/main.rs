//! `leasepool` — the license lease server binary.
//!
//! Wires the Redis store, the lifecycle engine, and the HTTP surface
//! together. All knobs arrive as flags; `RUST_LOG` controls verbosity.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use leasepool::{http, LeaseManager, LeasepoolConfig, RedisStore};

/// License lease pool server.
#[derive(Parser, Debug)]
#[command(name = "leasepool", about = "Time-limited license lease server")]
struct Cli {
    /// Address to serve HTTP requests from.
    #[arg(long = "listen", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Redis connection URL.
    #[arg(long = "redis-url", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Namespace prefix for lease group keys.
    #[arg(long = "namespace", default_value = "reserved:")]
    namespace: String,

    /// Lease lifetime in seconds, granted on claim and again on each
    /// renewing access.
    #[arg(long = "lease-secs", default_value_t = 30)]
    lease_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = LeasepoolConfig {
        listen_addr: cli.listen,
        redis_url: cli.redis_url,
        namespace: cli.namespace,
        lease_duration: Duration::from_secs(cli.lease_secs),
    };
    config.validate()?;

    // Fail fast if the store is unreachable rather than on the first claim.
    info!("connecting to redis at {}", config.redis_url);
    let store = Arc::new(RedisStore::connect(&config.redis_url, &config.namespace).await?);

    let manager = LeaseManager::new(store, config.lease_duration)?;
    let app = http::router(Arc::new(manager));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("serving license leases on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
