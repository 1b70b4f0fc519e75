//! peer-cache node.
//!
//! Runs one member of a cache cluster: a `scores` group backed by a slow
//! in-memory database, the peer server other nodes fetch from, and optionally
//! the front-end API server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use peer_cache::config::{Cli, Config};
use peer_cache::group::{GroupRegistry, Source};
use peer_cache::peers::pool::HttpPool;
use peer_cache::server::{build_api_router, build_router, AppState};

/// Stand-in for an expensive backing store.
struct SlowDb {
    rows: HashMap<String, String>,
    latency: Duration,
}

impl SlowDb {
    fn demo() -> Self {
        let rows = [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            rows,
            latency: Duration::from_millis(50),
        }
    }
}

#[async_trait::async_trait]
impl Source for SlowDb {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        info!(key, "SlowDb lookup");
        tokio::time::sleep(self.latency).await;
        self.rows
            .get(key)
            .map(|v| v.clone().into_bytes())
            .with_context(|| format!("{key} not exist"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "peer_cache=debug,tower_http=debug"
    } else {
        "peer_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("peer-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    config.validate()?;

    info!(
        self_url = %config.peers.self_url,
        peers = ?config.peers.peers,
        replicas = config.peers.replicas,
        group = %config.cache.group,
        max_bytes = config.cache.max_bytes,
        "Configuration loaded"
    );

    // Peer pool.
    let pool = Arc::new(HttpPool::new(
        config.peers.self_url.clone(),
        config.pool_options(),
    )?);
    pool.set(config.peers.peers.iter().cloned());

    // Cache group.
    let registry = Arc::new(GroupRegistry::new()?);
    let group = registry.new_group(&config.cache.group, config.cache.max_bytes, SlowDb::demo())?;
    group.register_peers(pool.clone())?;

    // Peer server.
    let state = Arc::new(AppState::new(registry.clone(), config.server.base_path.clone()));
    let peer_app = build_router(state);
    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding peer server to {}", config.server.listen))?;
    info!(addr = %config.server.listen, self_url = %pool.self_url(), "Peer server listening");
    let peer_server = async move { axum::serve(listener, peer_app).await };

    if !cli.api {
        peer_server.await?;
        return Ok(());
    }

    // Front-end API server.
    let api_app = build_api_router(group);
    let api_listener = TcpListener::bind(&config.server.api_listen)
        .await
        .with_context(|| format!("binding API server to {}", config.server.api_listen))?;
    info!(addr = %config.server.api_listen, "API server listening");
    let api_server = async move { axum::serve(api_listener, api_app).await };

    futures::future::try_join(peer_server, api_server).await?;
    Ok(())
}
