//! Runtime configuration for the peer-cache node.
//!
//! Configuration is loaded from a JSON file and then overridden by any
//! command-line flags that were given. Every section has defaults matching a
//! three-node cluster on localhost.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::peers::pool::{HttpPoolOptions, DEFAULT_BASE_PATH};
use crate::peers::ring::DEFAULT_REPLICAS;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "peer-cache", about = "Distributed cache node with consistent-hash peer routing")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Peer server listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// This node's URL as seen by other peers (overrides `peers.self_url`).
    #[arg(long)]
    pub self_url: Option<String>,

    /// Comma-separated peer URLs, including this node (overrides `peers.peers`).
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Also start the front-end API server.
    #[arg(long)]
    pub api: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen addresses and routing.
    pub server: ServerConfig,

    /// Cluster membership.
    pub peers: PeersConfig,

    /// The cache group served by this node.
    pub cache: CacheConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Peer server listen address.
    pub listen: String,

    /// Front-end API listen address, used when the API server is enabled.
    pub api_listen: String,

    /// Path prefix for peer requests.
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8001".to_string(),
            api_listen: "127.0.0.1:9999".to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

/// Peer membership settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// URL other nodes use to reach this one. Must appear in `peers`.
    pub self_url: String,

    /// Every node in the cluster.
    pub peers: Vec<String>,

    /// Virtual nodes per peer on the hash ring.
    pub replicas: usize,

    /// Timeout for a single peer request, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            self_url: "http://localhost:8001".to_string(),
            peers: vec![
                "http://localhost:8001".to_string(),
                "http://localhost:8002".to_string(),
                "http://localhost:8003".to_string(),
            ],
            replicas: DEFAULT_REPLICAS,
            timeout_ms: 2_000,
        }
    }
}

/// Cache group settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Group name.
    pub group: String,

    /// Byte capacity of the local cache (0 = unbounded).
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            group: "scores".to_string(),
            max_bytes: 2 << 10,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(self_url) = &cli.self_url {
            self.peers.self_url = self_url.clone();
        }
        if !cli.peers.is_empty() {
            self.peers.peers = cli.peers.clone();
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.cache.group.is_empty(), "cache.group must not be empty");
        anyhow::ensure!(self.peers.replicas > 0, "peers.replicas must be at least 1");
        anyhow::ensure!(
            self.peers.peers.is_empty() || self.peers.peers.contains(&self.peers.self_url),
            "peers.self_url {:?} is not in peers.peers",
            self.peers.self_url
        );
        Ok(())
    }

    pub fn pool_options(&self) -> HttpPoolOptions {
        HttpPoolOptions {
            base_path: self.server.base_path.clone(),
            replicas: self.peers.replicas,
            timeout: Duration::from_millis(self.peers.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.max_bytes, 2048);
        assert_eq!(cfg.cache.group, "scores");
        assert_eq!(cfg.peers.peers.len(), 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.server.listen, ServerConfig::default().listen);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache": {{"max_bytes": 64}}, "peers": {{"replicas": 7}}}}"#).unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.cache.max_bytes, 64);
        assert_eq!(cfg.cache.group, "scores");
        assert_eq!(cfg.peers.replicas, 7);
        assert_eq!(cfg.peers.timeout_ms, 2_000);
        assert_eq!(cfg.pool_options().replicas, 7);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "peer-cache",
            "--listen",
            "0.0.0.0:8002",
            "--self-url",
            "http://localhost:8002",
            "--peers",
            "http://localhost:8001,http://localhost:8002",
        ]);
        let mut cfg = Config::default();
        cfg.apply_cli(&cli);

        assert_eq!(cfg.server.listen, "0.0.0.0:8002");
        assert_eq!(cfg.peers.self_url, "http://localhost:8002");
        assert_eq!(cfg.peers.peers.len(), 2);
        assert!(!cli.api);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_self_url_must_be_a_peer() {
        let mut cfg = Config::default();
        cfg.peers.self_url = "http://localhost:9000".into();
        assert!(cfg.validate().is_err());
    }
}
