//! HTTP peer pool: the [`PeerPicker`] used by a node in an HTTP cluster.
//!
//! The pool knows its own URL and the full peer list. It places every peer on
//! a [`HashRing`] and keeps one [`HttpGetter`] per peer. Keys owned by the
//! local node resolve to `None` so the group loads them itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::peers::http::HttpGetter;
use crate::peers::ring::{HashRing, DEFAULT_REPLICAS};
use crate::peers::{PeerGetter, PeerPicker};

/// Path prefix the peer server is mounted under.
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Tuning for an [`HttpPool`].
#[derive(Debug, Clone)]
pub struct HttpPoolOptions {
    /// Path prefix for peer requests; must start and end with `/`.
    pub base_path: String,
    /// Virtual nodes per peer.
    pub replicas: usize,
    /// Deadline for a single peer request.
    pub timeout: Duration,
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            timeout: Duration::from_secs(2),
        }
    }
}

struct PoolState {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

pub struct HttpPool {
    self_url: String,
    options: HttpPoolOptions,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

impl HttpPool {
    /// Create a pool for the node reachable at `self_url`. The peer list is
    /// empty until [`set`](Self::set) is called.
    pub fn new(self_url: impl Into<String>, options: HttpPoolOptions) -> Result<Self, CacheError> {
        let base_path = &options.base_path;
        if !base_path.starts_with('/') || !base_path.ends_with('/') {
            return Err(CacheError::Configuration(format!(
                "base path {base_path:?} must start and end with '/'"
            )));
        }
        if options.replicas == 0 {
            return Err(CacheError::Configuration("replicas must be at least 1".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| CacheError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            self_url: self_url.into(),
            state: RwLock::new(PoolState {
                ring: HashRing::new(options.replicas),
                getters: HashMap::new(),
            }),
            options,
            client,
        })
    }

    /// Replace the peer list. The list should include this node's own URL so
    /// that every node builds the same ring.
    pub fn set<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.options.replicas);
        ring.add(&peers);
        let getters = ring
            .peers()
            .iter()
            .map(|peer| {
                let getter = HttpGetter::new(peer.as_str(), &self.options.base_path, self.client.clone());
                (peer.clone(), Arc::new(getter))
            })
            .collect();

        *self.state.write() = PoolState { ring, getters };
        info!(self_url = %self.self_url, peers = ?peers, "Peer set updated");
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    pub fn base_path(&self) -> &str {
        &self.options.base_path
    }

    /// Peers currently on the ring, including this node.
    pub fn peers(&self) -> Vec<String> {
        self.state.read().ring.peers().to_vec()
    }

    /// The peer owning `key`, including this node.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.state.read().ring.get(key).map(str::to_string)
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read();
        let owner = state.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }
        debug!(key, peer = owner, "Picked peer");
        let getter: Arc<dyn PeerGetter> = state.getters.get(owner)?.clone();
        Some(getter)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("options", &self.options)
            .field("ring", &self.state.read().ring)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: [&str; 3] = [
        "http://localhost:8001",
        "http://localhost:8002",
        "http://localhost:8003",
    ];

    fn pool(self_url: &str) -> HttpPool {
        let pool = HttpPool::new(self_url, HttpPoolOptions::default()).unwrap();
        pool.set(NODES);
        pool
    }

    #[test]
    fn test_self_owned_keys_are_served_locally() {
        let pool = pool(NODES[0]);
        let mut local = 0;
        let mut remote = 0;
        for i in 0..300 {
            let key = format!("key-{i}");
            let owner = pool.owner(&key).unwrap();
            match pool.pick_peer(&key) {
                None => {
                    assert_eq!(owner, NODES[0]);
                    local += 1;
                }
                Some(peer) => {
                    assert_eq!(peer.peer_id(), owner);
                    assert_ne!(owner, NODES[0]);
                    remote += 1;
                }
            }
        }
        assert!(local > 0 && remote > 0);
    }

    #[test]
    fn test_nodes_agree_on_ownership() {
        let a = pool(NODES[0]);
        let b = pool(NODES[1]);
        for i in 0..100 {
            let key = format!("key-{i}");
            assert_eq!(a.owner(&key), b.owner(&key));
        }
    }

    #[test]
    fn test_empty_pool_picks_nothing() {
        let pool = HttpPool::new(NODES[0], HttpPoolOptions::default()).unwrap();
        assert!(pool.pick_peer("Tom").is_none());
        assert!(pool.peers().is_empty());
    }

    #[test]
    fn test_set_replaces_peers() {
        let pool = pool(NODES[0]);
        pool.set([NODES[0], NODES[1]]);
        assert_eq!(pool.peers(), vec![NODES[0].to_string(), NODES[1].to_string()]);
        for i in 0..100 {
            let owner = pool.owner(&format!("key-{i}")).unwrap();
            assert_ne!(owner, NODES[2]);
        }
    }

    #[test]
    fn test_rejects_bad_options() {
        let bad_path = HttpPoolOptions {
            base_path: "_peercache".into(),
            ..Default::default()
        };
        assert!(HttpPool::new(NODES[0], bad_path).unwrap_err().is_configuration());

        let no_replicas = HttpPoolOptions {
            replicas: 0,
            ..Default::default()
        };
        assert!(HttpPool::new(NODES[0], no_replicas).unwrap_err().is_configuration());
    }
}
