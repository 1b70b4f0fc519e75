//! Consistent hash ring with virtual nodes.
//!
//! Each peer contributes `replicas` positions on a `u32` ring. Virtual node
//! `i` of peer `p` sits at `hash(format!("{i}{p}"))`. A key is owned by the
//! first virtual node at or after `hash(key)`, wrapping around to the start
//! of the ring.
//!
//! The ring does no locking of its own. Whoever owns it (the peer pool)
//! decides how to guard mutation against lookups.

use std::fmt;
use std::sync::Arc;

/// Hash function used to place virtual nodes and keys on the ring.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Default number of virtual nodes per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// One position on the ring.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct VirtualNode {
    hash: u32,
    peer: String,
}

/// A consistent hash ring mapping keys to peer identifiers.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted by `(hash, peer)` so colliding positions resolve deterministically.
    nodes: Vec<VirtualNode>,
    /// Real peers, in insertion order.
    peers: Vec<String>,
}

impl HashRing {
    /// Create an empty ring hashing with CRC-32 (IEEE).
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Arc::new(crc32fast::hash))
    }

    /// Create an empty ring with a caller-supplied hash function.
    ///
    /// `replicas` is raised to at least 1 so that every member owns part of
    /// the ring.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas: replicas.max(1),
            nodes: Vec::new(),
            peers: Vec::new(),
        }
    }

    /// Add peers to the ring. Peers that are already members are skipped.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            if self.peers.iter().any(|p| p == peer) {
                continue;
            }
            for i in 0..self.replicas {
                let hash = (self.hash)(format!("{i}{peer}").as_bytes());
                self.nodes.push(VirtualNode {
                    hash,
                    peer: peer.to_string(),
                });
            }
            self.peers.push(peer.to_string());
        }
        self.nodes.sort_unstable();
    }

    /// Remove every virtual node belonging to `peer`.
    ///
    /// Returns whether the peer was a member. Other peers' virtual nodes are
    /// left untouched, including ones that share a hash with the removed peer.
    pub fn remove(&mut self, peer: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != peer);
        if self.peers.len() == before {
            return false;
        }
        self.nodes.retain(|node| node.peer != peer);
        true
    }

    /// The peer owning `key`, or `None` if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.nodes.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.nodes.partition_point(|node| node.hash < hash);
        let node = &self.nodes[idx % self.nodes.len()];
        Some(node.peer.as_str())
    }

    /// Real peers currently on the ring.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Virtual nodes per peer.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.nodes.len())
            .field("peers", &self.peers)
            .finish()
    }
}
