//! Peer selection and remote fetch.
//!
//! The cache core only sees the two capability traits defined here:
//! - [`PeerPicker`]: resolves the peer that owns a key
//! - [`PeerGetter`]: fetches a value for `(group, key)` from one peer
//!
//! Implementations:
//! - [`ring`]: consistent hash ring used by pickers
//! - [`pool`]: HTTP peer pool (ring + one getter per peer)
//! - [`http`]: HTTP getter speaking the `/<base>/<group>/<key>` protocol
//! - [`local`]: in-process getter backed by a group registry

pub mod http;
pub mod local;
pub mod pool;
pub mod ring;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PeerError;

/// Fetches values from one remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetch `key` from the peer's group named `group`.
    async fn get(&self, group: &str, key: &str) -> Result<Bytes, PeerError>;

    /// Identifier of the peer, for logging.
    fn peer_id(&self) -> &str;
}

/// Chooses the peer that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Return the owning peer's getter, or `None` when the key should be
    /// served locally. Implementations must never return the local node.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// A picker that never selects a peer. Every key is served locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
        None
    }
}
