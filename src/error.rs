//! Error types shared by the cache core and the peer transports.

use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by [`Group`](crate::group::Group) and its collaborators.
///
/// The type is `Clone` so that a single load result can be handed to every
/// caller that was waiting on the same in-flight key.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("invalid key: key must not be empty")]
    InvalidKey,

    #[error("source failed to load key {key:?}: {cause:#}")]
    Source {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    #[error("peer fetch failed: {0}")]
    Peer(#[from] PeerError),

    #[error("no such group: {0}")]
    GroupNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Wrap a loader failure for `key`.
    pub fn load_failed(key: &str, cause: anyhow::Error) -> Self {
        CacheError::Source {
            key: key.to_string(),
            cause: Arc::new(cause),
        }
    }

    /// Whether this error indicates a setup mistake rather than a request failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CacheError::Configuration(_))
    }
}

/// Errors returned by a [`PeerGetter`](crate::peers::PeerGetter).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("peer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot build peer URL from base {0:?}")]
    InvalidUrl(String),

    #[error("peer has no group named {0:?}")]
    GroupNotFound(String),

    #[error("peer failed to serve key: {0}")]
    Remote(String),
}
