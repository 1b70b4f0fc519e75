//! peer-cache: an embeddable distributed cache.
//!
//! Shards a key space across peer nodes with a consistent hash ring, serves
//! hot keys from a byte-bounded in-memory LRU, and falls through to an
//! authoritative [`Source`] on a miss while collapsing concurrent loads of the
//! same key into one.
//!
//! - [`cache`]: byte views, the LRU store and the per-group local cache
//! - [`flight`]: per-key call collapsing
//! - [`group`]: groups, sources and the group registry
//! - [`peers`]: peer traits, the hash ring and the HTTP/in-process transports
//! - [`server`]: axum routers for peer traffic and the front-end API
//! - [`metrics`]: per-group Prometheus counters
//! - [`config`]: CLI and JSON configuration for the node binary

pub mod cache;
pub mod config;
pub mod error;
pub mod flight;
pub mod group;
pub mod metrics;
pub mod peers;
pub mod server;

pub use cache::ByteView;
pub use error::{CacheError, PeerError};
pub use group::{Group, GroupBuilder, GroupRegistry, Source, SourceFn};
pub use peers::{PeerGetter, PeerPicker};
