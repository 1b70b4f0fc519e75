//! Local cache storage.
//!
//! - [`byteview`]: ByteView, the immutable cached value
//! - [`lru`]: byte-bounded LRU store
//! - [`store`]: mutex-guarded, lazily constructed per-group cache

pub mod byteview;
pub mod lru;
pub mod store;

pub use byteview::{ByteLen, ByteView};
pub use lru::{EvictionCallback, LruStore};
pub use store::{CacheUsage, LocalCache};
