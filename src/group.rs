//! Cache groups: named namespaces implementing the cache-aside protocol.
//!
//! A [`Group`] answers `get(key)` by trying, in order:
//! 1. its local LRU cache
//! 2. the peer that owns the key, if a [`PeerPicker`] is registered and the
//!    owner is a remote node (the value is returned but not cached locally)
//! 3. its [`Source`], through a [`CallGroup`] so that concurrent misses for
//!    the same key trigger a single load (the value is cached locally)
//!
//! Groups are created and looked up through a [`GroupRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{ByteView, CacheUsage, LocalCache};
use crate::error::CacheError;
use crate::flight::CallGroup;
use crate::metrics::{CacheMetrics, GroupMetrics, GroupStats};
use crate::peers::{PeerGetter, PeerPicker};

/// The authoritative data source behind a group.
#[async_trait]
pub trait Source: Send + Sync {
    /// Load the value for `key`.
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts an async closure into a [`Source`].
///
/// ```ignore
/// let source = SourceFn(|key: String| async move {
///     db.lookup(&key).await
/// });
/// ```
pub struct SourceFn<F>(pub F);

#[async_trait]
impl<F, Fut> Source for SourceFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key.to_string()).await
    }
}

/// A named cache namespace.
pub struct Group {
    name: String,
    source: Arc<dyn Source>,
    cache: LocalCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    loader: CallGroup<ByteView>,
    metrics: GroupMetrics,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the peer picker used to route misses to owning peers.
    ///
    /// May be called at most once per group.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<(), CacheError> {
        self.peers.set(peers).map_err(|_| {
            CacheError::Configuration(format!(
                "peer picker registered more than once for group {:?}",
                self.name
            ))
        })
    }

    /// Whether a peer picker has been registered.
    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    /// Fetch the value for `key`.
    pub async fn get(&self, key: &str) -> Result<ByteView, CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        self.metrics.gets.inc();

        if let Some(value) = self.cache.get(key) {
            self.metrics.hits.inc();
            debug!(group = %self.name, key, "Cache hit");
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView, CacheError> {
        self.metrics.loads.inc();

        if let Some(picker) = self.peers.get() {
            if let Some(peer) = picker.pick_peer(key) {
                match self.get_from_peer(peer.as_ref(), key).await {
                    Ok(value) => {
                        self.metrics.peer_loads.inc();
                        return Ok(value);
                    }
                    Err(e) => {
                        self.metrics.peer_errors.inc();
                        warn!(
                            group = %self.name,
                            key,
                            peer = peer.peer_id(),
                            error = %e,
                            "Peer fetch failed, loading locally"
                        );
                    }
                }
            }
        }

        self.loader
            .run(key, move || async move {
                // A flight that finished between our miss and this call may
                // already have filled the cache.
                if let Some(value) = self.cache.get(key) {
                    return Ok(value);
                }
                self.metrics.loads_deduped.inc();
                self.load_locally(key).await
            })
            .await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView, CacheError> {
        debug!(group = %self.name, key, peer = peer.peer_id(), "Fetching from peer");
        let bytes = peer.get(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    async fn load_locally(&self, key: &str) -> Result<ByteView, CacheError> {
        let bytes = match self.source.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.local_load_errors.inc();
                warn!(group = %self.name, key, error = %e, "Source load failed");
                return Err(CacheError::load_failed(key, e));
            }
        };
        self.metrics.local_loads.inc();

        let value = ByteView::from(bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        let usage = self.cache.add(key, value);
        self.metrics.cache_bytes.set(usage.bytes as i64);
        self.metrics.cache_items.set(usage.items as i64);
    }

    /// Whether `key` is currently held in the local cache. Does not affect recency.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains(key)
    }

    /// Current size of the local cache.
    pub fn cache_usage(&self) -> CacheUsage {
        self.cache.usage()
    }

    /// Byte capacity of the local cache (0 = unbounded).
    pub fn max_bytes(&self) -> usize {
        self.cache.max_bytes()
    }

    /// Snapshot of this group's counters.
    pub fn stats(&self) -> GroupStats {
        self.metrics.snapshot()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("has_peers", &self.has_peers())
            .field("loader", &self.loader)
            .finish()
    }
}

/// Collects the settings for a new group.
pub struct GroupBuilder {
    name: String,
    max_bytes: usize,
    source: Option<Arc<dyn Source>>,
    peers: Option<Arc<dyn PeerPicker>>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_bytes: 0,
            source: None,
            peers: None,
        }
    }

    /// Byte capacity of the local cache (0 = unbounded).
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn source(self, source: impl Source + 'static) -> Self {
        self.shared_source(Arc::new(source))
    }

    pub fn shared_source(mut self, source: Arc<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn peers(mut self, peers: Arc<dyn PeerPicker>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Validate the settings and register the group in `registry`.
    pub fn build(self, registry: &GroupRegistry) -> Result<Arc<Group>, CacheError> {
        registry.register(self)
    }

    fn into_group(self, metrics: &CacheMetrics) -> Result<Group, CacheError> {
        if self.name.is_empty() {
            return Err(CacheError::Configuration("group name must not be empty".into()));
        }
        let source = self.source.ok_or_else(|| {
            CacheError::Configuration(format!("group {:?} has no source", self.name))
        })?;

        let group = Group {
            metrics: metrics.for_group(&self.name),
            name: self.name,
            source,
            cache: LocalCache::new(self.max_bytes),
            peers: OnceLock::new(),
            loader: CallGroup::new(),
        };
        if let Some(peers) = self.peers {
            group.register_peers(peers)?;
        }
        Ok(group)
    }
}

/// Registry of groups by name.
///
/// Registration takes the write lock; lookups share the read lock. Groups are
/// never removed.
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
    metrics: CacheMetrics,
}

impl GroupRegistry {
    pub fn new() -> Result<Self, CacheError> {
        let metrics = CacheMetrics::new()
            .map_err(|e| CacheError::Configuration(format!("metrics registry: {e}")))?;
        Ok(Self::with_metrics(metrics))
    }

    pub fn with_metrics(metrics: CacheMetrics) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Build and register a group. Fails if the settings are incomplete or
    /// the name is already taken.
    pub fn register(&self, builder: GroupBuilder) -> Result<Arc<Group>, CacheError> {
        let mut groups = self.groups.write();
        if groups.contains_key(&builder.name) {
            return Err(CacheError::Configuration(format!(
                "group {:?} is already registered",
                builder.name
            )));
        }
        let group = Arc::new(builder.into_group(&self.metrics)?);
        groups.insert(group.name.clone(), group.clone());

        info!(
            group = %group.name,
            max_bytes = group.max_bytes(),
            peers = group.has_peers(),
            "Registered group"
        );
        Ok(group)
    }

    /// Shorthand for registering a group with a source and byte capacity.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        max_bytes: usize,
        source: impl Source + 'static,
    ) -> Result<Arc<Group>, CacheError> {
        self.register(GroupBuilder::new(name).max_bytes(max_bytes).source(source))
    }

    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Like [`get_group`](Self::get_group), but reports a missing group as an error.
    pub fn require_group(&self, name: &str) -> Result<Arc<Group>, CacheError> {
        self.get_group(name)
            .ok_or_else(|| CacheError::GroupNotFound(name.to_string()))
    }

    /// Registered group names, sorted.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.group_names())
            .finish()
    }
}
