//! Prometheus metrics for cache groups.
//!
//! One [`CacheMetrics`] instance owns a private registry with counter and
//! gauge families labelled by group name. Each group resolves its own
//! [`GroupMetrics`] handles once at construction.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

const GROUP_LABEL: &str = "group";

/// Metric families shared by every group in a registry.
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    gets: IntCounterVec,
    hits: IntCounterVec,
    peer_loads: IntCounterVec,
    peer_errors: IntCounterVec,
    loads: IntCounterVec,
    loads_deduped: IntCounterVec,
    local_loads: IntCounterVec,
    local_load_errors: IntCounterVec,
    cache_bytes: IntGaugeVec,
    cache_items: IntGaugeVec,
}

impl CacheMetrics {
    /// Create the metric families and register them in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let vec = IntCounterVec::new(Opts::new(name, help).namespace("peercache"), &[GROUP_LABEL])?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };
        let gets = counter("gets_total", "Get requests, including hits")?;
        let hits = counter("hits_total", "Requests served from the local cache")?;
        let peer_loads = counter("peer_loads_total", "Values fetched from a remote peer")?;
        let peer_errors = counter("peer_errors_total", "Remote peer fetches that failed")?;
        let loads = counter("loads_total", "Requests that missed the local cache")?;
        let loads_deduped = counter(
            "loads_deduped_total",
            "Loads after call collapsing (one per in-flight key)",
        )?;
        let local_loads = counter("local_loads_total", "Successful source loads")?;
        let local_load_errors = counter("local_load_errors_total", "Failed source loads")?;

        let gauge = |name: &str, help: &str| -> Result<IntGaugeVec, prometheus::Error> {
            let vec = IntGaugeVec::new(Opts::new(name, help).namespace("peercache"), &[GROUP_LABEL])?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };
        let cache_bytes = gauge("cache_bytes", "Bytes held in the local cache")?;
        let cache_items = gauge("cache_items", "Entries held in the local cache")?;

        Ok(Self {
            registry,
            gets,
            hits,
            peer_loads,
            peer_errors,
            loads,
            loads_deduped,
            local_loads,
            local_load_errors,
            cache_bytes,
            cache_items,
        })
    }

    /// Resolve the per-group handles for `group`.
    pub fn for_group(&self, group: &str) -> GroupMetrics {
        let labels = [group];
        GroupMetrics {
            gets: self.gets.with_label_values(&labels),
            hits: self.hits.with_label_values(&labels),
            peer_loads: self.peer_loads.with_label_values(&labels),
            peer_errors: self.peer_errors.with_label_values(&labels),
            loads: self.loads.with_label_values(&labels),
            loads_deduped: self.loads_deduped.with_label_values(&labels),
            local_loads: self.local_loads.with_label_values(&labels),
            local_load_errors: self.local_load_errors.with_label_values(&labels),
            cache_bytes: self.cache_bytes.with_label_values(&labels),
            cache_items: self.cache_items.with_label_values(&labels),
        }
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// The underlying registry, for embedding into an application's exporter.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Metric handles for a single group.
#[derive(Clone)]
pub struct GroupMetrics {
    pub gets: IntCounter,
    pub hits: IntCounter,
    pub peer_loads: IntCounter,
    pub peer_errors: IntCounter,
    pub loads: IntCounter,
    pub loads_deduped: IntCounter,
    pub local_loads: IntCounter,
    pub local_load_errors: IntCounter,
    pub cache_bytes: IntGauge,
    pub cache_items: IntGauge,
}

impl GroupMetrics {
    pub fn snapshot(&self) -> GroupStats {
        GroupStats {
            gets: self.gets.get(),
            hits: self.hits.get(),
            peer_loads: self.peer_loads.get(),
            peer_errors: self.peer_errors.get(),
            loads: self.loads.get(),
            loads_deduped: self.loads_deduped.get(),
            local_loads: self.local_loads.get(),
            local_load_errors: self.local_load_errors.get(),
            cache_bytes: self.cache_bytes.get().max(0) as u64,
            cache_items: self.cache_items.get().max(0) as u64,
        }
    }
}

/// Point-in-time counters for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub gets: u64,
    pub hits: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub local_loads: u64,
    pub local_load_errors: u64,
    pub cache_bytes: u64,
    pub cache_items: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_handles_are_labelled() {
        let metrics = CacheMetrics::new().unwrap();
        let scores = metrics.for_group("scores");
        let other = metrics.for_group("other");

        scores.gets.inc();
        scores.gets.inc();
        other.hits.inc();

        assert_eq!(scores.snapshot().gets, 2);
        assert_eq!(scores.snapshot().hits, 0);
        assert_eq!(other.snapshot().hits, 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("peercache_gets_total{group=\"scores\"} 2"));
        assert!(text.contains("peercache_hits_total{group=\"other\"} 1"));
    }
}
