/// Time-bounded dispatch deduplication.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Suppression window: the same identity is dispatched at most once
    /// within this many milliseconds.
    pub ttl_ms: u64,
    /// Entries older than this are evicted to bound memory.
    pub stale_ms: u64,
    /// Centroid quantization cell, in pixels. Absorbs the small centroid
    /// jitter a stationary control shows between captures.
    pub cell_px: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 500,
            stale_ms: 5000,
            cell_px: 16,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms == 0 || self.cell_px == 0 {
            return Err(ConfigError::Invalid(
                "dedup ttl and cell size must be positive".to_string(),
            ));
        }
        if self.stale_ms < self.ttl_ms {
            return Err(ConfigError::Invalid(format!(
                "dedup stale bound {}ms is shorter than ttl {}ms",
                self.stale_ms, self.ttl_ms
            )));
        }
        Ok(())
    }
}

/// TTL-keyed cache suppressing repeated dispatch on the same target.
///
/// Keys are quantized centroids, so two detections of the same control a
/// few pixels apart share an identity. The cache is engine-instance state:
/// created on start, dropped on stop, never shared across tasks.
pub struct DedupCache {
    entries: HashMap<(u32, u32), Instant>,
    ttl: Duration,
    stale_after: Duration,
    cell: u32,
}

impl DedupCache {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_millis(config.ttl_ms),
            stale_after: Duration::from_millis(config.stale_ms),
            cell: config.cell_px.max(1),
        }
    }

    fn key(&self, centroid: (u32, u32)) -> (u32, u32) {
        (centroid.0 / self.cell, centroid.1 / self.cell)
    }

    /// True when this identity was dispatched within the TTL window.
    pub fn is_suppressed(&self, centroid: (u32, u32), now: Instant) -> bool {
        self.entries
            .get(&self.key(centroid))
            .map(|&at| now.duration_since(at) < self.ttl)
            .unwrap_or(false)
    }

    /// Record a dispatch attempt (successful or not) for this identity.
    pub fn record(&mut self, centroid: (u32, u32), now: Instant) {
        let key = self.key(centroid);
        self.entries.insert(key, now);
    }

    /// Evict entries older than the staleness bound.
    pub fn sweep(&mut self, now: Instant) {
        let stale_after = self.stale_after;
        self.entries
            .retain(|_, &mut at| now.duration_since(at) <= stale_after);
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> DedupCache {
        DedupCache::new(DedupConfig::default())
    }

    #[test]
    fn test_fresh_identity_is_not_suppressed() {
        let cache = cache();
        assert!(!cache.is_suppressed((200, 120), Instant::now()));
    }

    #[test]
    fn test_repeat_within_ttl_is_suppressed() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.record((200, 120), t0);

        assert!(cache.is_suppressed((200, 120), t0 + Duration::from_millis(1)));
        assert!(cache.is_suppressed((200, 120), t0 + Duration::from_millis(499)));
    }

    #[test]
    fn test_repeat_after_ttl_is_permitted() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.record((200, 120), t0);

        assert!(!cache.is_suppressed((200, 120), t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_nearby_centroids_share_identity() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.record((200, 120), t0);

        // Same 16px cell.
        assert!(cache.is_suppressed((207, 124), t0 + Duration::from_millis(1)));
        // Different cell.
        assert!(!cache.is_suppressed((260, 120), t0 + Duration::from_millis(1)));
    }

    #[test]
    fn test_sweep_evicts_stale_entries() {
        let mut cache = cache();
        let t0 = Instant::now();
        cache.record((100, 100), t0);
        cache.record((400, 300), t0 + Duration::from_millis(4_900));
        assert_eq!(cache.len(), 2);

        cache.sweep(t0 + Duration::from_millis(5_500));
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(DedupConfig::default().validate().is_ok());

        let bad = DedupConfig {
            ttl_ms: 1000,
            stale_ms: 500,
            cell_px: 16,
        };
        assert!(bad.validate().is_err());
    }
}
