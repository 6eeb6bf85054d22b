//! Response cache with per-endpoint exclusion and TTL override policy
//!
//! Entries are serialized JSON in the shared key-value store under a
//! namespace prefix. The exclusion policy is consulted before any store
//! access, so excluded endpoints never generate a read or a write.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::glob;
use crate::kv::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running cache statistics
///
/// The hit ratio is computed only over requests that reached the store —
/// exclusions do not dilute it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub exclusions: u64,
    pub hit_ratio: f64,
}

/// Serializable view of the active cache policy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfigSummary {
    pub enabled: bool,
    pub default_ttl_seconds: u64,
    pub key_prefix: String,
    pub exclude_endpoints: Vec<String>,
    pub disable_cache_patterns: Vec<String>,
    pub ttl_override_count: usize,
    pub stats: CacheStats,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    exclusions: AtomicU64,
}

/// Keyed, TTL-bound response cache over a [`KvStore`]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    config: CacheConfig,
    counters: Counters,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            counters: Counters::default(),
        }
    }

    /// True when responses for this endpoint may be cached
    pub fn is_enabled_for_endpoint(&self, endpoint: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        if self.config.exclude_endpoints.iter().any(|e| e == endpoint) {
            return false;
        }
        !self
            .config
            .disable_cache_patterns
            .iter()
            .any(|pattern| glob::matches(pattern, endpoint))
    }

    /// Effective TTL for an endpoint: exact override → glob override →
    /// configured default
    pub fn ttl_for_endpoint(&self, endpoint: &str) -> u64 {
        self.resolve_ttl(endpoint, None)
    }

    fn resolve_ttl(&self, endpoint: &str, caller_ttl: Option<u64>) -> u64 {
        if let Some(ttl) = self.config.endpoint_ttl_overrides.get(endpoint) {
            return *ttl;
        }

        // Among matching glob overrides, the longest pattern is the most
        // specific one.
        let glob_match = self
            .config
            .endpoint_ttl_overrides
            .iter()
            .filter(|(pattern, _)| pattern.contains('*') && glob::matches(pattern, endpoint))
            .max_by_key(|(pattern, _)| pattern.len());
        if let Some((_, ttl)) = glob_match {
            return *ttl;
        }

        caller_ttl.unwrap_or(self.config.default_ttl_seconds)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Look up a cached response
    ///
    /// Excluded endpoints return `None` without touching the store. A
    /// corrupt entry is logged and treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, endpoint: &str) -> Result<Option<T>> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled_for_endpoint(endpoint) {
            self.counters.exclusions.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        match self.store.get(&self.full_key(key)).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(value))
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to decode cache entry");
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
            },
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store a response unless the endpoint is excluded
    ///
    /// TTL resolution order: exact endpoint override → glob override →
    /// `caller_ttl` → configured default.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        caller_ttl: Option<u64>,
        endpoint: &str,
    ) -> Result<()> {
        if !self.is_enabled_for_endpoint(endpoint) {
            return Ok(());
        }

        let ttl = self.resolve_ttl(endpoint, caller_ttl);
        let raw = serde_json::to_string(value)?;
        self.store.set_ex(&self.full_key(key), &raw, ttl).await?;

        tracing::debug!(key = %key, endpoint = %endpoint, ttl_seconds = ttl, "Response cached");
        Ok(())
    }

    /// Delete every cache entry whose key matches the `*` glob
    pub async fn invalidate(&self, pattern: &str) -> Result<u64> {
        let keys = self.store.keys(&self.full_key(pattern)).await?;

        let mut removed = 0u64;
        for key in keys {
            if self.store.del(&key).await? {
                removed += 1;
            }
        }

        tracing::info!(pattern = %pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let counted = hits + misses;
        CacheStats {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            hits,
            misses,
            exclusions: self.counters.exclusions.load(Ordering::Relaxed),
            hit_ratio: if counted == 0 {
                0.0
            } else {
                hits as f64 / counted as f64
            },
        }
    }

    pub fn summary(&self) -> CacheConfigSummary {
        CacheConfigSummary {
            enabled: self.config.enabled,
            default_ttl_seconds: self.config.default_ttl_seconds,
            key_prefix: self.config.key_prefix.clone(),
            exclude_endpoints: self.config.exclude_endpoints.clone(),
            disable_cache_patterns: self.config.disable_cache_patterns.clone(),
            ttl_override_count: self.config.endpoint_ttl_overrides.len(),
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKvStore;
    use std::collections::HashMap;

    fn spec_config() -> CacheConfig {
        CacheConfig {
            exclude_endpoints: vec!["/api/v1/auth/session".to_string()],
            disable_cache_patterns: vec!["/api/v1/realtime/*".to_string()],
            endpoint_ttl_overrides: HashMap::from([("/api/v1/health".to_string(), 30)]),
            default_ttl_seconds: 300,
            ..CacheConfig::default()
        }
    }

    fn cache_with(config: CacheConfig) -> (Arc<MemoryKvStore>, ResponseCache) {
        let store = Arc::new(MemoryKvStore::new());
        let cache = ResponseCache::new(Arc::clone(&store) as Arc<dyn KvStore>, config);
        (store, cache)
    }

    #[tokio::test]
    async fn test_exclusion_policy() {
        let (_, cache) = cache_with(spec_config());

        assert!(!cache.is_enabled_for_endpoint("/api/v1/auth/session"));
        assert!(!cache.is_enabled_for_endpoint("/api/v1/realtime/x"));
        assert!(cache.is_enabled_for_endpoint("/api/v1/other"));
    }

    #[tokio::test]
    async fn test_ttl_resolution() {
        let (_, cache) = cache_with(spec_config());

        assert_eq!(cache.ttl_for_endpoint("/api/v1/health"), 30);
        assert_eq!(cache.ttl_for_endpoint("/api/v1/other"), 300);
        // Caller-supplied TTL beats the default but not overrides
        assert_eq!(cache.resolve_ttl("/api/v1/other", Some(60)), 60);
        assert_eq!(cache.resolve_ttl("/api/v1/health", Some(60)), 30);
    }

    #[tokio::test]
    async fn test_exact_override_beats_glob_override() {
        let config = CacheConfig {
            endpoint_ttl_overrides: HashMap::from([
                ("/api/v1/reports/*".to_string(), 120),
                ("/api/v1/reports/summary".to_string(), 15),
            ]),
            ..CacheConfig::default()
        };
        let (_, cache) = cache_with(config);

        assert_eq!(cache.ttl_for_endpoint("/api/v1/reports/summary"), 15);
        assert_eq!(cache.ttl_for_endpoint("/api/v1/reports/daily"), 120);
    }

    #[tokio::test]
    async fn test_excluded_endpoint_never_touches_store() {
        let (store, cache) = cache_with(spec_config());

        cache
            .set("k1", &"value", None, "/api/v1/realtime/x")
            .await
            .unwrap();
        let got: Option<String> = cache.get("k1", "/api/v1/realtime/x").await.unwrap();
        assert_eq!(got, None);

        assert!(store.keys("*").await.unwrap().is_empty());
        assert_eq!(cache.stats().exclusions, 1);
    }

    #[tokio::test]
    async fn test_roundtrip_and_stats() {
        let (_, cache) = cache_with(spec_config());

        let miss: Option<String> = cache.get("k1", "/api/v1/other").await.unwrap();
        assert_eq!(miss, None);

        cache
            .set("k1", &"cached-value", None, "/api/v1/other")
            .await
            .unwrap();
        let hit: Option<String> = cache.get("k1", "/api/v1/other").await.unwrap();
        assert_eq!(hit.as_deref(), Some("cached-value"));

        let stats = cache.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_hit_ratio_ignores_exclusions() {
        let (_, cache) = cache_with(spec_config());

        cache.set("k", &1u32, None, "/api/v1/other").await.unwrap();
        let _: Option<u32> = cache.get("k", "/api/v1/other").await.unwrap();
        // Excluded requests do not count toward the ratio
        for _ in 0..10 {
            let _: Option<u32> = cache.get("x", "/api/v1/auth/session").await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.exclusions, 10);
        assert!((stats.hit_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_disabled_cache_bypasses_everything() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let (store, cache) = cache_with(config);

        cache.set("k", &"v", None, "/anything").await.unwrap();
        assert!(store.keys("*").await.unwrap().is_empty());
        assert!(!cache.is_enabled_for_endpoint("/anything"));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (store, cache) = cache_with(CacheConfig::default());

        store
            .set_ex("ledger:cache:bad", "not json{", 60)
            .await
            .unwrap();
        let got: Option<HashMap<String, u32>> = cache.get("bad", "/api/v1/other").await.unwrap();
        assert_eq!(got, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let (store, cache) = cache_with(CacheConfig::default());

        cache.set("reports:1", &1u32, None, "/r").await.unwrap();
        cache.set("reports:2", &2u32, None, "/r").await.unwrap();
        cache.set("users:1", &3u32, None, "/u").await.unwrap();

        let removed = cache.invalidate("reports:*").await.unwrap();
        assert_eq!(removed, 2);

        let kept: Option<u32> = cache.get("users:1", "/u").await.unwrap();
        assert_eq!(kept, Some(3));
        let gone: Option<u32> = cache.get("reports:1", "/r").await.unwrap();
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn test_summary_reflects_policy() {
        let (_, cache) = cache_with(spec_config());
        let summary = cache.summary();

        assert!(summary.enabled);
        assert_eq!(summary.default_ttl_seconds, 300);
        assert_eq!(summary.exclude_endpoints.len(), 1);
        assert_eq!(summary.ttl_override_count, 1);
    }
}
