//! Request admission — bounded concurrency and response caching for
//! read-mostly endpoints
//!
//! Inbound calls flow cache check → queued execution → cache write. The
//! cache can only ever improve a request: when the store misbehaves the
//! request falls through to the live handler and the failure is logged,
//! never surfaced.

use crate::config::AdmissionConfig;
use crate::error::Result;
use crate::kv::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

pub mod cache;
pub mod pagination;
pub mod queue;
pub mod streaming;

pub use cache::{CacheConfigSummary, CacheStats, ResponseCache};
pub use pagination::{
    decode_cursor, encode_cursor, paginate, paginate_cursor, CursorPage, PaginatedResponse,
};
pub use queue::{QueueStatus, RequestQueue};
pub use streaming::{batches_from_channel, encode_batches, StreamFormat};

/// Cache + queue composed behind one entry point
///
/// One instance per process, owning its cache and queue state; created at
/// service start and torn down at shutdown.
pub struct RequestAdmissionService {
    cache: ResponseCache,
    queue: RequestQueue,
    enable_queue: bool,
}

impl RequestAdmissionService {
    pub fn new(store: Arc<dyn KvStore>, config: AdmissionConfig) -> Self {
        let enable_queue = config.queue.enable_request_queue;
        Self {
            cache: ResponseCache::new(store, config.cache),
            queue: RequestQueue::new(config.queue),
            enable_queue,
        }
    }

    /// Serve from cache when possible, otherwise run `op` under the
    /// concurrency budget and cache the result
    ///
    /// Cache failures degrade to "no cache": the handler still runs and
    /// its result is returned uncached.
    pub async fn execute_optimized<T, F, Fut>(
        &self,
        cache_key: &str,
        endpoint: &str,
        caller_ttl: Option<u64>,
        op: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        match self.cache.get::<T>(cache_key, endpoint).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    key = %cache_key,
                    endpoint = %endpoint,
                    error = %e,
                    "Cache read failed; falling through to handler"
                );
            }
        }

        let value = if self.enable_queue {
            self.queue.execute(op).await?
        } else {
            op().await?
        };

        if let Err(e) = self.cache.set(cache_key, &value, caller_ttl, endpoint).await {
            tracing::warn!(
                key = %cache_key,
                endpoint = %endpoint,
                error = %e,
                "Cache write failed; response served uncached"
            );
        }

        Ok(value)
    }

    /// True when responses for this endpoint may be cached
    pub fn is_caching_enabled_for_endpoint(&self, endpoint: &str) -> bool {
        self.cache.is_enabled_for_endpoint(endpoint)
    }

    /// Effective cache TTL for an endpoint
    pub fn get_cache_ttl_for_endpoint(&self, endpoint: &str) -> u64 {
        self.cache.ttl_for_endpoint(endpoint)
    }

    /// Delete cached responses matching a `*` glob, returning the count
    pub async fn invalidate_cache(&self, pattern: &str) -> Result<u64> {
        self.cache.invalidate(pattern).await
    }

    /// Active cache policy and running statistics
    pub fn get_cache_config_summary(&self) -> CacheConfigSummary {
        self.cache.summary()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }
}
