//! Key-value store trait — the shared backbone for locks, partition
//! metadata, and the response cache
//!
//! Backends implement `KvStore` to provide a uniform API over the small
//! command set the ledger needs: atomic set-if-absent-with-expiry for
//! distributed locks, plain expiring sets for cache entries, hashes for
//! partition metadata, and glob `KEYS` for invalidation sweeps.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub mod memory;
pub mod redis;

/// Core trait for key-value backends
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomic set-if-absent with expiry (`SET key value NX EX ttl`)
    ///
    /// Returns true when the key was set, false when it already existed.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool>;

    /// Set a key with expiry, overwriting any existing value
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Get a key's value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key, returning true when it existed
    async fn del(&self, key: &str) -> Result<bool>;

    /// Set fields on a hash (created on first write, no expiry)
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<()>;

    /// Get a single hash field
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Get all fields of a hash (empty map when the key is absent)
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Keys matching a `*` glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Backend name (e.g., "redis", "memory")
    fn name(&self) -> &str;
}
