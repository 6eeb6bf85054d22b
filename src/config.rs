//! Configuration for the ledger services
//!
//! All structs deserialize with camelCase field names and fill missing
//! fields from their `Default` impls, so partial configuration files work.

use crate::partition::PartitionInterval;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Per-call timeout; an elapsed timer counts as a failure
    pub timeout_ms: u64,

    /// Base cooldown before an open circuit probes recovery
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_ms: 10_000,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Partitioning strategy for the audit event table
///
/// Only `Range` is implemented; the other variants exist so configuration
/// referencing them is rejected with a clear error instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    Range,
    Hash,
    List,
}

/// Partition lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartitionConfig {
    pub strategy: PartitionStrategy,

    /// Cadence of the time-range shards
    pub interval: PartitionInterval,

    /// Partitions whose range ended this many days ago are drop candidates
    pub retention_days: u32,

    /// Parent partitioned table
    pub table_name: String,

    /// How far ahead of `now` partitions are pre-created
    pub lookahead_months: u32,

    /// TTL on the distributed locks guarding partition mutations
    pub lock_ttl_seconds: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            strategy: PartitionStrategy::Range,
            interval: PartitionInterval::Monthly,
            retention_days: 365,
            table_name: "audit_events".to_string(),
            lookahead_months: 6,
            lock_ttl_seconds: 30,
        }
    }
}

/// Maintenance scheduler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaintenanceConfig {
    /// Seconds between maintenance ticks
    pub maintenance_interval_secs: u64,

    pub auto_create_partitions: bool,

    pub auto_drop_partitions: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: 21_600,
            auto_create_partitions: true,
            auto_drop_partitions: false,
        }
    }
}

/// Response cache policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,

    /// TTL applied when no override or caller value matches
    pub default_ttl_seconds: u64,

    /// Namespace prefix applied to every cache key
    pub key_prefix: String,

    /// Endpoints never cached (exact match)
    pub exclude_endpoints: Vec<String>,

    /// Endpoints never cached (`*` glob match)
    pub disable_cache_patterns: Vec<String>,

    /// Per-endpoint TTL overrides; keys may be exact endpoints or `*` globs.
    /// Exact matches win over globs.
    pub endpoint_ttl_overrides: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 300,
            key_prefix: "ledger:cache:".to_string(),
            exclude_endpoints: Vec::new(),
            disable_cache_patterns: Vec::new(),
            endpoint_ttl_overrides: HashMap::new(),
        }
    }
}

/// Request queue tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Execution slots; excess requests queue in FIFO order
    pub max_concurrent_requests: usize,

    /// A request still queued after this long fails without executing
    pub queue_timeout_ms: u64,

    /// When false, `execute_optimized` runs handlers directly
    pub enable_request_queue: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            queue_timeout_ms: 30_000,
            enable_request_queue: true,
        }
    }
}

/// Combined configuration for the request admission service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
}
