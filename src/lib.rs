//! # a3s-ledger
//!
//! Partition lifecycle, fault isolation, and request admission for
//! append-only audit event stores.
//!
//! ## Overview
//!
//! `a3s-ledger` is the operational backbone behind an audit-event API:
//! it keeps a time-partitioned event table healthy under concurrent
//! maintenance from many worker processes, shields callers from flaky
//! downstream dependencies, and bounds the cost of read-heavy endpoints.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_ledger::{AdmissionConfig, MemoryKvStore, RequestAdmissionService};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_ledger::Result<()> {
//! let store = Arc::new(MemoryKvStore::new());
//! let admission = RequestAdmissionService::new(store, AdmissionConfig::default());
//!
//! // Cache hit → served without running the closure; miss → queued,
//! // executed, and cached.
//! let entries: Vec<String> = admission
//!     .execute_optimized("reports:recent", "/api/v1/reports", None, || async {
//!         Ok(vec!["audit entry".to_string()])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Services
//!
//! - **CircuitBreaker** / **BreakerRegistry** — wrap any fallible async
//!   call; open after repeated failures, fail fast, recover with
//!   exponential backoff and jitter
//! - **PartitionManager** / **MaintenanceScheduler** — create, optimize,
//!   and retire time-range shards of the audit table, serialized across
//!   processes by distributed locks
//! - **RequestAdmissionService** — response cache with per-endpoint
//!   policy plus a bounded-concurrency FIFO request queue
//!
//! ## Backends
//!
//! - **memory** — in-process `KvStore` and `Catalog` for tests and
//!   single-process use
//! - **redis** — locks, partition metadata, and cache entries
//! - **postgres** — DDL and catalog introspection for the partitioned
//!   table

pub mod admission;
pub mod breaker;
pub mod catalog;
pub mod config;
pub mod error;
pub mod kv;
pub mod lock;
pub mod partition;

mod glob;

// Re-export core types
pub use admission::{
    batches_from_channel, decode_cursor, encode_batches, encode_cursor, paginate,
    paginate_cursor, CacheConfigSummary, CacheStats, CursorPage, PaginatedResponse, QueueStatus,
    RequestAdmissionService, RequestQueue, ResponseCache, StreamFormat,
};
pub use breaker::{
    BreakerMetrics, BreakerRegistry, CircuitBreaker, CircuitBreakerStatus, CircuitState,
};
pub use catalog::{Catalog, CatalogPartition, IndexMethod, IndexSpec, TableStats};
pub use config::{
    AdmissionConfig, CacheConfig, CircuitBreakerConfig, MaintenanceConfig, PartitionConfig,
    PartitionStrategy, QueueConfig,
};
pub use error::{LedgerError, Result};
pub use kv::KvStore;
pub use lock::{LockLease, LockManager};
pub use partition::{
    MaintenanceEvent, MaintenanceScheduler, MemoryBackup, NoopBackup, PartitionBackup,
    PartitionInterval, PartitionManager, PartitionOpReport, PartitionOutcome,
    PartitionPerformanceReport, PartitionStatus, TickSummary,
};

// Re-export backends for convenience
pub use catalog::memory::MemoryCatalog;
pub use catalog::postgres::PostgresCatalog;
pub use kv::memory::MemoryKvStore;
pub use kv::redis::RedisKvStore;
