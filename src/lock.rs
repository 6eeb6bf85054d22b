//! Distributed locks over the key-value store
//!
//! Mutual exclusion across processes via atomic set-if-absent with a TTL,
//! so a crashed holder can never block a key forever. Contention is a
//! normal control-flow outcome (`Ok(None)`), never an error.

use crate::error::Result;
use crate::kv::KvStore;
use std::future::Future;
use std::sync::Arc;

const LOCK_PREFIX: &str = "ledger:lock:";

/// A held lock; pass back to [`LockManager::release`] when done
#[derive(Debug)]
pub struct LockLease {
    key: String,
    token: String,
}

impl LockLease {
    /// Full store key this lease holds
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Acquire/release pair over any `KvStore`
pub struct LockManager {
    store: Arc<dyn KvStore>,
    ttl_seconds: u64,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Try to acquire the lock named `name`
    ///
    /// `Ok(None)` means another holder owns it — skip the work, someone
    /// else is handling it. Store failures propagate.
    pub async fn acquire(&self, name: &str) -> Result<Option<LockLease>> {
        let key = format!("{}{}", LOCK_PREFIX, name);
        let token = format!("lck-{}", uuid::Uuid::new_v4());

        if self.store.set_nx_ex(&key, &token, self.ttl_seconds).await? {
            tracing::debug!(key = %key, token = %token, "Lock acquired");
            Ok(Some(LockLease { key, token }))
        } else {
            tracing::debug!(key = %key, "Lock contended");
            Ok(None)
        }
    }

    /// Release a held lock
    ///
    /// Release failures are logged, not propagated — the TTL expires the
    /// lock on its own.
    pub async fn release(&self, lease: LockLease) {
        match self.store.del(&lease.key).await {
            Ok(_) => {
                tracing::debug!(key = %lease.key, token = %lease.token, "Lock released");
            }
            Err(e) => {
                tracing::warn!(
                    key = %lease.key,
                    error = %e,
                    "Failed to release lock; TTL will expire it"
                );
            }
        }
    }

    /// Run `op` while holding the lock named `name`, releasing on every
    /// exit path
    ///
    /// Returns `Ok(None)` when the lock was contended and `op` never ran.
    pub async fn with_lock<T, F, Fut>(&self, name: &str, op: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(lease) = self.acquire(name).await? else {
            return Ok(None);
        };

        let result = op().await;
        self.release(lease).await;
        result.map(Some)
    }
}
