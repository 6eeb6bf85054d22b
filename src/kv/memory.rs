//! In-memory key-value store for testing and single-process use
//!
//! Entries carry an optional deadline; expiry is enforced lazily on
//! access, matching Redis TTL semantics closely enough for tests.

use super::KvStore;
use crate::error::Result;
use crate::glob;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

enum Value {
    Plain(String),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory `KvStore` backend
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn deadline(ttl_seconds: u64) -> Option<Instant> {
    (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds))
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key) {
            if !existing.expired() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Plain(value.to_string()),
                expires_at: deadline(ttl_seconds),
            },
        );
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Plain(value.to_string()),
                expires_at: deadline(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.value {
                Value::Plain(s) => Ok(Some(s.clone())),
                Value::Hash(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => Ok(!entry.expired()),
            None => Ok(false),
        }
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        if entry.expired() || !matches!(entry.value, Value::Hash(_)) {
            entry.value = Value::Hash(HashMap::new());
            entry.expires_at = None;
        }
        if let Value::Hash(hash) = &mut entry.value {
            for (field, value) in fields {
                hash.insert((*field).to_string(), (*value).to_string());
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired() => match &entry.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                Value::Plain(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired() => match &entry.value {
                Value::Hash(hash) => Ok(hash.clone()),
                Value::Plain(_) => Ok(HashMap::new()),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.expired() && glob::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_nx_is_atomic_per_key() {
        let store = MemoryKvStore::new();

        assert!(store.set_nx_ex("lock:a", "tok-1", 30).await.unwrap());
        assert!(!store.set_nx_ex("lock:a", "tok-2", 30).await.unwrap());
        assert_eq!(store.get("lock:a").await.unwrap().unwrap(), "tok-1");

        // A different key is independent
        assert!(store.set_nx_ex("lock:b", "tok-3", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_can_be_reacquired() {
        let store = MemoryKvStore::new();

        assert!(store.set_nx_ex("lock:a", "tok-1", 1).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("lock:a").await.unwrap(), None);
        assert!(store.set_nx_ex("lock:a", "tok-2", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_ex_overwrites() {
        let store = MemoryKvStore::new();
        store.set_ex("k", "v1", 30).await.unwrap();
        store.set_ex("k", "v2", 30).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_del() {
        let store = MemoryKvStore::new();
        store.set_ex("k", "v", 30).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let store = MemoryKvStore::new();
        store
            .hset("meta", &[("table", "audit_events"), ("createdAt", "t0")])
            .await
            .unwrap();
        store.hset("meta", &[("lastOptimizedAt", "t1")]).await.unwrap();

        assert_eq!(store.hget("meta", "table").await.unwrap().unwrap(), "audit_events");
        let all = store.hgetall("meta").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all["lastOptimizedAt"], "t1");

        assert_eq!(store.hget("meta", "missing").await.unwrap(), None);
        assert!(store.hgetall("absent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_glob() {
        let store = MemoryKvStore::new();
        store.set_ex("cache:a:1", "x", 30).await.unwrap();
        store.set_ex("cache:a:2", "x", 30).await.unwrap();
        store.set_ex("cache:b:1", "x", 30).await.unwrap();

        let mut keys = store.keys("cache:a:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache:a:1", "cache:a:2"]);
        assert_eq!(store.keys("cache:*").await.unwrap().len(), 3);
        assert!(store.keys("session:*").await.unwrap().is_empty());
    }
}
