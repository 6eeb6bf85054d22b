//! Redis key-value backend
//!
//! Uses a `ConnectionManager` so a dropped connection is re-established
//! transparently; every ledger process in a deployment points at the same
//! Redis, which is what makes the locks distributed.

use super::KvStore;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

/// Redis-backed `KvStore`
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to Redis at the given URL (e.g., `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LedgerError::Connection(format!("{}: {}", url, e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LedgerError::Connection(format!("{}: {}", url, e)))?;

        tracing::info!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn map_err(command: &str, e: redis::RedisError) -> LedgerError {
    LedgerError::Connection(format!("redis {}: {}", command, e))
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET key value NX EX ttl — replies OK on success, nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("SET NX EX", e))?;
        Ok(reply.is_some())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(|e| map_err("SETEX", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| map_err("GET", e))
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await.map_err(|e| map_err("DEL", e))?;
        Ok(removed > 0)
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(|e| map_err("HSET", e))?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(|e| map_err("HGET", e))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(|e| map_err("HGETALL", e))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await.map_err(|e| map_err("KEYS", e))
    }

    fn name(&self) -> &str {
        "redis"
    }
}
