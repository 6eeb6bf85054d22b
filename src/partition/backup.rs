//! Pluggable backup hook run before a partition is dropped
//!
//! Dropping a partition is irreversible, so the manager offers a seam to
//! archive its data first. The default implementation does nothing;
//! deployments with cold storage plug in their own.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Trait for partition backup hooks
///
/// A backup failure aborts the drop — the partition stays in place.
#[async_trait]
pub trait PartitionBackup: Send + Sync {
    /// Archive a partition's data ahead of its drop
    async fn backup(&self, partition: &str) -> Result<()>;

    /// Hook name for logs
    fn name(&self) -> &str;
}

/// Default hook: no backup, drops proceed directly
#[derive(Debug, Default)]
pub struct NoopBackup;

#[async_trait]
impl PartitionBackup for NoopBackup {
    async fn backup(&self, _partition: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Records backed-up partition names; for tests
#[derive(Debug, Default)]
pub struct MemoryBackup {
    partitions: RwLock<Vec<String>>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions backed up so far, in order
    pub async fn backed_up(&self) -> Vec<String> {
        self.partitions.read().await.clone()
    }
}

#[async_trait]
impl PartitionBackup for MemoryBackup {
    async fn backup(&self, partition: &str) -> Result<()> {
        tracing::debug!(partition = %partition, "Backing up partition");
        self.partitions.write().await.push(partition.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
