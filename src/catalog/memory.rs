//! In-memory catalog for testing
//!
//! Mirrors the Postgres backend's observable behavior: idempotent DDL,
//! range introspection, and per-table statistics. Tests can inject stats
//! and force individual DDL statements to fail.

use super::{Catalog, CatalogPartition, IndexSpec, TableStats};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

struct MemTable {
    parent: Option<String>,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    indexes: Vec<String>,
    stats: TableStats,
    analyze_count: u32,
    reindex_count: u32,
}

impl MemTable {
    fn new(parent: Option<String>, range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Self {
        Self {
            parent,
            range,
            indexes: Vec::new(),
            stats: TableStats::default(),
            analyze_count: 0,
            reindex_count: 0,
        }
    }
}

#[derive(Default)]
struct CatalogState {
    tables: HashMap<String, MemTable>,
    // One-shot failure injection, keyed by table or index name
    fail_next: HashSet<String>,
}

impl CatalogState {
    fn should_fail(&mut self, name: &str, operation: &str) -> Result<()> {
        if self.fail_next.remove(name) {
            return Err(LedgerError::Catalog {
                operation: operation.to_string(),
                reason: format!("injected failure for '{}'", name),
            });
        }
        Ok(())
    }
}

/// In-memory `Catalog` backend
#[derive(Default)]
pub struct MemoryCatalog {
    inner: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next DDL touching `name` (table or index) to fail
    pub async fn fail_next(&self, name: &str) {
        self.inner.write().await.fail_next.insert(name.to_string());
    }

    /// Replace the statistics reported for a table
    pub async fn set_stats(&self, table: &str, stats: TableStats) {
        if let Some(t) = self.inner.write().await.tables.get_mut(table) {
            t.stats = stats;
        }
    }

    /// Mark a table as recently written (moves `last_activity_at` to now)
    pub async fn record_activity(&self, table: &str) {
        if let Some(t) = self.inner.write().await.tables.get_mut(table) {
            t.stats.last_activity_at = Some(Utc::now());
        }
    }

    pub async fn index_names(&self, table: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }

    pub async fn analyze_count(&self, table: &str) -> u32 {
        self.inner
            .read()
            .await
            .tables
            .get(table)
            .map(|t| t.analyze_count)
            .unwrap_or(0)
    }

    pub async fn reindex_count(&self, table: &str) -> u32 {
        self.inner
            .read()
            .await
            .tables
            .get(table)
            .map(|t| t.reindex_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn create_parent_table(&self, table: &str) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(table, "create_parent_table")?;
        state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemTable::new(None, None));
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.inner.read().await.tables.contains_key(table))
    }

    async fn create_range_partition(
        &self,
        parent: &str,
        name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(name, "create_range_partition")?;
        if !state.tables.contains_key(parent) {
            return Err(LedgerError::Catalog {
                operation: "create_range_partition".to_string(),
                reason: format!("parent table '{}' does not exist", parent),
            });
        }
        state
            .tables
            .entry(name.to_string())
            .or_insert_with(|| MemTable::new(Some(parent.to_string()), Some((from, to))));
        Ok(())
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(&index.name, "create_index")?;
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| LedgerError::NotFound(format!("table '{}'", table)))?;
        if !t.indexes.contains(&index.name) {
            t.indexes.push(index.name.clone());
        }
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(table, "drop_table")?;
        state.tables.remove(table);
        Ok(())
    }

    async fn analyze(&self, table: &str) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(table, "analyze")?;
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| LedgerError::NotFound(format!("table '{}'", table)))?;
        t.analyze_count += 1;
        // Postgres stamps last_analyze, which feeds the activity heuristic
        t.stats.last_activity_at = Some(Utc::now());
        Ok(())
    }

    async fn reindex(&self, table: &str) -> Result<()> {
        let mut state = self.inner.write().await;
        state.should_fail(table, "reindex")?;
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| LedgerError::NotFound(format!("table '{}'", table)))?;
        t.reindex_count += 1;
        Ok(())
    }

    async fn list_partitions(&self, parent: &str) -> Result<Vec<CatalogPartition>> {
        let state = self.inner.read().await;
        let mut partitions: Vec<CatalogPartition> = state
            .tables
            .iter()
            .filter(|(_, t)| t.parent.as_deref() == Some(parent))
            .filter_map(|(name, t)| {
                t.range.map(|(range_start, range_end)| CatalogPartition {
                    name: name.clone(),
                    range_start,
                    range_end,
                })
            })
            .collect();
        partitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(partitions)
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats> {
        let state = self.inner.read().await;
        state
            .tables
            .get(table)
            .map(|t| t.stats.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("table '{}'", table)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_parent_and_partition_lifecycle() {
        let catalog = MemoryCatalog::new();
        catalog.create_parent_table("audit_events").await.unwrap();
        assert!(catalog.table_exists("audit_events").await.unwrap());

        catalog
            .create_range_partition("audit_events", "audit_events_y2026m08", ts(2026, 8), ts(2026, 9))
            .await
            .unwrap();

        let partitions = catalog.list_partitions("audit_events").await.unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].name, "audit_events_y2026m08");
        assert_eq!(partitions[0].range_start, ts(2026, 8));

        catalog.drop_table("audit_events_y2026m08").await.unwrap();
        assert!(catalog.list_partitions("audit_events").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partition_requires_parent() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .create_range_partition("missing", "p", ts(2026, 1), ts(2026, 2))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let catalog = MemoryCatalog::new();
        catalog.fail_next("audit_events").await;

        assert!(catalog.create_parent_table("audit_events").await.is_err());
        assert!(catalog.create_parent_table("audit_events").await.is_ok());
    }

    #[tokio::test]
    async fn test_analyze_bumps_activity() {
        let catalog = MemoryCatalog::new();
        catalog.create_parent_table("t").await.unwrap();
        assert!(catalog.table_stats("t").await.unwrap().last_activity_at.is_none());

        catalog.analyze("t").await.unwrap();
        assert_eq!(catalog.analyze_count("t").await, 1);
        assert!(catalog.table_stats("t").await.unwrap().last_activity_at.is_some());
    }
}
