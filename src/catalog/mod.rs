//! Relational catalog interface — DDL and introspection for the
//! partitioned audit event table
//!
//! The partition manager never talks SQL directly; it drives this trait,
//! which backends render into engine-specific DDL and catalog queries.
//! Ships with a Postgres backend and an in-memory twin for tests.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

/// One child partition as reported by catalog introspection
#[derive(Debug, Clone)]
pub struct CatalogPartition {
    pub name: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
}

/// Storage statistics for a single table
///
/// `last_activity_at` is derived from statistics-refresh timestamps and
/// can lag actual writes; treat it as a heuristic, not ground truth.
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub live_rows: i64,
    pub dead_rows: i64,
    pub total_bytes: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Index access method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    BTree,
    Gin,
}

/// Specification of one supporting index
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub method: IndexMethod,
    pub unique: bool,
}

impl IndexSpec {
    pub fn btree(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            method: IndexMethod::BTree,
            unique: false,
        }
    }

    pub fn unique_btree(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            unique: true,
            ..Self::btree(name, columns)
        }
    }

    pub fn gin(name: impl Into<String>, column: &str) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.to_string()],
            method: IndexMethod::Gin,
            unique: false,
        }
    }
}

/// Core trait for relational catalog backends
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create the parent range-partitioned audit table if absent
    async fn create_parent_table(&self, table: &str) -> Result<()>;

    /// True when a table or partition with this name exists
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create a range-bound child partition of `parent` (idempotent)
    async fn create_range_partition(
        &self,
        parent: &str,
        name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()>;

    /// Create a supporting index on a partition (idempotent)
    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()>;

    /// Drop a table or partition
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Refresh planner statistics for a table
    async fn analyze(&self, table: &str) -> Result<()>;

    /// Rebuild the indexes of a table
    async fn reindex(&self, table: &str) -> Result<()>;

    /// Enumerate child partitions of a parent table
    async fn list_partitions(&self, parent: &str) -> Result<Vec<CatalogPartition>>;

    /// Storage statistics for one table
    async fn table_stats(&self, table: &str) -> Result<TableStats>;

    /// Backend name (e.g., "postgres", "memory")
    fn name(&self) -> &str;
}
