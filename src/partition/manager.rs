//! Partition manager — creates, optimizes, and retires time-range shards
//!
//! Safe under concurrent invocation from multiple worker processes: every
//! mutation runs under a distributed lock keyed by partition name and
//! operation, and losing the lock race is a clean skip, never an error.
//! Locks are per partition+operation, so two different partitions can be
//! created concurrently.

use super::{
    add_months, NoopBackup, PartitionBackup, PartitionOpReport, PartitionOutcome,
    PartitionPerformanceReport, PartitionStatus,
};
use crate::catalog::{Catalog, IndexSpec, TableStats};
use crate::config::{PartitionConfig, PartitionStrategy};
use crate::error::{LedgerError, Result};
use crate::kv::KvStore;
use crate::lock::LockManager;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Namespace for partition metadata hashes in the key-value store
const META_PREFIX: &str = "ledger:partition:";

/// Drops are skipped when table statistics show activity this recent
const DROP_SAFETY_WINDOW_HOURS: i64 = 24;

/// Above this partition count, recommend a coarser interval
const MAX_PARTITION_COUNT: usize = 48;

/// Above this size, a partition is flagged as oversized (20 GiB)
const OVERSIZED_PARTITION_BYTES: i64 = 20 * 1024 * 1024 * 1024;

/// Above this many empty partitions, recommend shrinking the lookahead
const MAX_EMPTY_PARTITIONS: usize = 6;

/// Lifecycle manager for the partitioned audit event table
pub struct PartitionManager {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn KvStore>,
    locks: LockManager,
    backup: Arc<dyn PartitionBackup>,
    config: PartitionConfig,
}

impl PartitionManager {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn KvStore>,
        config: PartitionConfig,
    ) -> Self {
        let locks = LockManager::new(Arc::clone(&store), config.lock_ttl_seconds);
        Self {
            catalog,
            store,
            locks,
            backup: Arc::new(NoopBackup),
            config,
        }
    }

    /// Replace the backup hook run before drops
    pub fn with_backup(mut self, backup: Arc<dyn PartitionBackup>) -> Self {
        self.backup = backup;
        self
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn retention_days(&self) -> u32 {
        self.config.retention_days
    }

    fn meta_key(name: &str) -> String {
        format!("{}{}", META_PREFIX, name)
    }

    /// Create one range partition of `table`
    ///
    /// Idempotent: an existing partition is a no-op. Lock contention means
    /// another process is already creating it and is also a no-op.
    pub async fn create_partition(
        &self,
        table: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PartitionOutcome> {
        let name = self.config.interval.partition_name(table, start);

        let Some(lease) = self.locks.acquire(&name).await? else {
            tracing::info!(
                partition = %name,
                "Partition creation already in progress elsewhere"
            );
            return Ok(PartitionOutcome::LockContended);
        };

        let result = self.create_partition_locked(table, &name, start, end).await;
        self.locks.release(lease).await;
        result
    }

    async fn create_partition_locked(
        &self,
        table: &str,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PartitionOutcome> {
        if self.catalog.table_exists(name).await? {
            tracing::debug!(partition = %name, "Partition already exists");
            return Ok(PartitionOutcome::AlreadyExists);
        }

        if let Err(e) = self
            .catalog
            .create_range_partition(table, name, start, end)
            .await
        {
            tracing::error!(
                partition = %name,
                table = %table,
                error = %e,
                "Partition creation failed"
            );
            return Err(e);
        }

        // Supporting indexes are best-effort: a failed index is logged and
        // skipped, the partition stays usable without it.
        let mut skipped = 0usize;
        for index in Self::index_specs(name) {
            if let Err(e) = self.catalog.create_index(name, &index).await {
                skipped += 1;
                tracing::warn!(
                    partition = %name,
                    index = %index.name,
                    error = %e,
                    "Index creation failed, skipping"
                );
            }
        }

        let start_str = start.to_rfc3339();
        let end_str = end.to_rfc3339();
        let created_str = Utc::now().to_rfc3339();
        let fields: Vec<(&str, &str)> = vec![
            ("table", table),
            ("rangeStart", &start_str),
            ("rangeEnd", &end_str),
            ("createdAt", &created_str),
        ];
        if let Err(e) = self.store.hset(&Self::meta_key(name), &fields).await {
            tracing::error!(
                partition = %name,
                error = %e,
                "Failed to persist partition metadata"
            );
            return Err(e);
        }

        tracing::info!(
            partition = %name,
            range_start = %start_str,
            range_end = %end_str,
            skipped_indexes = skipped,
            "Partition created"
        );
        Ok(PartitionOutcome::Created)
    }

    fn index_specs(name: &str) -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique_btree(format!("idx_{}_id", name), &["id", "occurred_at"]),
            IndexSpec::btree(format!("idx_{}_occurred_at", name), &["occurred_at"]),
            IndexSpec::btree(format!("idx_{}_actor", name), &["actor_id"]),
            IndexSpec::btree(format!("idx_{}_action", name), &["action"]),
            IndexSpec::btree(
                format!("idx_{}_resource", name),
                &["resource_type", "resource_id"],
            ),
            IndexSpec::gin(format!("idx_{}_payload", name), "payload"),
        ]
    }

    /// Drop one partition after a safety check and backup
    pub async fn drop_partition(&self, name: &str) -> Result<PartitionOutcome> {
        let lock_name = format!("{}_drop", name);
        let Some(lease) = self.locks.acquire(&lock_name).await? else {
            tracing::info!(partition = %name, "Partition drop already in progress elsewhere");
            return Ok(PartitionOutcome::LockContended);
        };

        let result = self.drop_partition_locked(name).await;
        self.locks.release(lease).await;
        result
    }

    async fn drop_partition_locked(&self, name: &str) -> Result<PartitionOutcome> {
        let stats = match self.catalog.table_stats(name).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(partition = %name, error = %e, "Failed to read stats before drop");
                return Err(e);
            }
        };

        // Heuristic: statistics timestamps lag real writes, so this can
        // only delay a legitimate drop, never rush one.
        if let Some(last_activity) = stats.last_activity_at {
            if Utc::now() - last_activity < Duration::hours(DROP_SAFETY_WINDOW_HOURS) {
                tracing::warn!(
                    partition = %name,
                    last_activity = %last_activity.to_rfc3339(),
                    "Partition recently active, skipping drop"
                );
                return Ok(PartitionOutcome::SkippedActive);
            }
        }

        if let Err(e) = self.backup.backup(name).await {
            tracing::error!(
                partition = %name,
                hook = %self.backup.name(),
                error = %e,
                "Backup failed, aborting drop"
            );
            return Err(e);
        }

        if let Err(e) = self.catalog.drop_table(name).await {
            tracing::error!(partition = %name, error = %e, "Partition drop failed");
            return Err(e);
        }

        // The table is already gone; stale metadata is harmless and gets
        // swept by the next invalidation, so a delete failure is a warn.
        if let Err(e) = self.store.del(&Self::meta_key(name)).await {
            tracing::warn!(partition = %name, error = %e, "Failed to delete partition metadata");
        }

        tracing::info!(partition = %name, rows = stats.live_rows, "Partition dropped");
        Ok(PartitionOutcome::Dropped)
    }

    /// Drop every partition whose range ended before `now − retention_days`
    ///
    /// Best-effort sweep: per-partition failures are recorded and the
    /// sweep continues.
    pub async fn drop_expired_partitions(
        &self,
        retention_days: u32,
    ) -> Result<Vec<PartitionOpReport>> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let partitions = self.catalog.list_partitions(&self.config.table_name).await?;

        let mut reports = Vec::new();
        for partition in partitions {
            if partition.range_end >= cutoff {
                continue;
            }

            let outcome = match self.drop_partition(&partition.name).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        partition = %partition.name,
                        error = %e,
                        "Failed to drop expired partition"
                    );
                    PartitionOutcome::Failed(e.to_string())
                }
            };
            reports.push(PartitionOpReport {
                partition: partition.name,
                outcome,
            });
        }

        if !reports.is_empty() {
            tracing::info!(
                cutoff = %cutoff.to_rfc3339(),
                candidates = reports.len(),
                "Expired partition sweep completed"
            );
        }
        Ok(reports)
    }

    /// Refresh statistics for one partition, rebuilding indexes when the
    /// dead-row ratio warrants it
    pub async fn optimize(&self, name: &str) -> Result<PartitionOutcome> {
        let lock_name = format!("{}_optimize", name);
        let Some(lease) = self.locks.acquire(&lock_name).await? else {
            tracing::info!(partition = %name, "Partition optimize already in progress elsewhere");
            return Ok(PartitionOutcome::LockContended);
        };

        let result = self.optimize_locked(name).await;
        self.locks.release(lease).await;
        result
    }

    async fn optimize_locked(&self, name: &str) -> Result<PartitionOutcome> {
        if let Err(e) = self.catalog.analyze(name).await {
            tracing::error!(partition = %name, error = %e, "Analyze failed");
            return Err(e);
        }

        let stats = self.catalog.table_stats(name).await?;
        let reindexed = stats.dead_rows > stats.live_rows / 5;
        if reindexed {
            if let Err(e) = self.catalog.reindex(name).await {
                tracing::error!(partition = %name, error = %e, "Reindex failed");
                return Err(e);
            }
        }

        let optimized_at = Utc::now().to_rfc3339();
        self.store
            .hset(&Self::meta_key(name), &[("lastOptimizedAt", &optimized_at)])
            .await?;

        tracing::info!(
            partition = %name,
            live_rows = stats.live_rows,
            dead_rows = stats.dead_rows,
            reindexed,
            "Partition optimized"
        );
        Ok(PartitionOutcome::Optimized)
    }

    /// Health, size, and optimization recency for every partition
    ///
    /// Read-only and lock-free; a partition whose stats cannot be read is
    /// reported unhealthy rather than failing the whole query.
    pub async fn get_partition_status(&self) -> Result<Vec<PartitionStatus>> {
        let partitions = self.catalog.list_partitions(&self.config.table_name).await?;

        let mut statuses = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let (stats, healthy) = match self.catalog.table_stats(&partition.name).await {
                Ok(stats) => (stats, true),
                Err(e) => {
                    tracing::warn!(
                        partition = %partition.name,
                        error = %e,
                        "Failed to read partition stats"
                    );
                    (TableStats::default(), false)
                }
            };

            let last_optimized_at = match self
                .store
                .hget(&Self::meta_key(&partition.name), "lastOptimizedAt")
                .await
            {
                Ok(value) => value
                    .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(
                        partition = %partition.name,
                        error = %e,
                        "Failed to read partition metadata"
                    );
                    None
                }
            };

            statuses.push(PartitionStatus {
                partition_name: partition.name,
                range_start: partition.range_start,
                range_end: partition.range_end,
                record_count: stats.live_rows,
                size_bytes: stats.total_bytes,
                last_optimized_at,
                healthy,
            });
        }

        Ok(statuses)
    }

    /// Ensure the parent table and every partition covering
    /// `[now − retention_days, now + lookahead_months]`
    ///
    /// Creates each partition independently, continuing past individual
    /// failures.
    pub async fn create_audit_log_partitions(&self) -> Result<Vec<PartitionOpReport>> {
        if self.config.strategy != PartitionStrategy::Range {
            return Err(LedgerError::Config(format!(
                "unsupported partition strategy {:?}: only range partitioning is implemented",
                self.config.strategy
            )));
        }

        let table = self.config.table_name.clone();
        if !self.catalog.table_exists(&table).await? {
            self.catalog.create_parent_table(&table).await?;
            tracing::info!(table = %table, "Parent partitioned table initialized");
        }

        let now = Utc::now();
        let mut start = self
            .config
            .interval
            .align(now - Duration::days(self.config.retention_days as i64));
        let horizon = add_months(
            super::PartitionInterval::Monthly.align(now),
            self.config.lookahead_months,
        );

        let mut reports = Vec::new();
        while start <= horizon {
            let end = self.config.interval.next(start);
            let name = self.config.interval.partition_name(&table, start);

            let outcome = match self.create_partition(&table, start, end).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(partition = %name, error = %e, "Failed to create partition");
                    PartitionOutcome::Failed(e.to_string())
                }
            };
            reports.push(PartitionOpReport {
                partition: name,
                outcome,
            });
            start = end;
        }

        Ok(reports)
    }

    /// Aggregate partition counts and sizes with tuning recommendations
    pub async fn analyze_partition_performance(&self) -> Result<PartitionPerformanceReport> {
        let statuses = self.get_partition_status().await?;

        let partition_count = statuses.len();
        let total_records: i64 = statuses.iter().map(|s| s.record_count).sum();
        let total_bytes: i64 = statuses.iter().map(|s| s.size_bytes).sum();
        let empty_partitions = statuses.iter().filter(|s| s.record_count == 0).count();
        let largest_partition_bytes = statuses.iter().map(|s| s.size_bytes).max().unwrap_or(0);

        let mut recommendations = Vec::new();
        if partition_count > MAX_PARTITION_COUNT {
            recommendations.push(format!(
                "{} partitions exceed the recommended {}; consider a coarser interval or shorter retention",
                partition_count, MAX_PARTITION_COUNT
            ));
        }
        for status in &statuses {
            if status.size_bytes > OVERSIZED_PARTITION_BYTES {
                recommendations.push(format!(
                    "partition {} is {} bytes; consider a finer interval",
                    status.partition_name, status.size_bytes
                ));
            }
        }
        if empty_partitions > MAX_EMPTY_PARTITIONS {
            recommendations.push(format!(
                "{} empty partitions; the lookahead window may be too aggressive",
                empty_partitions
            ));
        }

        Ok(PartitionPerformanceReport {
            partition_count,
            total_records,
            total_bytes,
            empty_partitions,
            largest_partition_bytes,
            recommendations,
        })
    }
}
