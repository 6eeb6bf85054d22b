//! Partition lifecycle for the time-partitioned audit event table
//!
//! Time-range shards are named deterministically from the table name and
//! the range start, so every worker in a deployment derives the same name
//! for the same range — that name doubles as the distributed lock key.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub mod backup;
pub mod maintenance;
pub mod manager;

pub use backup::{MemoryBackup, NoopBackup, PartitionBackup};
pub use maintenance::{MaintenanceEvent, MaintenanceScheduler, TickSummary};
pub use manager::PartitionManager;

/// Cadence of the time-range shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionInterval {
    Monthly,
    Quarterly,
    Yearly,
}

impl PartitionInterval {
    /// Start of the interval containing `at`
    pub fn align(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let month = match self {
            PartitionInterval::Monthly => at.month(),
            PartitionInterval::Quarterly => (at.month() - 1) / 3 * 3 + 1,
            PartitionInterval::Yearly => 1,
        };
        month_start(at.year(), month)
    }

    /// Start of the interval after the one starting at `start`
    pub fn next(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            PartitionInterval::Monthly => 1,
            PartitionInterval::Quarterly => 3,
            PartitionInterval::Yearly => 12,
        };
        add_months(start, months)
    }

    /// Deterministic partition name for the interval starting at `start`
    pub fn partition_name(&self, table: &str, start: DateTime<Utc>) -> String {
        match self {
            PartitionInterval::Monthly => {
                format!("{}_y{:04}m{:02}", table, start.year(), start.month())
            }
            PartitionInterval::Quarterly => {
                format!("{}_y{:04}q{}", table, start.year(), (start.month() - 1) / 3 + 1)
            }
            PartitionInterval::Yearly => format!("{}_y{:04}", table, start.year()),
        }
    }
}

/// Midnight UTC on the first of the month; valid by construction for
/// `month` in 1..=12
fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month")
}

/// Shift a month-start timestamp forward by whole months
pub(crate) fn add_months(start: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let zero_based = start.month0() + months;
    let year = start.year() + (zero_based / 12) as i32;
    month_start(year, zero_based % 12 + 1)
}

/// Outcome of one partition operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PartitionOutcome {
    /// Partition created, indexed, and registered
    Created,
    /// Idempotent no-op: the partition already existed
    AlreadyExists,
    /// Another process holds the lock; nothing was done
    LockContended,
    /// Partition dropped and its metadata removed
    Dropped,
    /// Drop skipped: activity detected inside the safety window
    SkippedActive,
    /// Statistics refreshed (and indexes rebuilt when warranted)
    Optimized,
    /// Operation failed; the batch it belongs to continued
    Failed(String),
}

/// One entry in a best-effort batch result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOpReport {
    pub partition: String,
    pub outcome: PartitionOutcome,
}

/// Health and size of one partition, merged from catalog introspection
/// and stored metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatus {
    pub partition_name: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub record_count: i64,
    pub size_bytes: i64,
    pub last_optimized_at: Option<DateTime<Utc>>,
    pub healthy: bool,
}

/// Aggregate view with heuristic tuning recommendations
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionPerformanceReport {
    pub partition_count: usize,
    pub total_records: i64,
    pub total_bytes: i64,
    pub empty_partitions: usize,
    pub largest_partition_bytes: i64,
    pub recommendations: Vec<String>,
}
