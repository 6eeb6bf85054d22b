//! Timer-driven partition maintenance
//!
//! Periodically asks the partition manager to create upcoming partitions
//! and retire expired ones. A failing tick is logged and broadcast, never
//! propagated — the next tick proceeds regardless.

use super::{PartitionManager, PartitionOutcome};
use crate::config::MaintenanceConfig;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};

/// Scheduler events for monitoring
#[derive(Debug, Clone)]
pub enum MaintenanceEvent {
    /// Scheduler started
    Started,
    /// Scheduler stopped
    Stopped,
    /// A tick completed
    TickCompleted { created: usize, dropped: usize },
    /// A tick failed; the loop continues
    TickFailed { error: String },
}

/// What one maintenance tick accomplished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub created: usize,
    pub dropped: usize,
}

/// Background maintenance loop around a [`PartitionManager`]
pub struct MaintenanceScheduler {
    manager: Arc<PartitionManager>,
    config: MaintenanceConfig,
    event_tx: broadcast::Sender<MaintenanceEvent>,
    running: Arc<RwLock<bool>>,
}

impl MaintenanceScheduler {
    pub fn new(manager: Arc<PartitionManager>, config: MaintenanceConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            manager,
            config,
            event_tx,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<MaintenanceEvent> {
        self.event_tx.subscribe()
    }

    /// Run a single maintenance pass
    ///
    /// The aggregate performance snapshot is logged even when creation or
    /// drop fails; the first error is returned after the pass completes.
    pub async fn run_once(&self) -> Result<TickSummary> {
        Self::tick(&self.manager, &self.config).await
    }

    async fn tick(manager: &PartitionManager, config: &MaintenanceConfig) -> Result<TickSummary> {
        let mut summary = TickSummary::default();
        let mut first_error = None;

        if config.auto_create_partitions {
            match manager.create_audit_log_partitions().await {
                Ok(reports) => {
                    summary.created = reports
                        .iter()
                        .filter(|r| r.outcome == PartitionOutcome::Created)
                        .count();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Automatic partition creation failed");
                    first_error = Some(e);
                }
            }
        }

        if config.auto_drop_partitions {
            match manager
                .drop_expired_partitions(manager.retention_days())
                .await
            {
                Ok(reports) => {
                    summary.dropped = reports
                        .iter()
                        .filter(|r| r.outcome == PartitionOutcome::Dropped)
                        .count();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Expired partition sweep failed");
                    first_error = first_error.or(Some(e));
                }
            }
        }

        match manager.analyze_partition_performance().await {
            Ok(report) => {
                tracing::info!(
                    partitions = report.partition_count,
                    total_records = report.total_records,
                    total_bytes = report.total_bytes,
                    empty = report.empty_partitions,
                    recommendations = report.recommendations.len(),
                    "Partition maintenance snapshot"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to analyze partition performance");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Start the background maintenance task
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let _ = self.event_tx.send(MaintenanceEvent::Started);
        tracing::info!(
            interval_secs = self.config.maintenance_interval_secs,
            auto_create = self.config.auto_create_partitions,
            auto_drop = self.config.auto_drop_partitions,
            "Partition maintenance scheduler started"
        );

        let manager = Arc::clone(&self.manager);
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(config.maintenance_interval_secs.max(1)));
            // The first tick of `interval` fires immediately; skip it so a
            // freshly started scheduler waits a full period.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !*running.read().await {
                    break;
                }

                match Self::tick(&manager, &config).await {
                    Ok(summary) => {
                        let _ = event_tx.send(MaintenanceEvent::TickCompleted {
                            created: summary.created,
                            dropped: summary.dropped,
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Maintenance tick failed");
                        let _ = event_tx.send(MaintenanceEvent::TickFailed {
                            error: e.to_string(),
                        });
                    }
                }
            }

            let _ = event_tx.send(MaintenanceEvent::Stopped);
            tracing::info!("Partition maintenance scheduler stopped");
        });
    }

    /// Stop the scheduler after the current tick
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalog;
    use crate::catalog::Catalog;
    use crate::config::PartitionConfig;
    use crate::kv::memory::MemoryKvStore;
    use crate::kv::KvStore;

    fn scheduler_with(
        config: MaintenanceConfig,
        partition_config: PartitionConfig,
    ) -> (Arc<MemoryCatalog>, MaintenanceScheduler) {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryKvStore::new());
        let manager = Arc::new(PartitionManager::new(
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            store as Arc<dyn KvStore>,
            partition_config,
        ));
        (catalog, MaintenanceScheduler::new(manager, config))
    }

    #[tokio::test]
    async fn test_run_once_creates_partitions() {
        let (catalog, scheduler) = scheduler_with(
            MaintenanceConfig::default(),
            PartitionConfig {
                retention_days: 30,
                lookahead_months: 1,
                ..PartitionConfig::default()
            },
        );

        let summary = scheduler.run_once().await.unwrap();
        assert!(summary.created >= 2);
        assert_eq!(summary.dropped, 0);
        assert!(!catalog.list_partitions("audit_events").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_with_auto_flags_off_mutates_nothing() {
        let (catalog, scheduler) = scheduler_with(
            MaintenanceConfig {
                auto_create_partitions: false,
                auto_drop_partitions: false,
                ..MaintenanceConfig::default()
            },
            PartitionConfig::default(),
        );

        let summary = scheduler.run_once().await.unwrap();
        assert_eq!(summary, TickSummary::default());
        assert!(!catalog.table_exists("audit_events").await.unwrap());
    }

    #[tokio::test]
    async fn test_tick_failure_does_not_stop_the_loop() {
        let (catalog, scheduler) = scheduler_with(
            MaintenanceConfig {
                maintenance_interval_secs: 1,
                ..MaintenanceConfig::default()
            },
            PartitionConfig {
                retention_days: 30,
                lookahead_months: 1,
                ..PartitionConfig::default()
            },
        );

        // First tick fails at parent-table creation
        catalog.fail_next("audit_events").await;

        let mut events = scheduler.subscribe();
        scheduler.start().await;

        let mut saw_failure = false;
        let mut saw_success = false;
        for _ in 0..4 {
            match tokio::time::timeout(Duration::from_secs(3), events.recv()).await {
                Ok(Ok(MaintenanceEvent::TickFailed { .. })) => saw_failure = true,
                Ok(Ok(MaintenanceEvent::TickCompleted { .. })) => {
                    saw_success = true;
                    break;
                }
                Ok(Ok(_)) => {}
                _ => break,
            }
        }

        assert!(saw_failure);
        assert!(saw_success);
        assert!(scheduler.is_running().await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_halts() {
        let (_, scheduler) = scheduler_with(
            MaintenanceConfig {
                maintenance_interval_secs: 1,
                auto_create_partitions: false,
                ..MaintenanceConfig::default()
            },
            PartitionConfig::default(),
        );

        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }
}
