//! Postgres catalog backend
//!
//! Renders the catalog trait into Postgres DDL and `pg_catalog` /
//! `pg_stat_user_tables` introspection. All table and index names are
//! derived internally from the configured table name — they never carry
//! user input, so identifiers are interpolated directly.

use super::{Catalog, CatalogPartition, IndexMethod, IndexSpec, TableStats};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// Postgres-backed `Catalog`
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Connect with a small dedicated pool
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| LedgerError::Connection(format!("postgres: {}", e)))?;

        tracing::info!("Connected to Postgres");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn execute_ddl(&self, operation: &str, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| LedgerError::Catalog {
                operation: operation.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Parse a `pg_get_expr(relpartbound, ...)` range expression
///
/// Shape: `FOR VALUES FROM ('2026-08-01 00:00:00+00') TO ('2026-09-01 00:00:00+00')`.
/// Returns `None` for DEFAULT partitions or unrecognized bounds.
fn parse_partition_bounds(expr: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from_idx = expr.find("FROM ('")? + "FROM ('".len();
    let from_end = expr[from_idx..].find("')")? + from_idx;
    let to_idx = expr.find("TO ('")? + "TO ('".len();
    let to_end = expr[to_idx..].find("')")? + to_idx;

    let from = parse_bound_timestamp(&expr[from_idx..from_end])?;
    let to = parse_bound_timestamp(&expr[to_idx..to_end])?;
    Some((from, to))
}

fn parse_bound_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn create_parent_table(&self, table: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                 id UUID NOT NULL, \
                 occurred_at TIMESTAMPTZ NOT NULL, \
                 actor_id TEXT, \
                 action TEXT NOT NULL, \
                 resource_type TEXT, \
                 resource_id TEXT, \
                 payload JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
                 recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                 PRIMARY KEY (id, occurred_at)\
             ) PARTITION BY RANGE (occurred_at)"
        );
        self.execute_ddl("create_parent_table", &sql).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_class WHERE relname = $1 AND relkind IN ('r', 'p'))",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Catalog {
            operation: "table_exists".to_string(),
            reason: e.to_string(),
        })
    }

    async fn create_range_partition(
        &self,
        parent: &str,
        name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF {parent} \
             FOR VALUES FROM ('{}') TO ('{}')",
            from.to_rfc3339(),
            to.to_rfc3339(),
        );
        self.execute_ddl("create_range_partition", &sql).await
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let method = match index.method {
            IndexMethod::BTree => "btree",
            IndexMethod::Gin => "gin",
        };
        let sql = format!(
            "CREATE {unique}INDEX IF NOT EXISTS {} ON {table} USING {method} ({})",
            index.name,
            index.columns.join(", "),
        );
        self.execute_ddl("create_index", &sql).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute_ddl("drop_table", &format!("DROP TABLE IF EXISTS {table}"))
            .await
    }

    async fn analyze(&self, table: &str) -> Result<()> {
        self.execute_ddl("analyze", &format!("ANALYZE {table}")).await
    }

    async fn reindex(&self, table: &str) -> Result<()> {
        self.execute_ddl("reindex", &format!("REINDEX TABLE {table}"))
            .await
    }

    async fn list_partitions(&self, parent: &str) -> Result<Vec<CatalogPartition>> {
        let rows = sqlx::query(
            "SELECT c.relname AS name, pg_get_expr(c.relpartbound, c.oid) AS bounds \
             FROM pg_inherits i \
             JOIN pg_class c ON c.oid = i.inhrelid \
             JOIN pg_class p ON p.oid = i.inhparent \
             WHERE p.relname = $1 \
             ORDER BY c.relname",
        )
        .bind(parent)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Catalog {
            operation: "list_partitions".to_string(),
            reason: e.to_string(),
        })?;

        let mut partitions = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name").map_err(|e| LedgerError::Catalog {
                operation: "list_partitions".to_string(),
                reason: e.to_string(),
            })?;
            let bounds: Option<String> =
                row.try_get("bounds").map_err(|e| LedgerError::Catalog {
                    operation: "list_partitions".to_string(),
                    reason: e.to_string(),
                })?;

            match bounds.as_deref().and_then(parse_partition_bounds) {
                Some((range_start, range_end)) => partitions.push(CatalogPartition {
                    name,
                    range_start,
                    range_end,
                }),
                None => {
                    tracing::debug!(
                        partition = %name,
                        "Skipping partition with non-range bounds"
                    );
                }
            }
        }

        Ok(partitions)
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats> {
        let row = sqlx::query(
            "SELECT COALESCE(s.n_live_tup, 0)::BIGINT AS live_rows, \
                    COALESCE(s.n_dead_tup, 0)::BIGINT AS dead_rows, \
                    pg_total_relation_size(c.oid) AS total_bytes, \
                    GREATEST(s.last_analyze, s.last_autoanalyze, s.last_vacuum, s.last_autovacuum) \
                        AS last_activity_at \
             FROM pg_class c \
             LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid \
             WHERE c.relname = $1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Catalog {
            operation: "table_stats".to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| LedgerError::NotFound(format!("table '{}'", table)))?;

        let stats = TableStats {
            live_rows: row.try_get("live_rows").unwrap_or(0),
            dead_rows: row.try_get("dead_rows").unwrap_or(0),
            total_bytes: row.try_get("total_bytes").unwrap_or(0),
            last_activity_at: row.try_get("last_activity_at").unwrap_or(None),
        };
        Ok(stats)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
