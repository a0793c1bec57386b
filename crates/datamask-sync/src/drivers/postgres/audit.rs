//! Audit table in the QA database.
//!
//! One row per table outcome. The table lives next to the synchronized data
//! so QA users can see when and how each table was last refreshed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;

use crate::audit::{AuditStore, AUDIT_TABLE};
use crate::core::identifier::qualify_table;
use crate::core::run::{OperationMode, RunStatus, TableRunResult};
use crate::error::{Result, SyncError};

/// PostgreSQL-backed [`AuditStore`].
pub struct PgAuditStore {
    pool: Pool,
    table: String,
}

impl PgAuditStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            table: AUDIT_TABLE.to_string(),
        }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn init_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for audit init_schema"))?;
        let table = qualify_table(&self.table)?;

        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                execution_id TEXT NOT NULL,
                table_name TEXT NOT NULL,
                operation TEXT NOT NULL CHECK (operation IN ('FULL', 'INCREMENTAL')),
                records_migrated BIGINT NOT NULL DEFAULT 0,
                records_failed BIGINT NOT NULL DEFAULT 0,
                total_extracted BIGINT NOT NULL DEFAULT 0,
                status TEXT NOT NULL CHECK (status IN ('SUCCESS', 'ERROR')),
                message VARCHAR(500) NOT NULL DEFAULT '',
                masking_rules TEXT NOT NULL DEFAULT '{{}}',
                attempts INTEGER NOT NULL DEFAULT 1,
                started_at TIMESTAMPTZ NOT NULL,
                ended_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{name}_table_ended
                ON {table} (table_name, ended_at DESC);",
            table = table,
            name = self.table,
        ))
        .await?;
        Ok(())
    }

    async fn record(&self, result: &TableRunResult) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for audit record"))?;
        let sql = format!(
            "INSERT INTO {} (execution_id, table_name, operation, records_migrated,
                records_failed, total_extracted, status, message, masking_rules, attempts,
                started_at, ended_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            qualify_table(&self.table)?
        );
        conn.execute(
            sql.as_str(),
            &[
                &result.execution_id,
                &result.table,
                &result.operation_mode.as_str(),
                &to_i64(result.records_migrated),
                &to_i64(result.records_failed),
                &to_i64(result.total_extracted),
                &result.status.as_str(),
                &result.message,
                &result.masking_rules_applied,
                &i32::try_from(result.attempts).unwrap_or(i32::MAX),
                &result.started_at,
                &result.ended_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn history(&self, limit: usize) -> Result<Vec<TableRunResult>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for audit history"))?;
        let sql = format!(
            "SELECT execution_id, table_name, operation, records_migrated, records_failed,
                    total_extracted, status, message, masking_rules, attempts, started_at, ended_at
             FROM {}
             ORDER BY id DESC
             LIMIT $1",
            qualify_table(&self.table)?
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match conn.query(sql.as_str(), &[&limit]).await {
            Ok(rows) => rows,
            // Nothing has been recorded against this database yet.
            Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        rows.iter()
            .map(|row| {
                let operation: String = row.get(2);
                let status: String = row.get(6);
                let attempts: i32 = row.get(9);
                Ok(TableRunResult {
                    execution_id: row.get(0),
                    table: row.get(1),
                    operation_mode: OperationMode::parse(&operation)?,
                    records_migrated: from_i64(row.get(3)),
                    records_failed: from_i64(row.get(4)),
                    total_extracted: from_i64(row.get(5)),
                    status: RunStatus::parse(&status)?,
                    message: row.get(7),
                    masking_rules_applied: row.get(8),
                    attempts: u32::try_from(attempts).unwrap_or(0),
                    started_at: row.get::<_, DateTime<Utc>>(10),
                    ended_at: row.get::<_, DateTime<Utc>>(11),
                })
            })
            .collect()
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_i64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
