//! PostgreSQL QA sink writer.
//!
//! A load is one transaction: advisory lock on the table, foreign key
//! triggers relaxed with `SET LOCAL`, delete of the batch's keys, chunked
//! multi-row INSERTs, the optional environment marker, commit.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use secrecy::SecretString;
use tokio_postgres::types::ToSql;
use tracing::{debug, info};

use super::convert::{binds_natively, column_value};
use crate::config::DatabasesConfig;
use crate::core::identifier::{qualify_table, quote_pg};
use crate::core::schema::{PkArray, PkValue, TableSchema};
use crate::core::traits::{EnvironmentProbe, LoadRequest, LoadStats, TargetWriter};
use crate::core::value::SqlValue;
use crate::environment::{MARKER_KEY, MARKER_TABLE};
use crate::error::{Result, SyncError};

/// PostgreSQL bind parameter limit per statement.
pub const MAX_BIND_PARAMS: usize = 65535;

/// Writes masked batches into the QA database.
pub struct PostgresWriter {
    pool: Pool,
}

impl PostgresWriter {
    /// Connect using the target connection string.
    pub async fn connect(
        conn_str: &SecretString,
        config: &DatabasesConfig,
        app_name: &str,
    ) -> Result<Self> {
        let pool =
            super::connect_pool(conn_str, config.max_connections, app_name, "target").await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool, shared with the audit store.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// Rows per INSERT statement for a column count.
pub fn insert_chunk_rows(batch_size: usize, column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).min(batch_size).max(1)
}

/// Placeholder casts for each loaded column, from the sink's catalog.
///
/// Columns the driver cannot encode in binary are bound as text and cast
/// server side.
fn placeholder_casts(table: &str, sink: &TableSchema, columns: &[String]) -> Result<Vec<String>> {
    columns
        .iter()
        .map(|name| {
            let col = sink
                .columns
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| SyncError::SchemaMismatch {
                    table: table.to_string(),
                    column: name.clone(),
                })?;
            Ok(if binds_natively(&col.data_type) {
                String::new()
            } else {
                format!("::text::{}", col.data_type)
            })
        })
        .collect()
}

/// `INSERT INTO t (cols) VALUES ($1, $2), ($3, $4)...` for `row_count` rows.
fn build_insert_sql(
    qualified: &str,
    quoted_columns: &[String],
    casts: &[String],
    row_count: usize,
) -> String {
    let cols = quoted_columns.len();
    let mut placeholders = Vec::with_capacity(row_count);
    for r in 0..row_count {
        let row: Vec<String> = casts
            .iter()
            .enumerate()
            .map(|(c, cast)| format!("${}{}", r * cols + c + 1, cast))
            .collect();
        placeholders.push(format!("({})", row.join(", ")));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified,
        quoted_columns.join(", "),
        placeholders.join(", ")
    )
}

fn build_delete_sql(qualified: &str, quoted_pk: &str, keys: &PkArray) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ANY($1::{})",
        qualified,
        quoted_pk,
        keys.sql_cast()
    )
}

#[async_trait]
impl EnvironmentProbe for PostgresWriter {
    async fn environment_tag(&self) -> Result<Option<String>> {
        super::environment_tag(&self.pool).await
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<SqlValue>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for max_value"))?;
        let sql = format!("SELECT MAX({}) FROM {}", quote_pg(column)?, qualify_table(table)?);
        let row = client.query_one(sql.as_str(), &[]).await?;
        let value = column_value(&row, 0).map_err(|e| SyncError::extraction(table, e))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn load(&self, req: LoadRequest<'_>) -> Result<LoadStats> {
        let rows = req.rows;
        let batch_rows = rows.len() as u64;
        if rows.is_empty() && req.environment_mark.is_none() {
            return Ok(LoadStats::default());
        }

        let qualified = qualify_table(req.table)?;
        let quoted_pk = quote_pg(req.pk_column)?;
        let quoted_columns = rows
            .columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?;

        let pk_idx = rows
            .column_index(req.pk_column)
            .ok_or_else(|| SyncError::SchemaMismatch {
                table: req.table.to_string(),
                column: req.pk_column.to_string(),
            })?;
        let keys = rows
            .rows
            .iter()
            .map(|row| PkValue::from_sql(req.table, &row[pk_idx]))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| SyncError::load(req.table, batch_rows, e))?;
        let keys = PkArray::from_keys(req.table, &keys)?;

        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for load"))?;

        let sink_schema = super::describe_table(&client, req.table).await?;
        let casts = placeholder_casts(req.table, &sink_schema, &rows.columns)?;

        let tx = client.transaction().await?;
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&req.table])
            .await?;
        tx.batch_execute("SET LOCAL session_replication_role = replica")
            .await?;

        let mut stats = LoadStats::default();
        for chunk in keys.chunks(req.batch_size) {
            if chunk.is_empty() {
                continue;
            }
            let sql = build_delete_sql(&qualified, &quoted_pk, &chunk);
            let deleted = match &chunk {
                PkArray::Int(v) => tx.execute(sql.as_str(), &[v]).await?,
                PkArray::Uuid(v) => tx.execute(sql.as_str(), &[v]).await?,
                PkArray::Text(v) => tx.execute(sql.as_str(), &[v]).await?,
            };
            stats.rows_deleted += deleted;
        }
        debug!("{}: deleted {} existing rows", req.table, stats.rows_deleted);

        let chunk_rows = insert_chunk_rows(req.batch_size, rows.columns.len());
        for chunk in rows.rows.chunks(chunk_rows) {
            let sql = build_insert_sql(&qualified, &quoted_columns, &casts, chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            stats.rows_inserted += tx.execute(sql.as_str(), &params).await?;
        }

        if let Some(environment) = req.environment_mark {
            let marker = qualify_table(MARKER_TABLE)?;
            tx.batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                marker
            ))
            .await?;
            let inserted = tx
                .execute(
                    format!(
                        "INSERT INTO {} (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
                        marker
                    )
                    .as_str(),
                    &[&MARKER_KEY, &environment],
                )
                .await?;
            if inserted > 0 {
                info!("Marked target database as '{}'", environment);
            }
        }

        tx.batch_execute("SET LOCAL session_replication_role = origin")
            .await?;
        tx.commit().await?;
        Ok(stats)
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}
