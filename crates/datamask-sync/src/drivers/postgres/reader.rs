//! PostgreSQL source reader.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use secrecy::SecretString;
use tokio_postgres::types::ToSql;
use tracing::debug;

use super::convert::{binds_natively, row_values};
use crate::config::DatabasesConfig;
use crate::core::identifier::{qualify_table, quote_pg};
use crate::core::schema::TableSchema;
use crate::core::traits::{EnvironmentProbe, ExtractFilter, ExtractQuery, SourceReader};
use crate::core::value::RowSet;
use crate::error::{Result, SyncError};

/// Reads rows and catalog metadata from the production database.
pub struct PostgresReader {
    pool: Pool,
}

impl PostgresReader {
    /// Connect using the source connection string.
    pub async fn connect(
        conn_str: &SecretString,
        config: &DatabasesConfig,
        app_name: &str,
    ) -> Result<Self> {
        let pool =
            super::connect_pool(conn_str, config.max_connections, app_name, "source").await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Build the extraction SELECT for a table's columns.
///
/// Columns without a binary mapping are selected as text. Rows are ordered
/// by primary key so backups and samples are stable.
pub(crate) fn build_select(schema: &TableSchema, query: &ExtractQuery) -> Result<String> {
    let mut select_list = Vec::with_capacity(schema.columns.len());
    for col in &schema.columns {
        let quoted = quote_pg(&col.name)?;
        if binds_natively(&col.data_type) {
            select_list.push(quoted);
        } else {
            select_list.push(format!("{}::text AS {}", quoted, quoted));
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list.join(", "),
        qualify_table(&query.table)?
    );
    match &query.filter {
        ExtractFilter::All => {}
        ExtractFilter::Window { column, .. } => {
            sql.push_str(&format!(
                " WHERE {} >= NOW() - make_interval(days => $1)",
                quote_pg(column)?
            ));
        }
        ExtractFilter::After { column, .. } => {
            sql.push_str(&format!(" WHERE {} > $1", quote_pg(column)?));
        }
    }
    sql.push_str(&format!(" ORDER BY {}", quote_pg(&query.pk_column)?));
    Ok(sql)
}

#[async_trait]
impl EnvironmentProbe for PostgresReader {
    async fn environment_tag(&self) -> Result<Option<String>> {
        super::environment_tag(&self.pool).await
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    async fn extract(&self, query: &ExtractQuery) -> Result<RowSet> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for extract"))?;

        let schema = super::describe_table(&client, &query.table).await?;
        let sql = build_select(&schema, query)?;
        debug!("{}: {}", query.table, sql);

        let days: i32;
        let params: Vec<&(dyn ToSql + Sync)> = match &query.filter {
            ExtractFilter::All => Vec::new(),
            ExtractFilter::Window { days: d, .. } => {
                days = i32::try_from(*d).unwrap_or(i32::MAX);
                vec![&days as &(dyn ToSql + Sync)]
            }
            ExtractFilter::After { watermark, .. } => vec![watermark as &(dyn ToSql + Sync)],
        };

        let rows = client.query(sql.as_str(), &params).await?;
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => schema.columns.iter().map(|c| c.name.clone()).collect(),
        };
        let rows = rows
            .iter()
            .map(row_values)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyncError::extraction(&query.table, e))?;
        Ok(RowSet::new(columns, rows))
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "getting connection for describe_table"))?;
        super::describe_table(&client, table).await
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}
