//! PostgreSQL driver.
//!
//! - [`PostgresReader`]: production source
//! - [`PostgresWriter`]: QA sink
//! - [`PgAuditStore`]: audit table in the QA database
//!
//! All three sit on a deadpool-postgres pool built by [`connect_pool`].

mod audit;
mod convert;
mod reader;
mod tls;
mod writer;

pub use audit::PgAuditStore;
pub use convert::binds_natively;
pub use reader::PostgresReader;
pub use tls::{SslMode, TlsBuilder};
pub use writer::PostgresWriter;

use std::str::FromStr;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::error::SqlState;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::core::identifier::{qualify_table, split_table_name};
use crate::core::schema::{Column, TableSchema};
use crate::environment::{MARKER_KEY, MARKER_TABLE};
use crate::error::{Result, SyncError};

/// Build a pool from a libpq connection string and test one connection.
pub async fn connect_pool(
    conn_str: &SecretString,
    max_conns: usize,
    app_name: &str,
    context: &str,
) -> Result<Pool> {
    let (ssl_mode, rest) = SslMode::split_from(conn_str.expose_secret())?;
    let mut pg_config = PgConfig::from_str(&rest)
        .map_err(|e| SyncError::Config(format!("invalid {} connection string: {}", context, e)))?;
    if pg_config.get_application_name().is_none() {
        pg_config.application_name(app_name);
    }
    pg_config.ssl_mode(if ssl_mode.requires_tls() {
        tokio_postgres::config::SslMode::Require
    } else {
        tokio_postgres::config::SslMode::Disable
    });

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let pool = match TlsBuilder::new(ssl_mode).build()? {
        None => {
            warn!(
                "PostgreSQL TLS is disabled for the {} database. Credentials will be transmitted in plaintext.",
                context
            );
            let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
            Pool::builder(mgr)
                .max_size(max_conns)
                .build()
                .map_err(|e| SyncError::pool(e, format!("creating {} pool", context)))?
        }
        Some(tls) => {
            let mgr = Manager::from_config(pg_config, tls, mgr_config);
            Pool::builder(mgr)
                .max_size(max_conns)
                .build()
                .map_err(|e| SyncError::pool(e, format!("creating {} pool", context)))?
        }
    };

    let client = pool
        .get()
        .await
        .map_err(|e| SyncError::pool(e, format!("testing {} connection", context)))?;
    client.simple_query("SELECT 1").await?;

    info!("Connected to {} database (pool size {})", context, max_conns);
    Ok(pool)
}

/// Read the `env` marker, `None` when the marker table or row is missing.
pub(crate) async fn environment_tag(pool: &Pool) -> Result<Option<String>> {
    let client = pool
        .get()
        .await
        .map_err(|e| SyncError::pool(e, "reading environment marker"))?;
    let sql = format!("SELECT value FROM {} WHERE key = $1", qualify_table(MARKER_TABLE)?);
    match client.query_opt(&sql, &[&MARKER_KEY]).await {
        Ok(row) => Ok(row.map(|r| r.get::<_, String>(0))),
        Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => {
            debug!("{} does not exist", MARKER_TABLE);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read column definitions and primary key of a table from the catalog.
pub(crate) async fn describe_table(
    client: &tokio_postgres::Client,
    table: &str,
) -> Result<TableSchema> {
    let (schema, name) = split_table_name(table);

    let columns_sql = r#"
        SELECT
            a.attname,
            format_type(a.atttypid, a.atttypmod),
            NOT a.attnotnull,
            a.attnum::int4
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class t ON t.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname = $1
          AND t.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;
    let rows = client.query(columns_sql, &[&schema, &name]).await?;
    if rows.is_empty() {
        return Err(SyncError::Config(format!("table {} does not exist", table)));
    }
    let columns = rows
        .iter()
        .map(|row| Column {
            name: row.get(0),
            data_type: row.get(1),
            is_nullable: row.get(2),
            ordinal_pos: row.get(3),
        })
        .collect();

    let pk_sql = r#"
        SELECT a.attname
        FROM pg_catalog.pg_constraint c
        JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
        WHERE n.nspname = $1
          AND t.relname = $2
          AND c.contype = 'p'
          AND a.attnum = ANY(c.conkey)
        ORDER BY array_position(c.conkey, a.attnum)
    "#;
    let primary_key = client
        .query(pk_sql, &[&schema, &name])
        .await?
        .iter()
        .map(|row| row.get::<_, String>(0))
        .collect();

    Ok(TableSchema {
        schema: schema.to_string(),
        name: name.to_string(),
        columns,
        primary_key,
    })
}
