//! Core traits for the source and sink databases.
//!
//! - [`EnvironmentProbe`]: reads the environment marker of a database
//! - [`SourceReader`]: extracts rows and catalog metadata from production
//! - [`TargetWriter`]: reads watermarks from and loads batches into QA
//!
//! The engine only talks to databases through these traits, so it runs
//! unchanged against PostgreSQL pools or in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::TableSchema;
use super::value::{RowSet, SqlValue};

/// Row filter applied during extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractFilter {
    /// Every row of the table.
    All,

    /// Rows whose column is within the last `days` days.
    Window { column: String, days: u32 },

    /// Rows whose column is strictly greater than the watermark.
    After { column: String, watermark: SqlValue },
}

/// What to extract from one source table.
#[derive(Debug, Clone)]
pub struct ExtractQuery {
    /// Configured table name (optionally schema-qualified).
    pub table: String,

    /// Primary key column, used for a stable row order.
    pub pk_column: String,

    /// Row filter.
    pub filter: ExtractFilter,
}

/// One batch to be written into a sink table.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    /// Configured table name.
    pub table: &'a str,

    /// Primary key column; existing rows with the batch's keys are replaced.
    pub pk_column: &'a str,

    /// Masked rows to insert.
    pub rows: &'a RowSet,

    /// Rows per delete chunk and upper bound for rows per insert statement.
    pub batch_size: usize,

    /// Environment value to mark the sink with inside the load transaction.
    /// `None` when the sink is already marked.
    pub environment_mark: Option<&'a str>,
}

/// Row counts reported by a committed load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Existing rows removed because their key was reinserted.
    pub rows_deleted: u64,

    /// Rows inserted.
    pub rows_inserted: u64,
}

/// Read the environment marker of a database.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Value of the `env` marker, `None` if the database is unmarked.
    async fn environment_tag(&self) -> Result<Option<String>>;
}

/// Read data from the production database.
#[async_trait]
pub trait SourceReader: EnvironmentProbe {
    /// Extract every row matching the query into memory.
    async fn extract(&self, query: &ExtractQuery) -> Result<RowSet>;

    /// Read column definitions and primary key from the catalog.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Get the database type identifier (e.g. "postgres").
    fn db_type(&self) -> &str;
}

/// Write data into the QA database.
#[async_trait]
pub trait TargetWriter: EnvironmentProbe {
    /// `MAX(column)` of a sink table, `None` when the table is empty.
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<SqlValue>>;

    /// Replace the batch's keys and insert its rows in one transaction.
    ///
    /// Either every row is committed or none is.
    async fn load(&self, request: LoadRequest<'_>) -> Result<LoadStats>;

    /// Get the database type identifier (e.g. "postgres").
    fn db_type(&self) -> &str;
}
