//! In-memory databases for engine tests.
//!
//! `MemoryDb` plays the production source, the QA sink and the audit store.
//! Failure injection and write counters let tests assert what reached the
//! sink without a PostgreSQL server.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use parking_lot::Mutex;

use datamask_sync::audit::AuditStore;
use datamask_sync::core::schema::{Column, TableSchema};
use datamask_sync::core::traits::{
    EnvironmentProbe, ExtractFilter, ExtractQuery, LoadRequest, LoadStats, SourceReader,
    TargetWriter,
};
use datamask_sync::core::SqlNullType;
use datamask_sync::{Result, RowSet, SqlValue, SyncError, TableRunResult};

pub const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
pub const SALT: &str = "test-salt";

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Vec<SqlValue>>,
}

impl MemTable {
    fn columns(&self) -> Vec<String> {
        self.schema.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.schema
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }
}

#[derive(Default)]
struct State {
    environment: Option<String>,
    tables: BTreeMap<String, MemTable>,
    failing_loads: HashMap<String, u32>,
    failing_extracts: HashSet<String>,
    loads: u32,
    audit_inits: u32,
    failing_audit_inits: u32,
    failing_audit_records: bool,
    audit: Vec<TableRunResult>,
}

/// One in-memory database.
#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

impl MemoryDb {
    pub fn new(environment: Option<&str>) -> Self {
        let db = Self::default();
        db.state.lock().environment = environment.map(str::to_string);
        db
    }

    /// Create a table; the first column is the primary key.
    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) {
        let schema = TableSchema {
            schema: "public".into(),
            name: name.into(),
            columns: columns
                .iter()
                .enumerate()
                .map(|(i, (col, ty))| Column {
                    name: col.to_string(),
                    data_type: ty.to_string(),
                    is_nullable: i > 0,
                    ordinal_pos: i as i32 + 1,
                })
                .collect(),
            primary_key: vec![columns[0].0.to_string()],
        };
        self.state.lock().tables.insert(
            name.to_string(),
            MemTable {
                schema,
                rows: Vec::new(),
            },
        );
    }

    pub fn insert(&self, table: &str, row: Vec<SqlValue>) {
        let mut state = self.state.lock();
        let t = state.tables.get_mut(table).expect("table exists");
        assert_eq!(row.len(), t.schema.columns.len(), "row width");
        t.rows.push(row);
    }

    /// Rows of a table ordered by primary key.
    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        let state = self.state.lock();
        let mut rows = state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default();
        rows.sort_by(|a, b| a[0].compare(&b[0]).unwrap_or(Ordering::Equal));
        rows
    }

    pub fn column(&self, table: &str, column: &str) -> Vec<SqlValue> {
        let idx = {
            let state = self.state.lock();
            state.tables[table].index(column).expect("column exists")
        };
        self.rows(table).into_iter().map(|r| r[idx].clone()).collect()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn environment(&self) -> Option<String> {
        self.state.lock().environment.clone()
    }

    /// Fail the next `times` loads into `table`.
    pub fn fail_loads(&self, table: &str, times: u32) {
        self.state.lock().failing_loads.insert(table.to_string(), times);
    }

    pub fn fail_extracts(&self, table: &str) {
        self.state.lock().failing_extracts.insert(table.to_string());
    }

    /// Load calls received, including failed ones.
    pub fn load_calls(&self) -> u32 {
        self.state.lock().loads
    }

    /// Fail the next `times` audit schema setups.
    pub fn fail_audit_inits(&self, times: u32) {
        self.state.lock().failing_audit_inits = times;
    }

    /// Fail every audit record from now on.
    pub fn fail_audit_records(&self) {
        self.state.lock().failing_audit_records = true;
    }

    /// Audit schema setup calls received, including failed ones.
    pub fn audit_inits(&self) -> u32 {
        self.state.lock().audit_inits
    }

    pub fn audit_entries(&self) -> Vec<TableRunResult> {
        self.state.lock().audit.clone()
    }
}

fn matches_filter(table: &MemTable, row: &[SqlValue], filter: &ExtractFilter) -> bool {
    match filter {
        ExtractFilter::All => true,
        ExtractFilter::Window { column, days } => {
            let Some(idx) = table.index(column) else {
                return false;
            };
            let cutoff: NaiveDateTime = (Utc::now() - Duration::days(i64::from(*days))).naive_utc();
            matches!(
                row[idx].compare(&SqlValue::DateTime(cutoff)),
                Some(Ordering::Greater | Ordering::Equal)
            )
        }
        ExtractFilter::After { column, watermark } => {
            let Some(idx) = table.index(column) else {
                return false;
            };
            row[idx].compare(watermark) == Some(Ordering::Greater)
        }
    }
}

#[async_trait]
impl EnvironmentProbe for MemoryDb {
    async fn environment_tag(&self) -> Result<Option<String>> {
        Ok(self.environment())
    }
}

#[async_trait]
impl SourceReader for MemoryDb {
    async fn extract(&self, query: &ExtractQuery) -> Result<RowSet> {
        let state = self.state.lock();
        if state.failing_extracts.contains(&query.table) {
            return Err(SyncError::extraction(&query.table, "connection reset"));
        }
        let table = state
            .tables
            .get(&query.table)
            .ok_or_else(|| SyncError::Config(format!("table {} does not exist", query.table)))?;
        let pk = table
            .index(&query.pk_column)
            .ok_or_else(|| SyncError::SchemaMismatch {
                table: query.table.clone(),
                column: query.pk_column.clone(),
            })?;
        let mut rows: Vec<Vec<SqlValue>> = table
            .rows
            .iter()
            .filter(|r| matches_filter(table, r, &query.filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a[pk].compare(&b[pk]).unwrap_or(Ordering::Equal));
        Ok(RowSet::new(table.columns(), rows))
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| SyncError::Config(format!("table {} does not exist", table)))
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl TargetWriter for MemoryDb {
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<SqlValue>> {
        let state = self.state.lock();
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::Config(format!("table {} does not exist", table)))?;
        let idx = t.index(column).ok_or_else(|| SyncError::SchemaMismatch {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        Ok(t.rows
            .iter()
            .map(|r| &r[idx])
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal))
            .cloned())
    }

    async fn load(&self, request: LoadRequest<'_>) -> Result<LoadStats> {
        let mut state = self.state.lock();
        state.loads += 1;

        if let Some(remaining) = state.failing_loads.get_mut(request.table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::load(request.table, 0, "deadlock detected"));
            }
        }

        let t = state
            .tables
            .get_mut(request.table)
            .ok_or_else(|| SyncError::Config(format!("table {} does not exist", request.table)))?;
        let sink_pk = t.index(request.pk_column).ok_or_else(|| SyncError::SchemaMismatch {
            table: request.table.to_string(),
            column: request.pk_column.to_string(),
        })?;
        let batch_pk = request
            .rows
            .column_index(request.pk_column)
            .ok_or_else(|| SyncError::SchemaMismatch {
                table: request.table.to_string(),
                column: request.pk_column.to_string(),
            })?;

        // Map batch columns onto sink positions before touching any row.
        let positions = request
            .rows
            .columns
            .iter()
            .map(|c| {
                t.index(c).ok_or_else(|| SyncError::SchemaMismatch {
                    table: request.table.to_string(),
                    column: c.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let keys: Vec<&SqlValue> = request.rows.rows.iter().map(|r| &r[batch_pk]).collect();
        let before = t.rows.len();
        t.rows.retain(|r| {
            !keys
                .iter()
                .any(|k| r[sink_pk].compare(k) == Some(Ordering::Equal))
        });
        let rows_deleted = (before - t.rows.len()) as u64;

        let width = t.schema.columns.len();
        for row in &request.rows.rows {
            let mut stored = vec![SqlValue::Null(SqlNullType::String); width];
            for (value, &pos) in row.iter().zip(&positions) {
                stored[pos] = value.clone();
            }
            t.rows.push(stored);
        }

        if let Some(mark) = request.environment_mark {
            state.environment.get_or_insert_with(|| mark.to_string());
        }

        Ok(LoadStats {
            rows_deleted,
            rows_inserted: request.rows.len() as u64,
        })
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl AuditStore for MemoryDb {
    async fn init_schema(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.audit_inits += 1;
        if state.failing_audit_inits > 0 {
            state.failing_audit_inits -= 1;
            return Err(SyncError::AuditWrite(
                "permission denied for schema public".into(),
            ));
        }
        Ok(())
    }

    async fn record(&self, result: &TableRunResult) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_audit_records {
            return Err(SyncError::AuditWrite("audit table is read-only".into()));
        }
        state.audit.push(result.clone());
        Ok(())
    }

    async fn history(&self, limit: usize) -> Result<Vec<TableRunResult>> {
        Ok(self
            .state
            .lock()
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
