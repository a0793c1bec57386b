//! Schema metadata and primary key types.

use serde::{Deserialize, Serialize};
use std::hash::Hash;
use uuid::Uuid;

use super::value::SqlValue;
use crate::error::{Result, SyncError};

/// Represents a primary key value of various types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PkValue {
    /// Integer primary key (smallint, int, bigint).
    Int(i64),
    /// UUID primary key.
    Uuid(Uuid),
    /// String primary key (text, varchar, char).
    String(String),
}

impl PkValue {
    /// Extract a primary key from a row value.
    ///
    /// NULL keys and key types that cannot be bound as a typed array are
    /// rejected as load errors, since the delete-then-insert would otherwise
    /// be unable to find the rows it replaces.
    pub fn from_sql(table: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::I16(v) => Ok(PkValue::Int(i64::from(*v))),
            SqlValue::I32(v) => Ok(PkValue::Int(i64::from(*v))),
            SqlValue::I64(v) => Ok(PkValue::Int(*v)),
            SqlValue::Uuid(v) => Ok(PkValue::Uuid(*v)),
            SqlValue::Text(v) => Ok(PkValue::String(v.clone())),
            SqlValue::Null(_) => Err(SyncError::load(table, 0, "NULL primary key value")),
            other => Err(SyncError::load(
                table,
                0,
                format!("unsupported primary key type {:?}", other.null_type()),
            )),
        }
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<Uuid> for PkValue {
    fn from(v: Uuid) -> Self {
        PkValue::Uuid(v)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::String(v.to_string())
    }
}

/// Primary keys of one batch, grouped into a single typed array so they can
/// be bound as one `= ANY($1)` parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum PkArray {
    Int(Vec<i64>),
    Uuid(Vec<Uuid>),
    Text(Vec<String>),
}

impl PkArray {
    /// Group key values, requiring all of them to share one type.
    pub fn from_keys(table: &str, keys: &[PkValue]) -> Result<Self> {
        let mismatch = || SyncError::load(table, 0, "primary key values have mixed types");
        let Some(first) = keys.first() else {
            return Ok(PkArray::Int(Vec::new()));
        };
        match first {
            PkValue::Int(_) => keys
                .iter()
                .map(|k| match k {
                    PkValue::Int(v) => Ok(*v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(PkArray::Int),
            PkValue::Uuid(_) => keys
                .iter()
                .map(|k| match k {
                    PkValue::Uuid(v) => Ok(*v),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(PkArray::Uuid),
            PkValue::String(_) => keys
                .iter()
                .map(|k| match k {
                    PkValue::String(v) => Ok(v.clone()),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()
                .map(PkArray::Text),
        }
    }

    /// SQL array cast for the bound parameter.
    pub fn sql_cast(&self) -> &'static str {
        match self {
            PkArray::Int(_) => "bigint[]",
            PkArray::Uuid(_) => "uuid[]",
            PkArray::Text(_) => "text[]",
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        match self {
            PkArray::Int(v) => v.len(),
            PkArray::Uuid(v) => v.len(),
            PkArray::Text(v) => v.len(),
        }
    }

    /// Check if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into arrays of at most `size` keys.
    pub fn chunks(&self, size: usize) -> Vec<PkArray> {
        let size = size.max(1);
        match self {
            PkArray::Int(v) => v.chunks(size).map(|c| PkArray::Int(c.to_vec())).collect(),
            PkArray::Uuid(v) => v.chunks(size).map(|c| PkArray::Uuid(c.to_vec())).collect(),
            PkArray::Text(v) => v.chunks(size).map(|c| PkArray::Text(c.to_vec())).collect(),
        }
    }
}

/// Table metadata read from the source catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions, in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Rendered data type (e.g. "integer", "character varying(100)").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}
