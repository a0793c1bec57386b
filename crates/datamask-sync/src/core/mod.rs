//! Core types shared by the engine and the database drivers.
//!
//! - [`value`]: owned SQL values and extracted row sets
//! - [`schema`]: table metadata and primary key arrays
//! - [`run`]: execution identity and per-table results
//! - [`traits`]: source, sink and environment probe traits
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod run;
pub mod schema;
pub mod traits;
pub mod value;

pub use run::{ExecutionContext, OperationMode, RunReport, RunStatus, TableRunResult};
pub use schema::{Column, PkArray, PkValue, TableSchema};
pub use traits::{
    EnvironmentProbe, ExtractFilter, ExtractQuery, LoadRequest, LoadStats, SourceReader,
    TargetWriter,
};
pub use value::{RowSet, SqlNullType, SqlValue};
