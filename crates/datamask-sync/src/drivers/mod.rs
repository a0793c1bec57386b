//! Database driver implementations of the core traits.
//!
//! - [`postgres`]: production source, QA sink and audit store on
//!   tokio-postgres / deadpool-postgres

pub mod postgres;

pub use postgres::{
    connect_pool, PgAuditStore, PostgresReader, PostgresWriter, SslMode, TlsBuilder,
};
