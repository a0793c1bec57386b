//! # datamask-sync
//!
//! Production to QA PostgreSQL synchronization with column masking.
//!
//! This library provides the core functionality for refreshing a QA database
//! from production with support for:
//!
//! - **Column masking** (salted email hashing, fake names, format-preserving
//!   scrambling, redaction)
//! - **Incremental loads** driven by a watermark read from the QA copy
//! - **Idempotent batches** (delete-then-insert by primary key in one transaction)
//! - **Environment markers** that refuse to run against swapped databases
//! - **Bounded retries** per table with an audit trail and rolling report
//! - **Encrypted backups** of the source tables (AES-256-GCM)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datamask_sync::{Config, EnvSecrets, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> datamask_sync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = SyncEngine::connect(config, Arc::new(EnvSecrets)).await?;
//!     let report = engine.run(None, None).await?;
//!     println!("Migrated {} rows", report.records_migrated());
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod backup;
pub mod config;
pub mod core;
pub mod drivers;
pub mod environment;
pub mod error;
pub mod lock;
pub mod masking;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod watermark;

// Re-exports for convenient access
pub use audit::{AuditSink, AuditStore, ReportEvent, RollingReport};
pub use backup::{BackupCipher, BackupService};
pub use config::{Config, EnvSecrets, SecretProvider, Settings, StaticSecrets, TableSpec};
pub use crate::core::{
    ExecutionContext, OperationMode, RowSet, RunReport, RunStatus, SqlValue, TableRunResult,
};
pub use error::{Result, SyncError};
pub use lock::{TableLease, TableLocks};
pub use masking::{Masker, MaskingRule};
pub use orchestrator::{restore_backup, SyncEngine};
pub use retry::{RetryController, RetryOutcome, RetryPolicy, RetryState};
