//! Audit trail of table outcomes.
//!
//! Every table result goes to a durable [`AuditStore`] and, when
//! notifications are enabled, to the [`RollingReport`]. Audit writes are
//! best effort: a failure is logged and never changes the table's result.

mod report;

pub use report::{ReportEvent, RollingReport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::run::TableRunResult;
use crate::error::{Result, SyncError};

/// Audit table in the QA database.
pub const AUDIT_TABLE: &str = "datamask_audit";

/// Maximum stored message length, in characters.
pub const MESSAGE_MAX_LEN: usize = 500;

/// Durable storage for table results.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Create the audit table if needed. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Append one result.
    async fn record(&self, result: &TableRunResult) -> Result<()>;

    /// Most recent results, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<TableRunResult>>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

/// Fans a result out to the store and the rolling report.
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
    report: Option<RollingReport>,
    schema_ready: AtomicBool,
}

impl AuditSink {
    /// `report` is `None` when notifications are disabled.
    pub fn new(store: Arc<dyn AuditStore>, report: Option<RollingReport>) -> Self {
        Self {
            store,
            report,
            schema_ready: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Create the audit schema unless an earlier call already did.
    ///
    /// A failure is logged and retried on the next call.
    pub async fn ensure_schema(&self) {
        if self.schema_ready.load(Ordering::SeqCst) {
            return;
        }
        match self.store.init_schema().await {
            Ok(()) => {
                self.schema_ready.store(true, Ordering::SeqCst);
                debug!("Audit schema ready");
            }
            Err(e) => {
                let e = SyncError::AuditWrite(format!(
                    "{} schema: {}",
                    self.store.backend_type(),
                    e
                ));
                warn!("{}", e);
            }
        }
    }

    /// Record a result in both sinks, logging failures.
    pub async fn record(&self, result: &TableRunResult) {
        let mut stored = result.clone();
        stored.message = truncate_message(&result.message);

        self.ensure_schema().await;
        if let Err(e) = self.store.record(&stored).await {
            let e = SyncError::AuditWrite(format!("{}: {}", self.store.backend_type(), e));
            warn!("{}: {}", result.table, e);
        } else {
            debug!("{}: audit entry written", result.table);
        }

        if let Some(report) = &self.report {
            if let Err(e) = report.append(ReportEvent::from(&stored)) {
                let e = SyncError::AuditWrite(format!("report {}: {}", report.path().display(), e));
                warn!("{}: {}", result.table, e);
            }
        }
    }

    /// Most recent stored results, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<TableRunResult>> {
        self.store.history(limit).await
    }
}

/// Cut a message to [`MESSAGE_MAX_LEN`] characters.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MESSAGE_MAX_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
