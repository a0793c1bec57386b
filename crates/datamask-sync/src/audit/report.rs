//! Rolling JSON execution report.
//!
//! A small file the operator dashboard polls: a JSON array of the most recent
//! table events, newest first, bounded by count and age.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::run::{OperationMode, RunStatus, TableRunResult};
use crate::error::Result;

/// One entry of the rolling report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    pub table: String,
    pub operation: OperationMode,
    pub status: RunStatus,
    pub records_migrated: u64,
    pub records_failed: u64,
    pub message: String,
}

impl From<&TableRunResult> for ReportEvent {
    fn from(r: &TableRunResult) -> Self {
        Self {
            timestamp: r.ended_at,
            execution_id: r.execution_id.clone(),
            table: r.table.clone(),
            operation: r.operation_mode,
            status: r.status,
            records_migrated: r.records_migrated,
            records_failed: r.records_failed,
            message: r.message.clone(),
        }
    }
}

/// Bounded report file.
#[derive(Debug, Clone)]
pub struct RollingReport {
    path: PathBuf,
    max_events: usize,
    retention: Duration,
}

impl RollingReport {
    pub fn new(path: impl Into<PathBuf>, max_events: usize, retention_days: u32) -> Self {
        Self {
            path: path.into(),
            max_events: max_events.max(1),
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current events. A missing file is an empty report; an
    /// unreadable one is logged and treated as empty.
    pub fn load(&self) -> Vec<ReportEvent> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    "Rolling report {} is not valid JSON ({}); starting a new one",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Prepend an event, prune by count and age, and rewrite the file.
    pub fn append(&self, event: ReportEvent) -> Result<()> {
        self.append_at(event, Utc::now())
    }

    fn append_at(&self, event: ReportEvent, now: DateTime<Utc>) -> Result<()> {
        let mut events = self.load();
        events.insert(0, event);

        let cutoff = now - self.retention;
        events.retain(|e| e.timestamp >= cutoff);
        events.truncate(self.max_events);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Atomic write: write to temp file, then rename
        let content = serde_json::to_string_pretty(&events)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
