//! Run identity and per-table outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Identity of one run, shared by every table processed in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// UUID v4 string.
    pub execution_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Start a new run.
    pub fn new() -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// How a table's rows were selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    /// No watermark; windowed or complete extraction.
    Full,
    /// Rows after the sink's watermark.
    Incremental,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::Full => "FULL",
            OperationMode::Incremental => "INCREMENTAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "FULL" => Ok(OperationMode::Full),
            "INCREMENTAL" => Ok(OperationMode::Incremental),
            _ => Err(SyncError::Config(format!("Invalid operation mode: {}", s))),
        }
    }
}

/// Final status of a table in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "SUCCESS" => Ok(RunStatus::Success),
            "ERROR" => Ok(RunStatus::Error),
            _ => Err(SyncError::Config(format!("Invalid run status: {}", s))),
        }
    }
}

/// Outcome of one table in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRunResult {
    pub execution_id: String,
    pub table: String,
    pub operation_mode: OperationMode,

    /// Rows committed to the sink.
    pub records_migrated: u64,

    /// Rows of a batch that was rolled back.
    pub records_failed: u64,

    /// Rows extracted before sampling.
    pub total_extracted: u64,

    pub status: RunStatus,
    pub message: String,

    /// Masking rules applied, serialized as JSON.
    pub masking_rules_applied: String,

    /// Attempts made by the retry controller.
    pub attempts: u32,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TableRunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Duration of the table's processing in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Summary of one run across all processed tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<TableRunResult>,
}

impl RunReport {
    /// Tables that completed successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = &TableRunResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Tables that ended in error.
    pub fn failed(&self) -> impl Iterator<Item = &TableRunResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Some tables succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        self.succeeded().next().is_some() && self.failed().next().is_some()
    }

    /// Every processed table succeeded.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Rows committed across all tables.
    pub fn records_migrated(&self) -> u64 {
        self.results.iter().map(|r| r.records_migrated).sum()
    }
}
