//! Configuration type definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::masking::MaskingRule;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection secrets and expected environment tags.
    pub databases: DatabasesConfig,

    /// Secret names for masking and backup keys.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Backup output location.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Rolling report location and size.
    #[serde(default)]
    pub report: ReportConfig,

    /// Run behavior.
    #[serde(default)]
    pub settings: Settings,

    /// Tables to synchronize, processed in order.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl Config {
    /// Find a configured table by name.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Source and sink database configuration.
///
/// Connection strings never appear in the file; only the names of the
/// secrets holding them do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasesConfig {
    /// Secret holding the production connection string.
    pub source_secret: String,

    /// Secret holding the QA connection string.
    pub target_secret: String,

    /// Environment tag the source must carry (default: "production").
    #[serde(default = "default_source_environment")]
    pub source_environment: String,

    /// Environment tag the sink must carry (default: "qa").
    #[serde(default = "default_target_environment")]
    pub target_environment: String,

    /// Maximum pooled connections per database (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Names of secrets used for masking and backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret holding the salt for `hash_email` (default: "HASH_SALT").
    #[serde(default = "default_hash_salt_secret")]
    pub hash_salt_secret: String,

    /// Secret holding the hex-encoded 32-byte backup key (default: "BACKUP_KEY").
    #[serde(default = "default_backup_key_secret")]
    pub backup_key_secret: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hash_salt_secret: default_hash_salt_secret(),
            backup_key_secret: default_backup_key_secret(),
        }
    }
}

/// Backup output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory receiving encrypted backup files (default: "backups").
    #[serde(default = "default_backup_directory")]
    pub directory: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_backup_directory(),
        }
    }
}

/// Rolling report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report file path (default: "logs/execution_report.json").
    #[serde(default = "default_report_path")]
    pub path: PathBuf,

    /// Maximum number of events kept (default: 50).
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            max_events: default_max_events(),
        }
    }
}

/// Run behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Rows per delete chunk and upper bound for rows per insert (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Days of history extracted on a full load with a filter column (default: 90).
    /// Zero disables the window.
    #[serde(default = "default_extraction_window_days")]
    pub extraction_window_days: u32,

    /// Retry failed tables (default: true).
    #[serde(default = "default_true")]
    pub retry_enabled: bool,

    /// Attempts per table when retries are enabled (default: 3).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts in seconds (default: 5).
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Append events to the rolling report (default: true).
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,

    /// Days an event stays in the rolling report (default: 30).
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// Application name reported to PostgreSQL (default: "datamask-sync").
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Fixed seed for sampling. When unset, each run and table draws a
    /// different sample derived from the execution id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            extraction_window_days: default_extraction_window_days(),
            retry_enabled: true,
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            notifications_enabled: true,
            log_retention_days: default_log_retention_days(),
            app_name: default_app_name(),
            sample_seed: None,
        }
    }
}

/// One table to synchronize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name, optionally schema-qualified.
    pub name: String,

    /// Primary key column.
    pub pk: String,

    /// Column used for the extraction window and watermark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_column: Option<String>,

    /// Masking rule per column.
    #[serde(default)]
    pub masking_rules: BTreeMap<String, MaskingRule>,

    /// Percentage of extracted rows to load, in (0, 100] (default: 100).
    #[serde(default = "default_sample_percent")]
    pub sample_percent: f64,

    /// Include the table in runs that do not name it (default: true).
    #[serde(default = "default_true")]
    pub active: bool,
}

// Default value functions for serde
fn default_source_environment() -> String {
    "production".to_string()
}

fn default_target_environment() -> String {
    "qa".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_hash_salt_secret() -> String {
    "HASH_SALT".to_string()
}

fn default_backup_key_secret() -> String {
    "BACKUP_KEY".to_string()
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from("backups")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("logs/execution_report.json")
}

fn default_max_events() -> usize {
    50
}

fn default_batch_size() -> usize {
    500
}

fn default_extraction_window_days() -> u32 {
    90
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_log_retention_days() -> u32 {
    30
}

fn default_app_name() -> String {
    "datamask-sync".to_string()
}

fn default_sample_percent() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}
