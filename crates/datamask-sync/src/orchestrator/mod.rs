//! Sync engine - main workflow coordinator.
//!
//! The engine owns the configuration, the source and sink handles, the
//! masker and the audit sink. A run validates both environments once,
//! then moves the selected tables one at a time under the retry
//! controller and records every outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditSink, AuditStore, RollingReport};
use crate::backup::{BackupCipher, BackupService};
use crate::config::{validate_sample_percent, Config, SecretProvider, TableSpec};
use crate::core::run::{ExecutionContext, OperationMode, RunReport, RunStatus, TableRunResult};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::{PgAuditStore, PostgresReader, PostgresWriter};
use crate::environment::{self, DatabaseRole, EnvironmentStatus};
use crate::error::{Result, SyncError};
use crate::lock::TableLocks;
use crate::masking::{rules_to_json, Masker};
use crate::pipeline::{TableLoad, TablePipeline, TablePlan};
use crate::retry::{RetryController, RetryOutcome, RetryPolicy};

/// Production to QA synchronization engine.
pub struct SyncEngine {
    config: Config,
    secrets: Arc<dyn SecretProvider>,
    source: Arc<dyn SourceReader>,
    sink: Arc<dyn TargetWriter>,
    audit: AuditSink,
    masker: Masker,
    locks: TableLocks,

    /// Set once both environments have been validated.
    ready: OnceCell<()>,

    /// The sink had no marker; the next load writes it.
    sink_unmarked: AtomicBool,
}

impl SyncEngine {
    /// Connect to both PostgreSQL databases and build the engine.
    pub async fn connect(config: Config, secrets: Arc<dyn SecretProvider>) -> Result<Self> {
        let source_dsn = secrets.get(&config.databases.source_secret)?;
        let target_dsn = secrets.get(&config.databases.target_secret)?;
        let app_name = config.settings.app_name.clone();

        let source = PostgresReader::connect(&source_dsn, &config.databases, &app_name).await?;
        let sink = PostgresWriter::connect(&target_dsn, &config.databases, &app_name).await?;
        let audit = PgAuditStore::new(sink.pool().clone());

        Self::new(
            config,
            Arc::new(source),
            Arc::new(sink),
            Arc::new(audit),
            secrets,
        )
    }

    /// Build an engine over existing source, sink and audit handles.
    ///
    /// Fails with a configuration error when the hash salt secret is missing.
    pub fn new(
        config: Config,
        source: Arc<dyn SourceReader>,
        sink: Arc<dyn TargetWriter>,
        audit_store: Arc<dyn AuditStore>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let masker = Masker::new(secrets.get(&config.security.hash_salt_secret)?);

        let report = config.settings.notifications_enabled.then(|| {
            RollingReport::new(
                &config.report.path,
                config.report.max_events,
                config.settings.log_retention_days,
            )
        });

        info!(
            "Engine ready: {} configured tables, source={}, target={}, audit={}",
            config.tables.len(),
            source.db_type(),
            sink.db_type(),
            audit_store.backend_type()
        );

        Ok(Self {
            audit: AuditSink::new(audit_store, report),
            config,
            secrets,
            source,
            sink,
            masker,
            locks: TableLocks::new(),
            ready: OnceCell::new(),
            sink_unmarked: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lease registry shared by every run of this engine.
    pub fn locks(&self) -> &TableLocks {
        &self.locks
    }

    /// Validate both environment markers, then try to create the audit
    /// schema.
    ///
    /// Validation runs once per engine. Nothing is written to either database
    /// before both markers have been checked. A failed audit schema setup is
    /// logged and retried when the first result is recorded.
    async fn ensure_ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let dbs = &self.config.databases;
                environment::validate(
                    self.source.as_ref(),
                    DatabaseRole::Source,
                    &dbs.source_environment,
                )
                .await?;
                let sink_status = environment::validate(
                    self.sink.as_ref(),
                    DatabaseRole::Target,
                    &dbs.target_environment,
                )
                .await?;
                self.sink_unmarked
                    .store(sink_status == EnvironmentStatus::Unmarked, Ordering::SeqCst);
                Ok::<(), SyncError>(())
            })
            .await?;
        self.audit.ensure_schema().await;
        Ok(())
    }

    /// Tables selected for a run.
    ///
    /// A named table runs even when inactive; an unknown name is a
    /// configuration error.
    fn select_tables(&self, target_table: Option<&str>) -> Result<Vec<&TableSpec>> {
        match target_table {
            Some(name) => {
                let spec = self.config.table(name).ok_or_else(|| {
                    SyncError::Config(format!("table '{}' is not configured", name))
                })?;
                if !spec.active {
                    warn!("{}: table is inactive but was requested explicitly", name);
                }
                Ok(vec![spec])
            }
            None => Ok(self.config.tables.iter().filter(|t| t.active).collect()),
        }
    }

    /// Run the pipeline for one table or every active table.
    ///
    /// Table failures are reported in the [`RunReport`]; only an environment
    /// mismatch or invalid arguments fail the run itself.
    pub async fn run(
        &self,
        target_table: Option<&str>,
        sample_override: Option<f64>,
    ) -> Result<RunReport> {
        if let Some(pct) = sample_override {
            validate_sample_percent(pct).map_err(SyncError::Config)?;
        }
        let tables = self.select_tables(target_table)?;
        self.ensure_ready().await?;

        let ctx = ExecutionContext::new();
        info!(
            "Starting run {} ({} tables, config {})",
            ctx.execution_id,
            tables.len(),
            &self.config.hash()[..12]
        );

        let pipeline = TablePipeline::new(
            self.source.as_ref(),
            self.sink.as_ref(),
            &self.masker,
            &self.config.settings,
        );

        let mut results = Vec::with_capacity(tables.len());
        for spec in tables {
            results.push(self.run_table(&ctx, &pipeline, spec, sample_override).await);
        }

        let report = RunReport {
            execution_id: ctx.execution_id.clone(),
            started_at: ctx.started_at,
            completed_at: Utc::now(),
            results,
        };
        info!(
            "Run {} finished: {} succeeded, {} failed, {} rows migrated",
            report.execution_id,
            report.succeeded().count(),
            report.failed().count(),
            report.records_migrated()
        );
        Ok(report)
    }

    async fn run_table(
        &self,
        ctx: &ExecutionContext,
        pipeline: &TablePipeline<'_>,
        spec: &TableSpec,
        sample_override: Option<f64>,
    ) -> TableRunResult {
        let started_at = Utc::now();
        let sample_percent = sample_override.unwrap_or(spec.sample_percent);
        info!("Processing table {}", spec.name);

        let plan: TablePlan = pipeline.plan(spec).await;
        let controller = RetryController::new(RetryPolicy::from_settings(&self.config.settings));
        let outcome = controller
            .run(&spec.name, |attempt| {
                let plan = &plan;
                async move {
                    let _lease = self.locks.acquire(&spec.name)?;
                    debug!("{}: attempt {}", spec.name, attempt);
                    let mark = self
                        .sink_unmarked
                        .load(Ordering::SeqCst)
                        .then_some(self.config.databases.target_environment.as_str());
                    let load = pipeline
                        .execute(ctx, spec, plan, sample_percent, mark)
                        .await?;
                    if load.marked_environment {
                        self.sink_unmarked.store(false, Ordering::SeqCst);
                    }
                    Ok::<TableLoad, SyncError>(load)
                }
            })
            .await;

        let result = table_result(ctx, spec, plan.mode, outcome, started_at);
        self.audit.record(&result).await;
        result
    }

    /// Write an encrypted snapshot of every configured table.
    ///
    /// The backup key is checked before anything is read from the source.
    pub async fn create_backup(&self) -> Result<PathBuf> {
        let service = self.backup_service()?;
        let tables: Vec<TableSpec> = self.config.tables.clone();
        info!("Creating backup of {} tables", tables.len());
        service.create(self.source.as_ref(), &tables).await
    }

    /// Decrypt a backup back to its SQL script.
    pub fn restore(&self, path: &Path) -> Result<String> {
        restore_backup(&self.config, self.secrets.as_ref(), path)
    }

    /// Most recent audit entries, newest first.
    pub async fn get_audit_history(&self, limit: usize) -> Result<Vec<TableRunResult>> {
        self.audit.history(limit).await
    }

    fn backup_service(&self) -> Result<BackupService> {
        backup_service(&self.config, self.secrets.as_ref())
    }
}

/// Decrypt a backup without connecting to any database.
pub fn restore_backup(config: &Config, secrets: &dyn SecretProvider, path: &Path) -> Result<String> {
    let script = backup_service(config, secrets)?.restore(path)?;
    info!("Restored {} ({} bytes of SQL)", path.display(), script.len());
    Ok(script)
}

fn backup_service(config: &Config, secrets: &dyn SecretProvider) -> Result<BackupService> {
    let key = secrets.get(&config.security.backup_key_secret)?;
    let cipher = BackupCipher::from_hex(&key)?;
    Ok(BackupService::new(cipher, &config.backup.directory))
}

fn table_result(
    ctx: &ExecutionContext,
    spec: &TableSpec,
    mode: OperationMode,
    outcome: RetryOutcome<TableLoad>,
    started_at: chrono::DateTime<Utc>,
) -> TableRunResult {
    let attempts = outcome.attempts();
    let mut result = TableRunResult {
        execution_id: ctx.execution_id.clone(),
        table: spec.name.clone(),
        operation_mode: mode,
        records_migrated: 0,
        records_failed: 0,
        total_extracted: 0,
        status: RunStatus::Success,
        message: "OK".to_string(),
        masking_rules_applied: rules_to_json(&spec.masking_rules),
        attempts,
        started_at,
        ended_at: Utc::now(),
    };
    match outcome {
        RetryOutcome::Succeeded { value, .. } => {
            result.records_migrated = value.records_migrated;
            result.total_extracted = value.total_extracted;
            info!(
                "{}: SUCCESS ({} of {} rows, {} attempt(s))",
                spec.name, value.records_migrated, value.total_extracted, attempts
            );
        }
        RetryOutcome::Failed { error, .. } => {
            error!("{}: ERROR after {} attempt(s): {}", spec.name, attempts, error);
            result.status = RunStatus::Error;
            result.records_failed = error.failed_rows();
            result.message = error.to_string();
        }
    }
    result
}
