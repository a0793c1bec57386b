//! Per-table extract, sample, mask and load.
//!
//! A table is processed in two steps. [`TablePipeline::plan`] decides between
//! a full and an incremental extraction from the sink's watermark; it runs
//! once per table. [`TablePipeline::execute`] then extracts, samples, masks
//! and loads, and is the unit the retry controller repeats.

pub mod sampling;

use tracing::{debug, info};

use crate::config::{Settings, TableSpec};
use crate::core::run::{ExecutionContext, OperationMode};
use crate::core::traits::{ExtractFilter, ExtractQuery, LoadRequest, SourceReader, TargetWriter};
use crate::error::{Result, SyncError};
use crate::masking::Masker;
use crate::watermark::WatermarkTracker;

pub use sampling::{derive_seed, sample_rows, sample_size};

/// Extraction strategy chosen for a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub mode: OperationMode,
    pub filter: ExtractFilter,
}

/// Row counts of one successful table load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableLoad {
    /// Rows extracted from the source, before sampling.
    pub total_extracted: u64,

    /// Rows inserted into the sink.
    pub records_migrated: u64,

    /// Sink rows replaced because their key was reinserted.
    pub rows_deleted: u64,

    /// The load transaction also wrote the sink's environment marker.
    pub marked_environment: bool,
}

/// Moves one table from source to sink.
pub struct TablePipeline<'a> {
    source: &'a dyn SourceReader,
    sink: &'a dyn TargetWriter,
    masker: &'a Masker,
    settings: &'a Settings,
}

impl<'a> TablePipeline<'a> {
    pub fn new(
        source: &'a dyn SourceReader,
        sink: &'a dyn TargetWriter,
        masker: &'a Masker,
        settings: &'a Settings,
    ) -> Self {
        Self {
            source,
            sink,
            masker,
            settings,
        }
    }

    /// Choose full or incremental extraction.
    ///
    /// With a filter column and an existing watermark only newer rows are
    /// read. Otherwise the load is full, limited to the extraction window
    /// when a filter column is configured.
    pub async fn plan(&self, spec: &TableSpec) -> TablePlan {
        let Some(column) = spec.filter_column.as_deref() else {
            return TablePlan {
                mode: OperationMode::Full,
                filter: ExtractFilter::All,
            };
        };

        let tracker = WatermarkTracker::new(self.sink);
        if let Some(watermark) = tracker.max_watermark(&spec.name, column).await {
            info!("{}: incremental load after {}={:?}", spec.name, column, watermark);
            return TablePlan {
                mode: OperationMode::Incremental,
                filter: ExtractFilter::After {
                    column: column.to_string(),
                    watermark,
                },
            };
        }

        let days = self.settings.extraction_window_days;
        let filter = if days > 0 {
            info!("{}: full load of the last {} days", spec.name, days);
            ExtractFilter::Window {
                column: column.to_string(),
                days,
            }
        } else {
            info!("{}: full load", spec.name);
            ExtractFilter::All
        };
        TablePlan {
            mode: OperationMode::Full,
            filter,
        }
    }

    /// Extract, sample, mask and load one table.
    ///
    /// `environment_mark` is written into the sink inside the load
    /// transaction when the sink has no marker yet.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        spec: &TableSpec,
        plan: &TablePlan,
        sample_percent: f64,
        environment_mark: Option<&str>,
    ) -> Result<TableLoad> {
        let query = ExtractQuery {
            table: spec.name.clone(),
            pk_column: spec.pk.clone(),
            filter: plan.filter.clone(),
        };
        let rows = self
            .source
            .extract(&query)
            .await
            .map_err(|e| as_extraction_error(&spec.name, e))?;

        let total_extracted = rows.len() as u64;
        if rows.is_empty() {
            info!("{}: no rows to migrate", spec.name);
            return Ok(TableLoad::default());
        }

        let mut rows = if sample_percent < 100.0 {
            let seed = self
                .settings
                .sample_seed
                .unwrap_or_else(|| derive_seed(&ctx.execution_id, &spec.name));
            let sampled = sample_rows(rows, sample_percent, seed);
            info!(
                "{}: sampled {} of {} rows ({}%)",
                spec.name,
                sampled.len(),
                total_extracted,
                sample_percent
            );
            sampled
        } else {
            rows
        };

        if rows.column_index(&spec.pk).is_none() {
            return Err(SyncError::SchemaMismatch {
                table: spec.name.clone(),
                column: spec.pk.clone(),
            });
        }
        self.masker
            .mask_rows(&spec.name, &mut rows, &spec.masking_rules)?;
        debug!(
            "{}: masked {} columns over {} rows",
            spec.name,
            spec.masking_rules.len(),
            rows.len()
        );

        let batch_rows = rows.len() as u64;
        let stats = self
            .sink
            .load(LoadRequest {
                table: &spec.name,
                pk_column: &spec.pk,
                rows: &rows,
                batch_size: self.settings.batch_size,
                environment_mark,
            })
            .await
            .map_err(|e| as_load_error(&spec.name, batch_rows, e))?;

        info!(
            "{}: {} rows migrated ({} replaced)",
            spec.name, stats.rows_inserted, stats.rows_deleted
        );
        Ok(TableLoad {
            total_extracted,
            records_migrated: stats.rows_inserted,
            rows_deleted: stats.rows_deleted,
            marked_environment: environment_mark.is_some(),
        })
    }
}

fn as_extraction_error(table: &str, e: SyncError) -> SyncError {
    match e {
        SyncError::Database(_) | SyncError::Pool { .. } | SyncError::Io(_) => {
            SyncError::extraction(table, e)
        }
        other => other,
    }
}

fn as_load_error(table: &str, rows: u64, e: SyncError) -> SyncError {
    match e {
        SyncError::Load {
            table, message, ..
        } => SyncError::Load {
            table,
            rows,
            message,
        },
        SyncError::Database(_) | SyncError::Pool { .. } | SyncError::Io(_) => {
            SyncError::load(table, rows, e)
        }
        other => other,
    }
}
