//! Per-table migration sequencing.
//!
//! One table migrates through a strict order: clone, capture source count,
//! extract to staging, bulk-load, reconcile. Any step's failure aborts that
//! table's run; recovery is idempotent replay, not rollback. A batch runs
//! tables sequentially and continues past per-table failures, logging each
//! outcome.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cloner::{CloneOutcome, TableCloner};
use crate::config::Config;
use crate::core::schema::{FieldSelection, SourceTable};
use crate::error::Result;
use crate::extract::{ExtractOptions, LineageMetadata, RowExtractor};
use crate::load::{BulkLoader, CopyCredentials, LoadOptions};
use crate::reconcile::{CountReconciler, ReconciliationResult};
use crate::source::MssqlPool;
use crate::staging::StagingStore;
use crate::target::WarehousePool;

/// Immutable per-run context shared by every table in a batch.
///
/// The run id is derived from epoch seconds at pipeline construction and is
/// stamped on every emitted row.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: i64,
    pub started_at: NaiveDateTime,
    pub source_system_code: Option<String>,
}

impl RunContext {
    pub fn new(source_system_code: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: now.timestamp(),
            started_at: now.naive_utc(),
            source_system_code,
        }
    }

    /// Lineage values for extracted rows. Create and update timestamps are
    /// identical for a full extraction; there is no row-level upsert
    /// timestamp tracking.
    pub fn lineage(&self) -> LineageMetadata {
        LineageMetadata {
            source_system_code: self.source_system_code.clone().unwrap_or_default(),
            row_create_ts: self.started_at,
            row_update_ts: self.started_at,
            run_id: self.run_id,
        }
    }
}

/// One source/target table pair to migrate.
#[derive(Debug, Clone)]
pub struct TableJob {
    pub source_table: SourceTable,
    pub target_table: String,
    pub selection: Option<FieldSelection>,
    pub date_fields: Vec<String>,
    pub from_date: Option<NaiveDateTime>,
    pub load: LoadOptions,
}

/// Outcome of one table migration.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    /// The source table was not found; nothing was done.
    SkippedMissingSource,
    /// The full sequence ran and the reconciliation gate passed.
    Completed(ReconciliationResult),
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub run_id: i64,
    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_skipped: usize,
    pub tables_failed: usize,
    pub failed_tables: Vec<String>,
    pub duration_seconds: f64,
}

impl BatchSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sequences the staging components for table migrations.
pub struct MigrationPipeline {
    cloner: TableCloner,
    extractor: RowExtractor,
    loader: BulkLoader,
    reconciler: CountReconciler,
    ctx: RunContext,
}

impl MigrationPipeline {
    /// Connect both pools and the staging store from configuration.
    pub async fn connect(config: &Config, source_system_code: Option<String>) -> Result<Self> {
        let source = Arc::new(
            MssqlPool::connect(
                config.source.clone(),
                config.migration.max_source_connections as u32,
            )
            .await?,
        );
        let target = Arc::new(
            WarehousePool::connect(&config.target, config.migration.max_target_connections)
                .await?,
        );
        let staging = Arc::new(StagingStore::from_config(&config.staging)?);

        let credentials = CopyCredentials {
            access_key_id: config.staging.access_key_id.clone(),
            secret_access_key: config.staging.secret_access_key.clone(),
        };

        Ok(Self {
            cloner: TableCloner::new(source.clone(), target.clone()),
            extractor: RowExtractor::new(
                source.clone(),
                target.clone(),
                staging,
                config.staging.spool_dir.clone(),
                config.migration.batch_size,
            ),
            loader: BulkLoader::new(
                target.clone(),
                credentials,
                config.target.grant_users.clone(),
                config.target.grant_groups.clone(),
            ),
            reconciler: CountReconciler::new(source, target, config.migration.count_threshold),
            ctx: RunContext::new(source_system_code),
        })
    }

    /// The per-run context (run id, lineage timestamps).
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Migrate one table, strictly in order, failing fast.
    pub async fn migrate_table(&self, job: &TableJob) -> Result<TableOutcome> {
        info!(
            "Staging {} into {}",
            job.source_table.qualified(),
            job.target_table
        );

        // Bad option combinations fail before any remote call.
        job.load.validate()?;

        // 1. Clone the table shape (or skip in incremental mode).
        let outcome = self
            .cloner
            .clone_table(
                &job.source_table,
                &job.target_table,
                job.selection.as_ref(),
                job.load.incremental,
            )
            .await?;

        match outcome {
            CloneOutcome::SourceMissing => {
                info!("No source found for {}, no work to do", job.source_table.qualified());
                return Ok(TableOutcome::SkippedMissingSource);
            }
            CloneOutcome::CreateFailed => {
                // Deliberate policy: proceed; a broken target surfaces as a
                // load failure with full statement context.
                warn!(
                    "Proceeding after create failure for {}; the load will surface any real problem",
                    job.target_table
                );
            }
            CloneOutcome::Created | CloneOutcome::SkippedExisting => {}
        }

        // 2. Capture the source count before extraction skews the baseline.
        let source_count = self.reconciler.capture_source(&job.source_table).await?;

        // 3. Extract to staging.
        let extract_opts = ExtractOptions {
            selection: job.selection.clone(),
            date_fields: job.date_fields.clone(),
            from_date: job.from_date,
            delimiter: job.load.delimiter as u8,
            compressed: job.load.compressed,
        };
        let staged_url = self
            .extractor
            .extract(
                &job.source_table,
                &job.target_table,
                &extract_opts,
                &self.ctx.lineage(),
            )
            .await?;

        // 4. Bulk-load into the warehouse.
        self.loader
            .load(&job.target_table, &staged_url, &job.load)
            .await?;

        // 5. Reconcile counts as the correctness gate.
        let reconciliation = self
            .reconciler
            .verify(source_count, &job.target_table)
            .await?;

        info!("Finished staging {}", job.target_table);
        Ok(TableOutcome::Completed(reconciliation))
    }

    /// Run a batch of table jobs sequentially.
    ///
    /// A table failure aborts only that table; the batch continues and each
    /// outcome is logged, so the summary plus per-table log lines tell the
    /// whole story.
    pub async fn run(&self, jobs: &[TableJob]) -> BatchSummary {
        let started = std::time::Instant::now();
        let mut summary = BatchSummary {
            run_id: self.ctx.run_id,
            tables_total: jobs.len(),
            ..BatchSummary::default()
        };

        for job in jobs {
            match self.migrate_table(job).await {
                Ok(TableOutcome::Completed(result)) => {
                    info!(
                        "{}: completed (source={} target={} diff={})",
                        job.target_table,
                        result.source_count,
                        result.target_count,
                        result.absolute_diff
                    );
                    summary.tables_success += 1;
                }
                Ok(TableOutcome::SkippedMissingSource) => {
                    summary.tables_skipped += 1;
                }
                Err(e) => {
                    error!("{}: failed: {}", job.target_table, e.format_detailed());
                    summary.tables_failed += 1;
                    summary.failed_tables.push(job.target_table.clone());
                }
            }
        }

        summary.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            "Batch finished: {}/{} succeeded, {} skipped, {} failed in {:.1}s",
            summary.tables_success,
            summary.tables_total,
            summary.tables_skipped,
            summary.tables_failed,
            summary.duration_seconds
        );
        summary
    }
}
