//! # mssql-redshift-stage
//!
//! Staging of MSSQL tables into a Redshift warehouse through S3.
//!
//! For each source/target table pair the pipeline:
//!
//! - **Clones** the source table shape, translating types and renaming
//!   reserved identifiers, with lineage columns appended
//! - **Extracts** rows into a sanitized delimited file (optionally gzipped)
//!   and uploads it to the staging bucket
//! - **Loads** the staged file with a warehouse COPY, either full-refresh or
//!   incremental merge-by-key
//! - **Reconciles** source and target row counts as a correctness gate
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_redshift_stage::{Config, MigrationPipeline, SourceTable, TableJob};
//!
//! #[tokio::main]
//! async fn main() -> mssql_redshift_stage::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let pipeline = MigrationPipeline::connect(&config, Some("crm".into())).await?;
//!
//!     let job = TableJob {
//!         source_table: SourceTable::parse("dbo.Accounts", &config.source.schema),
//!         target_table: "public.accounts".to_string(),
//!         selection: None,
//!         date_fields: vec![],
//!         from_date: None,
//!         load: Default::default(),
//!     };
//!
//!     let summary = pipeline.run(&[job]).await;
//!     println!("{}", summary.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod cloner;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod staging;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use crate::core::{Column, FieldSelection, SourceTable, SqlValue, TableSchema};
pub use cloner::{CloneOutcome, TableCloner};
pub use config::{Config, MigrationConfig, SourceConfig, StagingConfig, TargetConfig};
pub use error::{Result, StageError};
pub use extract::{ExtractOptions, LineageMetadata, RowExtractor};
pub use load::{BulkLoader, LoadOptions};
pub use pipeline::{BatchSummary, MigrationPipeline, RunContext, TableJob, TableOutcome};
pub use reconcile::{CountReconciler, ReconciliationResult};
pub use source::MssqlPool;
pub use staging::{Manifest, ManifestEntry, StagingStore};
pub use target::WarehousePool;
