//! mssql-redshift-stage CLI - stage MSSQL tables into Redshift through S3.

use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use mssql_redshift_stage::{
    Config, FieldSelection, LoadOptions, MigrationPipeline, SourceTable, StageError, TableJob,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mssql-redshift-stage")]
#[command(about = "Stage MSSQL tables into Redshift through S3")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Source tables, paired positionally with --target-tables
    #[arg(short = 's', long, num_args = 1.., required = true)]
    source_tables: Vec<String>,

    /// Target tables, paired positionally with --source-tables
    #[arg(short = 't', long, num_args = 1.., required = true)]
    target_tables: Vec<String>,

    /// Merge by key into existing tables instead of full refresh
    #[arg(short, long)]
    incremental: bool,

    /// Disable gzip compression of staged files
    #[arg(long)]
    no_gzip: bool,

    /// Strip surrounding quotes during the load
    #[arg(short = 'q', long)]
    remove_quotes: bool,

    /// Source fields to project, as `name` or `name:rename`
    #[arg(long, num_args = 0..)]
    select_fields: Vec<String>,

    /// Business key fields for incremental merges
    #[arg(long, num_args = 0..)]
    key_fields: Vec<String>,

    /// Date fields compared against the watermark
    #[arg(long, num_args = 0..)]
    date_fields: Vec<String>,

    /// Watermark date for incremental extraction (e.g. 2024-06-01 or
    /// "2024-06-01 08:30:00")
    #[arg(short, long)]
    from_date: Option<String>,

    /// Source system code stamped on lineage columns
    #[arg(long)]
    source_system: Option<String>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON summary to stdout
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, StageError> {
    let cli = Cli::parse();

    if cli.source_tables.len() != cli.target_tables.len() {
        return Err(StageError::Config(format!(
            "source table count ({}) must match target table count ({})",
            cli.source_tables.len(),
            cli.target_tables.len()
        )));
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let from_date = cli.from_date.as_deref().map(parse_from_date).transpose()?;
    let selection = if cli.select_fields.is_empty() {
        None
    } else {
        Some(FieldSelection::parse(&cli.select_fields))
    };
    let key_fields = if cli.key_fields.is_empty() {
        None
    } else {
        Some(cli.key_fields.clone())
    };

    let jobs: Vec<TableJob> = cli
        .source_tables
        .iter()
        .zip(cli.target_tables.iter())
        .map(|(source, target)| TableJob {
            source_table: SourceTable::parse(source, &config.source.schema),
            target_table: target.clone(),
            selection: selection.clone(),
            date_fields: cli.date_fields.clone(),
            from_date,
            load: LoadOptions {
                incremental: cli.incremental,
                compressed: !cli.no_gzip,
                remove_quotes: cli.remove_quotes,
                max_errors: config.migration.max_errors,
                key_fields: key_fields.clone(),
                ..LoadOptions::default()
            },
        })
        .collect();

    let pipeline = MigrationPipeline::connect(&config, cli.source_system.clone()).await?;
    let summary = pipeline.run(&jobs).await;

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        println!("\nStaging run {} finished", summary.run_id);
        println!("  Tables: {}/{}", summary.tables_success, summary.tables_total);
        println!("  Skipped: {}", summary.tables_skipped);
        println!("  Duration: {:.2}s", summary.duration_seconds);
        if !summary.failed_tables.is_empty() {
            println!("  Failed tables: {:?}", summary.failed_tables);
        }
    }

    if summary.tables_failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Parse the watermark in any of the accepted date/datetime shapes.
fn parse_from_date(raw: &str) -> Result<NaiveDateTime, StageError> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(StageError::Config(format!(
        "could not parse --from-date '{}'; expected YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS]",
        raw
    )))
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
