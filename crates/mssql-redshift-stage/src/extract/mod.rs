//! Row extraction to staged delimited files.
//!
//! Builds the read query (optionally projected and watermark-filtered),
//! streams rows in bounded batches, normalizes every scalar, appends lineage
//! metadata, and spools a delimiter-separated file with quoting disabled —
//! field content is sanitized up front, so no quote character exists in the
//! encoding. The spool file is uploaded to staging and removed locally
//! regardless of the upload outcome.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use csv::QuoteStyle;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use crate::core::identifier::quote_mssql;
use crate::core::schema::{FieldSelection, SourceTable};
use crate::core::traits::Liveness;
use crate::core::value::SqlValue;
use crate::error::{Result, StageError};
use crate::source::MssqlPool;
use crate::staging::StagingStore;
use crate::target::WarehousePool;

/// Fixed audit record appended to every extracted row, in column order
/// matching the lineage columns of the translated table.
#[derive(Debug, Clone)]
pub struct LineageMetadata {
    /// Short code identifying the originating system.
    pub source_system_code: String,
    /// Row creation timestamp; equal to the update timestamp for a full
    /// extraction.
    pub row_create_ts: NaiveDateTime,
    /// Row update timestamp.
    pub row_update_ts: NaiveDateTime,
    /// Run identifier shared by every row emitted in one run.
    pub run_id: i64,
}

impl LineageMetadata {
    /// Render the four staged fields in fixed order.
    pub fn staged_fields(&self) -> [String; 4] {
        [
            self.source_system_code.clone(),
            self.row_create_ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.row_update_ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.run_id.to_string(),
        ]
    }
}

/// Options for one extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Optional projection of the source fields.
    pub selection: Option<FieldSelection>,
    /// Date columns compared against the watermark.
    pub date_fields: Vec<String>,
    /// Watermark: rows qualify when *any* date field is newer.
    pub from_date: Option<NaiveDateTime>,
    /// Staged file delimiter.
    pub delimiter: u8,
    /// Gzip the spool stream.
    pub compressed: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            selection: None,
            date_fields: Vec::new(),
            from_date: None,
            delimiter: b'\t',
            compressed: true,
        }
    }
}

/// Build the read query.
///
/// The watermark filter is a logical OR across all date fields, each compared
/// strictly greater than the watermark, rendered to the minute.
pub fn build_select_sql(
    table: &SourceTable,
    select_list: Option<&[String]>,
    date_fields: &[String],
    from_date: Option<&NaiveDateTime>,
) -> Result<String> {
    let columns = match select_list {
        Some(cols) => cols
            .iter()
            .map(|c| quote_mssql(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "),
        None => "*".to_string(),
    };

    let mut sql = format!(
        "SELECT {} FROM {}.{} WITH (NOLOCK)",
        columns,
        quote_mssql(&table.schema)?,
        quote_mssql(&table.name)?
    );

    if let (false, Some(from_date)) = (date_fields.is_empty(), from_date) {
        let watermark = from_date.format("%Y-%m-%d %H:%M");
        let predicates = date_fields
            .iter()
            .map(|field| Ok(format!("{} > '{}'", quote_mssql(field)?, watermark)))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(&format!(" WHERE {}", predicates.join(" OR ")));
    }

    Ok(sql)
}

/// Normalize one row and append the lineage fields.
pub fn encode_record(values: &[SqlValue], lineage: &[String; 4]) -> Vec<String> {
    values
        .iter()
        .map(SqlValue::to_staged_field)
        .chain(lineage.iter().cloned())
        .collect()
}

/// Delimited spool writer with quoting structurally disabled.
pub enum SpoolWriter {
    Plain(csv::Writer<File>),
    Gzip(csv::Writer<GzEncoder<File>>),
}

impl SpoolWriter {
    /// Create the spool file, gzip-wrapped when requested.
    pub fn create(path: &std::path::Path, delimiter: u8, compressed: bool) -> Result<Self> {
        fn delimited<W: std::io::Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
            csv::WriterBuilder::new()
                .delimiter(delimiter)
                .quote_style(QuoteStyle::Never)
                .from_writer(writer)
        }

        let file = File::create(path)?;
        Ok(if compressed {
            SpoolWriter::Gzip(delimited(
                GzEncoder::new(file, Compression::default()),
                delimiter,
            ))
        } else {
            SpoolWriter::Plain(delimited(file, delimiter))
        })
    }

    /// Write one record.
    pub fn write_record(&mut self, record: &[String]) -> Result<()> {
        match self {
            SpoolWriter::Plain(w) => w.write_record(record)?,
            SpoolWriter::Gzip(w) => w.write_record(record)?,
        }
        Ok(())
    }

    /// Flush and close the stream, finishing the gzip trailer when present.
    pub fn finish(self) -> Result<()> {
        fn unwrap_err<W>(e: csv::IntoInnerError<W>) -> std::io::Error {
            std::io::Error::new(e.error().kind(), e.error().to_string())
        }

        match self {
            SpoolWriter::Plain(mut w) => {
                w.flush()?;
                w.into_inner().map_err(unwrap_err)?;
            }
            SpoolWriter::Gzip(mut w) => {
                w.flush()?;
                let gz = w.into_inner().map_err(unwrap_err)?;
                gz.finish()?;
            }
        }
        Ok(())
    }
}

/// Streams source rows into a staged file.
pub struct RowExtractor {
    source: Arc<MssqlPool>,
    target: Arc<WarehousePool>,
    staging: Arc<StagingStore>,
    spool_dir: PathBuf,
    batch_size: usize,
}

impl RowExtractor {
    pub fn new(
        source: Arc<MssqlPool>,
        target: Arc<WarehousePool>,
        staging: Arc<StagingStore>,
        spool_dir: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            staging,
            spool_dir: spool_dir.into(),
            batch_size,
        }
    }

    /// Extract a table to staging and return the staged location URL.
    pub async fn extract(
        &self,
        source_table: &SourceTable,
        target_table: &str,
        opts: &ExtractOptions,
        lineage: &LineageMetadata,
    ) -> Result<String> {
        let schema = self.source.table_schema(source_table).await?;
        if schema.is_empty() {
            return Err(StageError::Config(format!(
                "source table {} not found",
                source_table.qualified()
            )));
        }

        let (select_list, col_types) = match &opts.selection {
            Some(selection) => (
                Some(selection.select_list(&schema)),
                selection.apply(&schema).column_types(),
            ),
            None => (None, schema.column_types()),
        };

        let sql = build_select_sql(
            source_table,
            select_list.as_deref(),
            &opts.date_fields,
            opts.from_date.as_ref(),
        )?;
        info!("{}", sql);

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        let spool_name = format!(
            "{}.tsv{}",
            target_table.replace('.', "-"),
            if opts.compressed { ".gz" } else { "" }
        );
        let spool_path = self.spool_dir.join(spool_name);
        info!("Exporting to spool file {}", spool_path.display());

        let mut writer = SpoolWriter::create(&spool_path, opts.delimiter, opts.compressed)?;
        let lineage_fields = lineage.staged_fields();

        let mut rows_written: u64 = 0;
        let mut rx = self.source.stream_rows(sql, col_types, self.batch_size);
        while let Some(batch) = rx.recv().await {
            for row in batch? {
                writer.write_record(&encode_record(&row, &lineage_fields))?;
                rows_written += 1;
            }
        }
        writer.finish()?;
        info!("Spooled {} rows for {}", rows_written, target_table);

        // Both connections may have sat idle for the entire extraction;
        // validate them before the upload and load phases.
        self.source.ping().await?;
        self.target.ping().await?;

        let key = self.staging.staged_key(target_table, opts.compressed);
        let uploaded = self.staging.put_file(&key, &spool_path).await;

        // The spool copy is removed whether or not the upload succeeded.
        if let Err(e) = tokio::fs::remove_file(&spool_path).await {
            info!("Could not remove spool file {}: {}", spool_path.display(), e);
        }
        uploaded?;

        let url = self.staging.url(&key);
        info!("Upload complete to {}", url);
        Ok(url)
    }
}
