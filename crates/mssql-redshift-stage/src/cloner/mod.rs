//! Target table creation from translated source schemas.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::identifier::quote_warehouse;
use crate::core::schema::{FieldSelection, SourceTable, TableSchema};
use crate::error::Result;
use crate::source::MssqlPool;
use crate::target::WarehousePool;
use crate::typemap::{translate_column, LINEAGE_COLUMNS};

/// Outcome of a clone attempt.
///
/// Creation failure is deliberately non-fatal: one table's DDL race must not
/// abort a whole batch. The failure is logged with the offending DDL and
/// surfaced here so the caller decides, instead of being swallowed inside
/// the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    /// Target table was dropped and recreated.
    Created,
    /// Incremental mode and the target already exists; its schema is
    /// trusted as-is.
    SkippedExisting,
    /// The source catalog returned no columns; the migration is a no-op.
    SourceMissing,
    /// DDL execution failed; the migration proceeds and a later load
    /// failure will surface the problem.
    CreateFailed,
}

/// Clones a source table's translated schema into the warehouse.
pub struct TableCloner {
    source: Arc<MssqlPool>,
    target: Arc<WarehousePool>,
}

impl TableCloner {
    pub fn new(source: Arc<MssqlPool>, target: Arc<WarehousePool>) -> Self {
        Self { source, target }
    }

    /// Resolve, translate and (re)create the target table.
    pub async fn clone_table(
        &self,
        source_table: &SourceTable,
        target_table: &str,
        selection: Option<&FieldSelection>,
        incremental: bool,
    ) -> Result<CloneOutcome> {
        let schema = self.source.table_schema(source_table).await?;
        let effective = match selection {
            Some(selection) => selection.apply(&schema),
            None => schema,
        };

        if effective.is_empty() {
            warn!("Source table {} not found", source_table.qualified());
            return Ok(CloneOutcome::SourceMissing);
        }

        if incremental && self.target.table_exists(target_table).await? {
            info!("Table {} exists in target, skipping create", target_table);
            return Ok(CloneOutcome::SkippedExisting);
        }

        let ddl = build_create_table_sql(target_table, &effective)?;
        info!("Recreating target table {}", target_table);

        match self.target.execute(&ddl).await {
            Ok(()) => {
                info!("Target table {} created", target_table);
                Ok(CloneOutcome::Created)
            }
            Err(e) => {
                error!(
                    "Unable to create table {} with sql:\n{}\nCause: {}",
                    target_table, ddl, e
                );
                Ok(CloneOutcome::CreateFailed)
            }
        }
    }
}

/// Build the drop + create DDL for a translated schema, lineage columns
/// appended.
pub fn build_create_table_sql(target_table: &str, schema: &TableSchema) -> Result<String> {
    let mut column_defs = Vec::with_capacity(schema.columns.len() + LINEAGE_COLUMNS.len());

    for col in &schema.columns {
        let translated = translate_column(col);
        column_defs.push(format!(
            "{} {}",
            quote_warehouse(&translated.name)?,
            translated.type_clause
        ));
    }

    for (name, type_clause) in LINEAGE_COLUMNS {
        column_defs.push(format!("{} {}", name, type_clause));
    }

    Ok(format!(
        "drop table if exists {table};\ncreate table {table} (\n    {columns}\n);",
        table = target_table,
        columns = column_defs.join(",\n    ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;

    fn col(name: &str, data_type: &str, char_length: Option<i32>, ordinal: i32) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            char_length,
            precision: None,
            scale: None,
            ordinal,
        }
    }

    #[test]
    fn test_create_sql_shape() {
        let schema = TableSchema::new(vec![
            col("Id", "int", None, 1),
            col("Name", "nvarchar", Some(100), 2),
            col("partition", "varchar", Some(-1), 3),
        ]);

        let sql = build_create_table_sql("public.accounts", &schema).unwrap();

        assert!(sql.starts_with("drop table if exists public.accounts;"));
        assert!(sql.contains("create table public.accounts ("));
        assert!(sql.contains("\"Id\" integer"));
        assert!(sql.contains("\"Name\" nvarchar(100)"));
        // Reserved column renamed, varchar(max) clamped to the default bound.
        assert!(sql.contains("\"v_partition\" varchar(2000)"));
    }

    #[test]
    fn test_create_sql_appends_lineage_columns_last() {
        let schema = TableSchema::new(vec![col("Id", "int", None, 1)]);
        let sql = build_create_table_sql("t", &schema).unwrap();

        let id_pos = sql.find("\"Id\"").unwrap();
        let source_pos = sql.find("etl_source_system_cd varchar(50)").unwrap();
        let create_pos = sql.find("etl_row_create_dts timestamp").unwrap();
        let update_pos = sql.find("etl_row_update_dts timestamp").unwrap();
        let run_pos = sql.find("etl_run_id bigint").unwrap();

        assert!(id_pos < source_pos);
        assert!(source_pos < create_pos);
        assert!(create_pos < update_pos);
        assert!(update_pos < run_pos);
    }
}
