//! Type translation from source column metadata to warehouse column
//! definitions.
//!
//! Translation is a total function: every source type maps to *some*
//! warehouse type, with unrecognized types falling back to bounded varchar
//! rather than failing the migration. The alias sets are closed enumerations
//! so membership is checked exhaustively at build time instead of through ad
//! hoc string sets.

use crate::core::schema::Column;

/// Default bound for character columns with a missing or negative declared
/// length (unbounded text, varchar(max), and the like).
pub const DEFAULT_CHAR_LENGTH: i32 = 2000;

/// Hard upper bound on warehouse varchar length.
pub const MAX_CHAR_LENGTH: i32 = 65535;

/// Width of the legacy "timestamp" character quirk (see [`TypeFamily::Character`]).
const TIMESTAMP_CHAR_LENGTH: i32 = 8;

/// Warehouse reserved words that collide with source column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedWord {
    Partition,
}

impl ReservedWord {
    /// Match a lower-cased column name against the reserved set.
    pub fn parse(lowered: &str) -> Option<Self> {
        match lowered {
            "partition" => Some(ReservedWord::Partition),
            _ => None,
        }
    }
}

/// Classification of a source data type, in rule priority order.
///
/// Priority matters: `date` is temporal (never pass-through), and a
/// character-typed `timestamp` is a legacy row-version column, not a
/// semantic timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    /// Date/time-with-zone/datetime variants → unified `timestamp`.
    Temporal,
    /// A generically named `uuid` type → `varchar(50)`.
    NamedUuid,
    /// The GUID type (`uniqueidentifier`) → `varchar(36)`, a UUID's
    /// canonical string length. Distinct from [`TypeFamily::NamedUuid`].
    Guid,
    /// Character family, including the `timestamp` spelling quirk.
    Character,
    /// Boolean/tiny/short aliases → `smallint`.
    SmallInt,
    /// Standard integer aliases → `integer`.
    Integer,
    /// 64-bit aliases → `bigint`.
    BigInt,
    /// decimal/numeric with optional precision.
    ExactNumeric,
    /// Types that map 1:1 by name.
    PassThrough,
    /// Everything else → bounded varchar.
    Other,
}

/// Classify a source type name. Tiering is by alias-set membership, not by
/// declared byte width.
pub fn classify(data_type: &str) -> TypeFamily {
    match data_type {
        "timestamp with time zone"
        | "time without time zone"
        | "datetime"
        | "smalldatetime"
        | "date"
        | "datetime2" => TypeFamily::Temporal,
        "uuid" => TypeFamily::NamedUuid,
        "uniqueidentifier" => TypeFamily::Guid,
        "timestamp" | "char" | "varchar" | "character" | "nchar" | "bpchar"
        | "character varying" | "nvarchar" | "text" => TypeFamily::Character,
        "bit" | "tinyint" | "smallint" | "int2" => TypeFamily::SmallInt,
        "int" | "integer" | "int4" => TypeFamily::Integer,
        "bigint" | "int8" => TypeFamily::BigInt,
        "decimal" | "numeric" => TypeFamily::ExactNumeric,
        "real" | "double precision" | "boolean" | "float4" | "float8" | "float"
        | "bool" | "timestamp without time zone" => TypeFamily::PassThrough,
        _ => TypeFamily::Other,
    }
}

/// A translated column: safe output name plus warehouse type clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub type_clause: String,
}

/// Translate one source column into a warehouse column definition.
pub fn translate_column(col: &Column) -> TargetColumn {
    TargetColumn {
        name: safe_column_name(&col.name),
        type_clause: translate_type(col),
    }
}

/// Prefix a column name that collides with a warehouse reserved word.
pub fn safe_column_name(name: &str) -> String {
    if ReservedWord::parse(&name.to_lowercase()).is_some() {
        format!("v_{}", name)
    } else {
        name.to_string()
    }
}

fn translate_type(col: &Column) -> String {
    match classify(&col.data_type) {
        TypeFamily::Temporal => "timestamp".to_string(),
        TypeFamily::NamedUuid => "varchar(50)".to_string(),
        TypeFamily::Guid => "varchar(36)".to_string(),
        TypeFamily::Character => {
            // text and the legacy timestamp quirk render as varchar.
            let render = match col.data_type.as_str() {
                "text" | "timestamp" => "varchar",
                other => other,
            };
            let size = if col.data_type == "timestamp" {
                TIMESTAMP_CHAR_LENGTH
            } else {
                clamp_char_length(col.char_length)
            };
            format!("{}({})", render, size)
        }
        TypeFamily::SmallInt => "smallint".to_string(),
        TypeFamily::Integer => "integer".to_string(),
        TypeFamily::BigInt => "bigint".to_string(),
        TypeFamily::ExactNumeric => match col.precision {
            Some(p) => format!("{}({},{})", col.data_type, p, col.scale.unwrap_or(0)),
            None => col.data_type.clone(),
        },
        TypeFamily::PassThrough => col.data_type.clone(),
        TypeFamily::Other => format!("varchar({})", DEFAULT_CHAR_LENGTH),
    }
}

/// Clamp a declared character length into the warehouse-safe range.
///
/// Negative lengths (varchar(max) reports -1) and absent lengths use the
/// safe default; anything else is clamped to `[1, 65535]`.
pub fn clamp_char_length(declared: Option<i32>) -> i32 {
    match declared {
        None => DEFAULT_CHAR_LENGTH,
        Some(n) if n < 0 => DEFAULT_CHAR_LENGTH,
        Some(n) => n.clamp(1, MAX_CHAR_LENGTH),
    }
}

/// Lineage columns appended to every translated table, in fixed order.
///
/// These match the metadata values the extractor appends to every row.
pub const LINEAGE_COLUMNS: [(&str, &str); 4] = [
    ("etl_source_system_cd", "varchar(50)"),
    ("etl_row_create_dts", "timestamp"),
    ("etl_row_update_dts", "timestamp"),
    ("etl_run_id", "bigint"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            char_length: None,
            precision: None,
            scale: None,
            ordinal: 1,
        }
    }

    fn col_len(data_type: &str, len: i32) -> Column {
        Column {
            char_length: Some(len),
            ..col("c", data_type)
        }
    }

    fn translate(c: &Column) -> String {
        translate_column(c).type_clause
    }

    #[test]
    fn test_temporal_aliases() {
        for dt in [
            "timestamp with time zone",
            "time without time zone",
            "datetime",
            "smalldatetime",
            "date",
            "datetime2",
        ] {
            assert_eq!(translate(&col("c", dt)), "timestamp", "alias {}", dt);
        }
    }

    #[test]
    fn test_uuid_and_guid_are_distinct_rules() {
        assert_eq!(translate(&col("c", "uuid")), "varchar(50)");
        assert_eq!(translate(&col("c", "uniqueidentifier")), "varchar(36)");
    }

    #[test]
    fn test_character_aliases_keep_declared_length() {
        for dt in [
            "char",
            "varchar",
            "character",
            "nchar",
            "bpchar",
            "character varying",
            "nvarchar",
        ] {
            assert_eq!(translate(&col_len(dt, 10)), format!("{}(10)", dt), "alias {}", dt);
        }
    }

    #[test]
    fn test_text_renders_as_varchar() {
        assert_eq!(translate(&col_len("text", 120)), "varchar(120)");
        assert_eq!(translate(&col("c", "text")), "varchar(2000)");
    }

    #[test]
    fn test_character_timestamp_quirk_is_eight_wide() {
        // Row-version columns spelled "timestamp" are 8 bytes regardless of
        // any declared length.
        assert_eq!(translate(&col("c", "timestamp")), "varchar(8)");
        assert_eq!(translate(&col_len("timestamp", 100)), "varchar(8)");
    }

    #[test]
    fn test_char_length_clamping() {
        assert_eq!(translate(&col_len("varchar", -1)), "varchar(2000)");
        assert_eq!(translate(&col_len("varchar", 100000)), "varchar(65535)");
        assert_eq!(translate(&col("c", "varchar")), "varchar(2000)");
        assert_eq!(translate(&col_len("varchar", 10)), "varchar(10)");
        assert_eq!(translate(&col_len("varchar", 65535)), "varchar(65535)");
    }

    #[test]
    fn test_integer_tiers_by_alias_membership() {
        for dt in ["bit", "tinyint", "smallint", "int2"] {
            assert_eq!(translate(&col("c", dt)), "smallint", "alias {}", dt);
        }
        for dt in ["int", "integer", "int4"] {
            assert_eq!(translate(&col("c", dt)), "integer", "alias {}", dt);
        }
        for dt in ["bigint", "int8"] {
            assert_eq!(translate(&col("c", dt)), "bigint", "alias {}", dt);
        }
    }

    #[test]
    fn test_exact_numeric_precision() {
        let with_precision = Column {
            precision: Some(18),
            scale: Some(4),
            ..col("c", "decimal")
        };
        assert_eq!(translate(&with_precision), "decimal(18,4)");

        let scaleless = Column {
            precision: Some(10),
            ..col("c", "numeric")
        };
        assert_eq!(translate(&scaleless), "numeric(10,0)");

        assert_eq!(translate(&col("c", "decimal")), "decimal");
        assert_eq!(translate(&col("c", "numeric")), "numeric");
    }

    #[test]
    fn test_pass_through_aliases() {
        for dt in [
            "real",
            "double precision",
            "boolean",
            "float4",
            "float8",
            "float",
            "bool",
            "timestamp without time zone",
        ] {
            assert_eq!(translate(&col("c", dt)), dt, "alias {}", dt);
        }
    }

    #[test]
    fn test_unknown_types_fall_back_to_bounded_varchar() {
        for dt in ["xml", "geography", "sql_variant", "hierarchyid"] {
            assert_eq!(translate(&col("c", dt)), "varchar(2000)", "alias {}", dt);
        }
    }

    #[test]
    fn test_reserved_column_names_are_prefixed() {
        assert_eq!(safe_column_name("partition"), "v_partition");
        assert_eq!(safe_column_name("Partition"), "v_Partition");
        assert_eq!(safe_column_name("account_id"), "account_id");
    }

    #[test]
    fn test_lineage_columns_fixed_order() {
        assert_eq!(LINEAGE_COLUMNS[0], ("etl_source_system_cd", "varchar(50)"));
        assert_eq!(LINEAGE_COLUMNS[1], ("etl_row_create_dts", "timestamp"));
        assert_eq!(LINEAGE_COLUMNS[2], ("etl_row_update_dts", "timestamp"));
        assert_eq!(LINEAGE_COLUMNS[3], ("etl_run_id", "bigint"));
    }
}
