//! Row value types for the extraction boundary.
//!
//! Source rows are decoded into a closed [`SqlValue`] variant set, and each
//! variant has exactly one normalization into the staged text encoding. This
//! keeps the delimiter-based file format safe without relying on implicit
//! text coercion at the driver boundary.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// The NULL token written to the staged file.
///
/// The bulk-load statement declares `NULL AS 'None'`; the two must agree.
pub const NULL_TOKEN: &str = "None";

/// A single scalar value read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Normalize into one staged field.
    ///
    /// Booleans become `0`/`1`; text has newline, carriage-return, tab and
    /// vertical-tab replaced with a single space so every record stays on one
    /// line and never collides with the delimiter; NULL becomes the load
    /// statement's null token.
    #[must_use]
    pub fn to_staged_field(&self) -> String {
        match self {
            SqlValue::Null => NULL_TOKEN.to_string(),
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => scrub_field(v),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Timestamp(v) => format_timestamp(v),
        }
    }
}

/// Replace record-breaking whitespace with single spaces.
pub fn scrub_field(value: &str) -> String {
    value.replace(['\n', '\r', '\t', '\x0B'], " ")
}

/// Render a timestamp for the staged file, keeping fractional seconds only
/// when present.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    use chrono::Timelike;
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}
