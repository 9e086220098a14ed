//! Identifier validation and quoting.
//!
//! SQL identifiers cannot be passed as statement parameters, so every table
//! and column name that gets interpolated into dynamic SQL goes through
//! validation first, then database-specific quoting.

use crate::error::{Result, StageError};

/// Maximum identifier length (SQL Server allows 128 characters).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is interpolated into SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StageError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(StageError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(StageError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an MSSQL identifier using brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Quote a warehouse identifier using double quotes.
pub fn quote_warehouse(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("Order Details").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        assert!(validate_identifier("table\0name").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_quote_mssql_escapes_bracket() {
        assert_eq!(quote_mssql("users").unwrap(), "[users]");
        assert_eq!(quote_mssql("a]b").unwrap(), "[a]]b]");
    }

    #[test]
    fn test_quote_warehouse_escapes_double_quote() {
        assert_eq!(quote_warehouse("users").unwrap(), "\"users\"");
        assert_eq!(quote_warehouse("a\"b").unwrap(), "\"a\"\"b\"");
    }
}
