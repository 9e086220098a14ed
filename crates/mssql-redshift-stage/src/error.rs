//! Error types for the staging library.

use thiserror::Error;

/// Main error type for staging operations.
#[derive(Error, Debug)]
pub enum StageError {
    /// Configuration error (invalid YAML, missing fields, bad option combinations).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error.
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Warehouse connection or statement error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] tokio_postgres::Error),

    /// Connection pool error with context.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Object-store (staging) error.
    #[error("Staging error: {0}")]
    Staging(#[from] object_store::Error),

    /// Bulk-load statement failed for a specific table.
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// Source/target row counts disagree beyond the allowed threshold.
    #[error(
        "Reconciliation failed: source={source_count} target={target_count} \
         diff={absolute_diff} ({relative_diff:.4} > {threshold:.4})"
    )]
    Reconciliation {
        source_count: i64,
        target_count: i64,
        absolute_diff: i64,
        relative_diff: f64,
        threshold: f64,
    },

    /// Staged file encoding error.
    #[error("Staged file error: {0}")]
    Encode(#[from] csv::Error),

    /// IO error (spool file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StageError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        StageError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Load error for a table.
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        StageError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            StageError::Config(_) => 2,
            StageError::Reconciliation { .. } => 3,
            StageError::Load { .. } => 4,
            _ => 1,
        }
    }
}

/// Result type alias for staging operations.
pub type Result<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_carries_context() {
        let err = StageError::pool("timed out", "getting MSSQL connection");
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("getting MSSQL connection"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(StageError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            StageError::Reconciliation {
                source_count: 10,
                target_count: 5,
                absolute_diff: 5,
                relative_diff: 0.5,
                threshold: 0.01,
            }
            .exit_code(),
            3
        );
        assert_eq!(StageError::load("t", "boom").exit_code(), 4);
    }
}
