//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
source:
  host: mssql.internal
  database: crm
  user: reader
  password: pw
target:
  host: warehouse.internal
  database: analytics
  user: etl
  password: pw
staging:
  bucket: stage-bucket
  environment: dev
  access_key_id: AKIA123
  secret_access_key: shhh
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL_YAML).unwrap();
        assert_eq!(config.source.port, 1433);
        assert_eq!(config.source.schema, "dbo");
        assert_eq!(config.target.port, 5439);
        assert_eq!(config.target.ssl_mode, "require");
        assert_eq!(config.staging.namespace, "stage");
        assert_eq!(config.migration.batch_size, 20_000);
        assert!((config.migration.count_threshold - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_yaml_rejects_missing_section() {
        assert!(Config::from_yaml("source:\n  host: x\n").is_err());
    }
}
