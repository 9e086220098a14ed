//! Configuration validation.

use super::Config;
use crate::error::{Result, StageError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(StageError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(StageError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(StageError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(StageError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(StageError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(StageError::Config("target.user is required".into()));
    }

    // Staging validation
    if config.staging.bucket.is_empty() {
        return Err(StageError::Config("staging.bucket is required".into()));
    }
    if config.staging.environment.is_empty() {
        return Err(StageError::Config("staging.environment is required".into()));
    }
    if config.staging.access_key_id.is_empty() {
        return Err(StageError::Config("staging.access_key_id is required".into()));
    }

    // Migration validation
    if config.migration.batch_size == 0 {
        return Err(StageError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.max_errors < 0 {
        return Err(StageError::Config(
            "migration.max_errors must not be negative".into(),
        ));
    }
    if config.migration.count_threshold < 0.0 {
        return Err(StageError::Config(
            "migration.count_threshold must not be negative".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, StagingConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "source_db".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                schema: "dbo".to_string(),
                encrypt: false,
                trust_server_cert: true,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5439,
                database: "warehouse".to_string(),
                user: "etl".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
                grant_users: vec!["etl_user".to_string()],
                grant_groups: vec![],
            },
            staging: StagingConfig {
                bucket: "stage-bucket".to_string(),
                region: "us-east-1".to_string(),
                namespace: "stage".to_string(),
                environment: "dev".to_string(),
                access_key_id: "AKIA123".to_string(),
                secret_access_key: "secret".to_string(),
                endpoint: None,
                spool_dir: "temp".to_string(),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_bucket() {
        let mut config = valid_config();
        config.staging.bucket = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_staging_config_secret_not_serialized() {
        let mut config = valid_config();
        config.staging.secret_access_key = "very_secret_key".to_string();
        let json = serde_json::to_string(&config.staging).unwrap();
        assert!(
            !json.contains("very_secret_key"),
            "Secret was serialized: {}",
            json
        );
    }

    #[test]
    fn test_target_config_password_not_serialized() {
        let mut config = valid_config();
        config.target.password = "super_secret".to_string();
        let json = serde_json::to_string(&config.target).unwrap();
        assert!(!json.contains("super_secret"), "Password was serialized: {}", json);
    }
}
