//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target warehouse configuration (Redshift).
    pub target: TargetConfig,

    /// Staging object-store configuration (S3).
    pub staging: StagingConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Default schema for unqualified table names (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Target warehouse (Redshift) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Warehouse host.
    pub host: String,

    /// Warehouse port (default: 5439).
    #[serde(default = "default_redshift_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Target schema for unqualified table names (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Users granted access after every load.
    #[serde(default = "default_grant_users")]
    pub grant_users: Vec<String>,

    /// Groups granted access after every load.
    #[serde(default = "default_grant_groups")]
    pub grant_groups: Vec<String>,
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("grant_users", &self.grant_users)
            .field("grant_groups", &self.grant_groups)
            .finish()
    }
}

/// Staging object-store (S3) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Bucket name.
    pub bucket: String,

    /// AWS region (default: "us-east-1").
    #[serde(default = "default_region")]
    pub region: String,

    /// Key namespace prefix under the bucket (default: "stage").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Environment segment in staged keys (e.g. "dev", "prod").
    pub environment: String,

    /// Access key id, also embedded in warehouse COPY credentials.
    pub access_key_id: String,

    /// Secret access key.
    #[serde(skip_serializing)]
    pub secret_access_key: String,

    /// Custom endpoint for S3-compatible stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Local directory for spool files before upload (default: "temp").
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
}

impl std::fmt::Debug for StagingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("namespace", &self.namespace)
            .field("environment", &self.environment)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("spool_dir", &self.spool_dir)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched per streaming batch (default: 20000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Malformed rows tolerated per load statement (default: 0).
    #[serde(default)]
    pub max_errors: i32,

    /// Relative count discrepancy tolerated by reconciliation (default: 0.01).
    #[serde(default = "default_count_threshold")]
    pub count_threshold: f64,

    /// Maximum source connections (default: 2).
    #[serde(default = "default_pool_size")]
    pub max_source_connections: usize,

    /// Maximum warehouse connections (default: 2).
    #[serde(default = "default_pool_size")]
    pub max_target_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_errors: 0,
            count_threshold: default_count_threshold(),
            max_source_connections: default_pool_size(),
            max_target_connections: default_pool_size(),
        }
    }
}

// Default value functions for serde

fn default_mssql_port() -> u16 {
    1433
}

fn default_redshift_port() -> u16 {
    5439
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_grant_users() -> Vec<String> {
    vec!["etl_user".to_string()]
}

fn default_grant_groups() -> Vec<String> {
    vec!["ro_users".to_string(), "power_users".to_string()]
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_namespace() -> String {
    "stage".to_string()
}

fn default_spool_dir() -> String {
    "temp".to_string()
}

fn default_batch_size() -> usize {
    20_000
}

fn default_count_threshold() -> f64 {
    0.01
}

fn default_pool_size() -> usize {
    2
}

fn default_true() -> bool {
    true
}
