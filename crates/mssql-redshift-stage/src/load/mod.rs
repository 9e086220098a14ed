//! Warehouse bulk loads from staged files.
//!
//! Statement planning is pure and fully testable without a connection;
//! execution runs the planned statements in one transaction per load. The
//! incremental path realizes upsert-by-key semantics without a native upsert
//! primitive: load into a temporary shadow table, delete overlapping keys,
//! insert the merged rows.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Result, StageError};
use crate::target::WarehousePool;

/// Name of the temporary shadow table used by incremental merges.
const MERGE_STAGE_TABLE: &str = "merge_stage";

/// Options for one bulk load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Merge by key into an existing table instead of full refresh.
    pub incremental: bool,
    /// The staged file is gzip-compressed.
    pub compressed: bool,
    /// The staged location is a manifest document, not a data file.
    pub manifest: bool,
    /// Strip surrounding quotes during the load.
    pub remove_quotes: bool,
    /// The staged file is a self-describing tabular format; omit the
    /// delimiter clause and let the decoder infer it.
    pub fixed_format: bool,
    /// Field delimiter of the staged file.
    pub delimiter: char,
    /// Malformed rows tolerated before the load statement fails.
    pub max_errors: i32,
    /// Business key columns for the incremental merge. Required when
    /// `incremental` is set.
    pub key_fields: Option<Vec<String>>,
}

impl LoadOptions {
    /// Reject option combinations before any side effect occurs.
    ///
    /// An incremental load without key fields is a configuration error; the
    /// pipeline checks this before issuing any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.incremental && self.key_fields.as_deref().unwrap_or_default().is_empty() {
            return Err(StageError::Config(
                "incremental loads require key fields".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            incremental: false,
            compressed: true,
            manifest: false,
            remove_quotes: false,
            fixed_format: false,
            delimiter: '\t',
            max_errors: 0,
            key_fields: None,
        }
    }
}

/// Object-store credentials embedded in COPY statements.
#[derive(Clone)]
pub struct CopyCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl CopyCredentials {
    fn clause(&self) -> String {
        format!(
            "CREDENTIALS 'aws_access_key_id={};aws_secret_access_key={}'",
            self.access_key_id, self.secret_access_key
        )
    }
}

impl std::fmt::Debug for CopyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// The planned statement sequence for one load.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub statements: Vec<String>,
    secret: String,
}

impl LoadPlan {
    /// The full statement text with the secret access key blanked, for
    /// failure logs.
    pub fn redacted(&self) -> String {
        self.statements
            .join("\n")
            .replace(&self.secret, "[REDACTED]")
    }
}

/// Plan the statements for one load.
///
/// Fails before producing any SQL when an incremental load is requested
/// without key fields.
pub fn build_load_plan(
    target_table: &str,
    staged_url: &str,
    credentials: &CopyCredentials,
    opts: &LoadOptions,
) -> Result<LoadPlan> {
    opts.validate()?;
    let key_fields = opts.key_fields.as_deref().unwrap_or_default();

    let mut statements = Vec::new();

    if opts.incremental {
        statements.push(format!(
            "drop table if exists {stage};\ncreate temporary table {stage} (like {table});",
            stage = MERGE_STAGE_TABLE,
            table = target_table
        ));
        statements.push(copy_statement(MERGE_STAGE_TABLE, staged_url, credentials, opts));
        statements.push(merge_statement(target_table, key_fields));
    } else {
        statements.push(format!("delete from {};", target_table));
        statements.push(copy_statement(target_table, staged_url, credentials, opts));
    }

    Ok(LoadPlan {
        statements,
        secret: credentials.secret_access_key.clone(),
    })
}

fn copy_statement(
    destination: &str,
    staged_url: &str,
    credentials: &CopyCredentials,
    opts: &LoadOptions,
) -> String {
    let mut lines = vec![
        format!("COPY {} FROM '{}'", destination, staged_url),
        credentials.clause(),
    ];

    if !opts.fixed_format {
        lines.push(format!("delimiter '{}'", render_delimiter(opts.delimiter)));
    }

    lines.push("dateformat 'YYYY-MM-DD'".to_string());
    lines.push("NULL AS 'None'".to_string());
    lines.push("truncatecolumns".to_string());
    lines.push(format!("maxerror {}", opts.max_errors));

    let mut extras = Vec::new();
    if opts.compressed {
        extras.push("GZIP");
    }
    if opts.manifest {
        extras.push("MANIFEST");
    }
    if opts.remove_quotes {
        extras.push("REMOVEQUOTES");
    }
    if !extras.is_empty() {
        lines.push(extras.join(" "));
    }

    format!("{};", lines.join("\n"))
}

fn merge_statement(target_table: &str, key_fields: &[String]) -> String {
    let join = key_fields
        .iter()
        .map(|k| format!("{stage}.{k} = {table}.{k}", stage = MERGE_STAGE_TABLE, table = target_table, k = k))
        .collect::<Vec<_>>()
        .join(" and ");

    format!(
        "delete from {table}\nwhere exists\n  ( select 1\n    from {stage}\n    where {join});\n\
         insert into {table}\nselect * from {stage};",
        table = target_table,
        stage = MERGE_STAGE_TABLE,
        join = join
    )
}

fn render_delimiter(delimiter: char) -> String {
    match delimiter {
        '\t' => "\\t".to_string(),
        other => other.to_string(),
    }
}

/// Executes planned loads and re-applies access grants.
pub struct BulkLoader {
    target: Arc<WarehousePool>,
    credentials: CopyCredentials,
    grant_users: Vec<String>,
    grant_groups: Vec<String>,
}

impl BulkLoader {
    pub fn new(
        target: Arc<WarehousePool>,
        credentials: CopyCredentials,
        grant_users: Vec<String>,
        grant_groups: Vec<String>,
    ) -> Self {
        Self {
            target,
            credentials,
            grant_users,
            grant_groups,
        }
    }

    /// Load a staged file into the target table.
    ///
    /// The planned statements run in one transaction. A failed statement is
    /// logged with the full offending text (secret redacted) and re-raised.
    pub async fn load(
        &self,
        target_table: &str,
        staged_url: &str,
        opts: &LoadOptions,
    ) -> Result<()> {
        let plan = build_load_plan(target_table, staged_url, &self.credentials, opts)?;

        info!("Starting copy to {}", target_table);
        if let Err(e) = self.target.execute_in_transaction(&plan.statements).await {
            error!("Load failed: {}\nOffending sql:\n{}", e, plan.redacted());
            return Err(StageError::load(target_table, e));
        }

        // Every load is followed by the grant step, not just creation: a
        // full-refresh must not leave prior grants stale when the backend
        // revokes grants on drop.
        let grants = self.grant_statements(target_table);
        if !grants.is_empty() {
            info!("Granting access on {}", target_table);
            self.target.execute(&grants.join("\n")).await?;
        }

        info!("Copy complete for {}", target_table);
        Ok(())
    }

    fn grant_statements(&self, target_table: &str) -> Vec<String> {
        let mut statements = Vec::new();
        for user in &self.grant_users {
            statements.push(format!("grant all on {} to {};", target_table, user));
        }
        for group in &self.grant_groups {
            statements.push(format!("grant all on {} to group {};", target_table, group));
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> CopyCredentials {
        CopyCredentials {
            access_key_id: "AKIA123".to_string(),
            secret_access_key: "sekrit".to_string(),
        }
    }

    #[test]
    fn test_validate_requires_keys_only_for_incremental() {
        assert!(LoadOptions::default().validate().is_ok());

        let with_keys = LoadOptions {
            incremental: true,
            key_fields: Some(vec!["id".to_string()]),
            ..LoadOptions::default()
        };
        assert!(with_keys.validate().is_ok());
    }

    #[test]
    fn test_incremental_without_keys_is_config_error() {
        let opts = LoadOptions {
            incremental: true,
            key_fields: None,
            ..LoadOptions::default()
        };
        let err = build_load_plan("public.t", "s3://b/k", &creds(), &opts).unwrap_err();
        assert!(matches!(err, StageError::Config(_)));

        let opts = LoadOptions {
            incremental: true,
            key_fields: Some(vec![]),
            ..LoadOptions::default()
        };
        assert!(build_load_plan("public.t", "s3://b/k", &creds(), &opts).is_err());
    }

    #[test]
    fn test_full_refresh_plan() {
        let opts = LoadOptions::default();
        let plan = build_load_plan("public.t", "s3://b/k/output.tsv.gz", &creds(), &opts).unwrap();

        assert_eq!(plan.statements.len(), 2);
        assert_eq!(plan.statements[0], "delete from public.t;");

        let copy = &plan.statements[1];
        assert!(copy.starts_with("COPY public.t FROM 's3://b/k/output.tsv.gz'"));
        assert!(copy.contains("CREDENTIALS 'aws_access_key_id=AKIA123;aws_secret_access_key=sekrit'"));
        assert!(copy.contains("delimiter '\\t'"));
        assert!(copy.contains("dateformat 'YYYY-MM-DD'"));
        assert!(copy.contains("NULL AS 'None'"));
        assert!(copy.contains("truncatecolumns"));
        assert!(copy.contains("maxerror 0"));
        assert!(copy.contains("GZIP"));
        assert!(!copy.contains("MANIFEST"));
        assert!(!copy.contains("REMOVEQUOTES"));
    }

    #[test]
    fn test_copy_option_flags() {
        let opts = LoadOptions {
            compressed: false,
            manifest: true,
            remove_quotes: true,
            max_errors: 10,
            delimiter: '|',
            ..LoadOptions::default()
        };
        let plan = build_load_plan("t", "s3://b/m", &creds(), &opts).unwrap();
        let copy = &plan.statements[1];

        assert!(copy.contains("delimiter '|'"));
        assert!(copy.contains("maxerror 10"));
        assert!(!copy.contains("GZIP"));
        assert!(copy.contains("MANIFEST REMOVEQUOTES"));
    }

    #[test]
    fn test_fixed_format_omits_delimiter() {
        let opts = LoadOptions {
            fixed_format: true,
            ..LoadOptions::default()
        };
        let plan = build_load_plan("t", "s3://b/k", &creds(), &opts).unwrap();
        assert!(!plan.statements[1].contains("delimiter"));
    }

    #[test]
    fn test_incremental_plan_merges_by_key() {
        let opts = LoadOptions {
            incremental: true,
            key_fields: Some(vec!["id".to_string(), "region".to_string()]),
            ..LoadOptions::default()
        };
        let plan = build_load_plan("public.t", "s3://b/k", &creds(), &opts).unwrap();

        assert_eq!(plan.statements.len(), 3);
        assert!(plan.statements[0].contains("drop table if exists merge_stage;"));
        assert!(plan.statements[0].contains("create temporary table merge_stage (like public.t);"));
        assert!(plan.statements[1].starts_with("COPY merge_stage FROM"));

        let merge = &plan.statements[2];
        assert!(merge.contains("delete from public.t"));
        assert!(merge.contains("merge_stage.id = public.t.id and merge_stage.region = public.t.region"));
        assert!(merge.contains("insert into public.t"));
        assert!(merge.contains("select * from merge_stage;"));
    }

    #[test]
    fn test_redacted_plan_hides_secret() {
        let opts = LoadOptions::default();
        let plan = build_load_plan("t", "s3://b/k", &creds(), &opts).unwrap();

        let redacted = plan.redacted();
        assert!(!redacted.contains("sekrit"));
        assert!(redacted.contains("aws_secret_access_key=[REDACTED]"));
        // The statement shape survives redaction for diagnosis.
        assert!(redacted.contains("COPY t FROM 's3://b/k'"));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sekrit"));
    }
}
