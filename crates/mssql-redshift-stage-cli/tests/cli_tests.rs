//! CLI integration tests for mssql-redshift-stage.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mssql-redshift-stage binary.
fn cmd() -> Command {
    Command::cargo_bin("mssql-redshift-stage").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_table_pair_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--source-tables"))
        .stdout(predicate::str::contains("--target-tables"))
        .stdout(predicate::str::contains("--incremental"))
        .stdout(predicate::str::contains("--key-fields"))
        .stdout(predicate::str::contains("--date-fields"))
        .stdout(predicate::str::contains("--from-date"))
        .stdout(predicate::str::contains("--source-system"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mssql-redshift-stage"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_log_flags_have_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_missing_required_table_flags_fails() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--source-tables"));
}

#[test]
fn test_mismatched_table_pair_counts_exits_with_config_code() {
    cmd()
        .args([
            "--source-tables",
            "dbo.a",
            "dbo.b",
            "--target-tables",
            "public.a",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("must match"));
}

#[test]
fn test_unparseable_from_date_exits_with_config_code() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "source:\n  host: h\n  database: d\n  user: u\n  password: p\n\
         target:\n  host: h\n  database: d\n  user: u\n  password: p\n\
         staging:\n  bucket: b\n  environment: dev\n  access_key_id: k\n  secret_access_key: s\n"
    )
    .unwrap();

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--source-tables",
            "dbo.a",
            "--target-tables",
            "public.a",
            "--from-date",
            "next tuesday",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--from-date"));
}

// =============================================================================
// Config Error Tests
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--source-tables",
            "dbo.a",
            "--target-tables",
            "public.a",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_incomplete_config_exits_with_config_code() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: mssql.internal").unwrap();

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--source-tables",
            "dbo.a",
            "--target-tables",
            "public.a",
        ])
        .assert()
        .failure();
}
