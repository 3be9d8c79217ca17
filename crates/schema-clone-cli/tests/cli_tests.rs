//! CLI integration tests for schema-clone.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for errors raised before any database is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the schema-clone binary.
fn cmd() -> Command {
    Command::cargo_bin("schema-clone").unwrap()
}

/// Two distinct SQL Server connections cloning dbo -> archive.
const VALID_CONFIG: &str = r#"
source:
  type: mssql
  host: db01
  database: sales
  user: sa
  password: secret
target:
  type: mssql
  host: db02
  database: sales_backup
  user: sa
  password: secret
clone:
  source_schema: dbo
  target_schema: archive
  tables: [Orders]
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clone"))
        .stdout(predicate::str::contains("deps"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_clone_subcommand_help() {
    cmd()
        .args(["clone", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--source-schema"))
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--expand"))
        .stdout(predicate::str::contains("--create-schemas"))
        .stdout(predicate::str::contains("--skip-shared"));
}

#[test]
fn test_deps_subcommand_help() {
    cmd()
        .args(["deps", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--direction"))
        .stdout(predicate::str::contains("[default: ascending]"))
        .stdout(predicate::str::contains("--scoped"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema-clone"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Configuration Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let file = config_file("source:\n  type: mssql\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_self_clone_config_rejected() {
    let file = config_file(
        "source: { type: postgres, host: pg, database: app, user: app }\n",
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "clone"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("same connection"));
}

#[test]
fn test_cross_engine_config_rejected() {
    let file = config_file(&VALID_CONFIG.replacen("type: mssql", "type: postgres", 1));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "clone"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("differ"));
}

#[test]
fn test_half_schema_override_rejected() {
    let file = config_file(
        "source: { type: mssql, host: db01, database: sales, user: sa }\n\
         target: { type: mssql, host: db02, database: backup, user: sa }\n",
    );

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "clone",
            "--source-schema",
            "dbo",
            "--table",
            "Orders",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("must be set together"));
}

#[test]
fn test_malformed_table_override_rejected() {
    let file = config_file(VALID_CONFIG);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "clone",
            "--table",
            "a.b.c",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Malformed table name"));
}

#[test]
fn test_invalid_direction_rejected() {
    let file = config_file(VALID_CONFIG);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "deps",
            "--table",
            "Orders",
            "--direction",
            "sideways",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid direction"));
}
