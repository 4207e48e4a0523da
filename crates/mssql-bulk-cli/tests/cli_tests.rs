//! CLI integration tests for mssql-bulk.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that fail before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mssql-bulk binary.
fn cmd() -> Command {
    Command::cargo_bin("mssql-bulk").unwrap()
}

/// A config file pointing at a port nothing listens on.
fn unreachable_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connection:").unwrap();
    writeln!(file, "  host: 127.0.0.1").unwrap();
    writeln!(file, "  port: 1").unwrap();
    writeln!(file, "  database: school").unwrap();
    writeln!(file, "  user: loader").unwrap();
    writeln!(file, "  password: secret").unwrap();
    writeln!(file, "  encrypt: false").unwrap();
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
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_load_subcommand_help() {
    cmd()
        .args(["load", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--operation"))
        .stdout(predicate::str::contains("--primary-keys"))
        .stdout(predicate::str::contains("--fields"))
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--batch-size"));
}

#[test]
fn test_operation_values_listed() {
    cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("insert"))
        .stdout(predicate::str::contains("upsert"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mssql-bulk"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connection:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_non_temp_staging_table_exits_with_code_1() {
    let mut file = unreachable_config();
    writeln!(file, "writer:").unwrap();
    writeln!(file, "  staging_table: Staging").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("writer.staging_table"));
}

#[test]
fn test_upsert_without_match_fields_exits_before_connecting() {
    let config = unreachable_config();
    let mut input = tempfile::NamedTempFile::new().unwrap();
    writeln!(input, r#"[{{"StudentId": 1}}]"#).unwrap();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--table",
            "Students",
            "--operation",
            "upsert",
            "--primary-keys",
            "StudentId",
            "--input",
            input.path().to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("fields_to_match"));
}

#[test]
fn test_delete_without_primary_keys_exits_with_code_1() {
    let config = unreachable_config();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "plan",
            "--table",
            "Students",
            "--operation",
            "delete",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("primary_keys"));
}

#[test]
fn test_missing_input_file_exits_with_code_7() {
    let config = unreachable_config();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "load",
            "--table",
            "Students",
            "--operation",
            "insert",
            "--input",
            "no_such_rows.json",
        ])
        .assert()
        .code(7);
}

#[test]
fn test_unreachable_server_exits_with_code_2() {
    let config = unreachable_config();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "describe",
            "--table",
            "Students",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Connection error"));
}

#[test]
fn test_health_check_reports_failure_as_json() {
    let config = unreachable_config();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "--output-json",
            "health-check",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"healthy\": false"));
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
