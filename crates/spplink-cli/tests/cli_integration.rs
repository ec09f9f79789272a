//! CLI Integration Tests
//!
//! These tests run the `spplink` binary and check argument handling, help
//! output and the config subcommand. None of them touch a Bluetooth adapter.
//!
//! ```
//! cargo test --package spplink-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

/// Run spplink with a throwaway config directory and return its output
fn run_spplink(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spplink"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("SPPLINK_DEVICE")
        .env_remove("NO_COLOR")
        .output()
        .expect("Failed to run spplink binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["--help"]);

    assert!(output.status.success(), "Help should succeed");
    let out = stdout(&output);
    assert!(out.contains("connect"), "Help should list connect command");
    assert!(out.contains("scan"), "Help should list scan command");
    assert!(out.contains("config"), "Help should list config command");
    assert!(out.contains("completions"));
}

#[test]
fn test_version_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_connect_help_shows_options() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["connect", "--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("--name"));
    assert!(out.contains("--ignore-case"));
    assert!(out.contains("--retries"));
    assert!(out.contains("--channel-timeout"));
    assert!(out.contains("--connect-timeout"));
}

#[test]
fn test_scan_help_shows_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["scan", "--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("--json"));
    assert!(out.contains("--timeout"));
}

// =============================================================================
// Argument Validation
// =============================================================================

#[test]
fn test_zero_timeout_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["scan", "--timeout", "0"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("--timeout"));
}

#[test]
fn test_oversized_timeout_rejected_before_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["connect", "-t", "18446744073709551615"]);

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    assert!(!stderr(&output).contains("panicked"));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["-v", "-q", "config", "path"]);

    assert!(!output.status.success());
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["pair"]);

    assert!(!output.status.success());
}

// =============================================================================
// Completions
// =============================================================================

#[test]
fn test_bash_completions() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["completions", "bash"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("spplink"));
    assert!(out.contains("connect"));
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_config_path_ends_with_config_toml() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["config", "path"]);

    assert!(output.status.success());
    assert!(stdout(&output).trim().ends_with("config.toml"));
}

#[test]
fn test_config_show_empty() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["config", "show"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("(no configuration set)"));
}

#[test]
fn test_config_get_unset_key() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["config", "get", "device"]);

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "(not set)");
}

#[test]
fn test_config_rejects_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["config", "get", "colour"]);

    assert!(!output.status.success());
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_set_get_unset() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_spplink(
        dir.path(),
        &["--no-color", "config", "set", "device", "Robot Arm"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("spplink").join("config.toml").exists());

    let output = run_spplink(dir.path(), &["config", "get", "device"]);
    assert_eq!(stdout(&output).trim(), "Robot Arm");

    let output = run_spplink(dir.path(), &["config", "show"]);
    assert!(stdout(&output).contains("device = \"Robot Arm\""));

    let output = run_spplink(dir.path(), &["config", "unset", "device"]);
    assert!(output.status.success());

    let output = run_spplink(dir.path(), &["config", "get", "device"]);
    assert_eq!(stdout(&output).trim(), "(not set)");
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_set_rejects_zero_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_spplink(dir.path(), &["config", "set", "timeout", "0"]);

    assert!(!output.status.success());
    assert!(!dir.path().join("spplink").join("config.toml").exists());
}
