//! Integration tests for the mcpscout binary
//!
//! Every test runs the compiled binary in its own project directory with a
//! scrubbed environment, so no test reaches a real provider or repository.

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

const SCANNING_CONFIG: &str = r#"
[sources]
scan_roots = ["sources"]

[budget]
item_delay_ms = 0
"#;

fn mcpscout(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mcpscout"));
    cmd.current_dir(dir).stdin(Stdio::null());
    for var in [
        "ANTHROPIC_API_KEY",
        "GITHUB_TOKEN",
        "MCPSCOUT_SCAN_ROOTS",
        "MCPSCOUT_PRIMARY_SOURCES",
        "MCPSCOUT_CUTOFF",
        "MCPSCOUT_MAX_RUNTIME_SECS",
        "MCPSCOUT_STATE_DIR",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// A project root with `.mcpscout/config.toml` and a `.git` discovery boundary
fn project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::create_dir_all(dir.path().join(".mcpscout/state")).unwrap();
    fs::write(dir.path().join(".mcpscout/config.toml"), config).unwrap();
    dir
}

fn flags_path(dir: &Path) -> std::path::PathBuf {
    dir.join(".mcpscout/state/flags.json")
}

#[test]
fn test_help_lists_subcommands() {
    let dir = project("");
    mcpscout(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("reset"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_show_attributes_sources() {
    let dir = project(SCANNING_CONFIG);
    mcpscout(dir.path())
        .args(["--max-runtime-secs", "120", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"sources\.scan_roots\s+= sources  \[file ").unwrap())
        .stdout(predicate::str::is_match(r"budget\.max_runtime_secs\s+= 120  \[cli\]").unwrap())
        .stdout(
            predicate::str::is_match(r"files\.entries\s+= data/servers\.yaml  \[default\]")
                .unwrap(),
        );
}

#[test]
fn test_invalid_config_value_exits_with_cli_args_code() {
    let dir = project("[format]\nindent_width = 0\n");
    mcpscout(dir.path())
        .args(["config", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("format.indent_width"));
}

#[test]
fn test_run_without_sources_is_config_missing() {
    let dir = project("");
    mcpscout(dir.path())
        .env("ANTHROPIC_API_KEY", "test-key")
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no primary source or scan root configured"));

    assert!(!flags_path(dir.path()).exists());
}

#[test]
fn test_run_without_api_key_is_config_missing() {
    let dir = project(SCANNING_CONFIG);
    mcpscout(dir.path())
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn test_run_without_rules_file_is_config_missing() {
    let dir = project(SCANNING_CONFIG);
    mcpscout(dir.path())
        .env("ANTHROPIC_API_KEY", "test-key")
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("rules file"));
}

#[test]
fn test_run_refused_while_another_invocation_holds_the_lock() {
    let dir = project(SCANNING_CONFIG);
    fs::write(dir.path().join(".mcpscout/rules.md"), "Describe each server.").unwrap();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    // this test process is alive, so the lock is not stale
    let lock = format!(
        r#"{{"pid": {}, "created_at": {now}, "mcpscout_version": "0.4.0"}}"#,
        std::process::id()
    );
    fs::write(dir.path().join(".mcpscout/state/run.lock"), lock).unwrap();

    mcpscout(dir.path())
        .env("ANTHROPIC_API_KEY", "test-key")
        .arg("run")
        .assert()
        .code(9)
        .stderr(predicate::str::contains("Another invocation is running"));
}

#[test]
fn test_status_json_on_fresh_project() {
    let dir = project(SCANNING_CONFIG);
    let output = mcpscout(dir.path())
        .args(["status", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["queue_length"], 0);
    assert_eq!(status["pending_continuations"], serde_json::json!([]));
    assert!(status.get("corrupt").is_none());
}

#[test]
fn test_status_reports_corrupt_state_without_touching_it() {
    let dir = project(SCANNING_CONFIG);
    let flags = r#"{"queue": "not an envelope"}"#;
    fs::write(flags_path(dir.path()), flags).unwrap();

    mcpscout(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase: idle"))
        .stdout(predicate::str::contains("Checkpoint state is corrupt"));

    assert_eq!(fs::read_to_string(flags_path(dir.path())).unwrap(), flags);
}

#[test]
fn test_status_reports_unparseable_flag_file() {
    let dir = project(SCANNING_CONFIG);
    let flags = r#"{"queue": "#;
    fs::write(flags_path(dir.path()), flags).unwrap();

    mcpscout(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase: idle"))
        .stdout(predicate::str::contains("flags.json"));

    assert_eq!(fs::read_to_string(flags_path(dir.path())).unwrap(), flags);

    mcpscout(dir.path())
        .args(["reset", "--yes"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(flags_path(dir.path())).unwrap(), "{}");
}

#[test]
fn test_reset_without_confirmation_keeps_state() {
    let dir = project(SCANNING_CONFIG);
    let flags = r#"{"queue": "not an envelope"}"#;
    fs::write(flags_path(dir.path()), flags).unwrap();

    mcpscout(dir.path())
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset cancelled."));

    assert_eq!(fs::read_to_string(flags_path(dir.path())).unwrap(), flags);
}

#[test]
fn test_reset_yes_clears_every_marker() {
    let dir = project(SCANNING_CONFIG);
    fs::write(
        flags_path(dir.path()),
        r#"{"queue": "not an envelope", "retry": "also not an envelope"}"#,
    )
    .unwrap();

    mcpscout(dir.path())
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkpoint state cleared"));

    let flags: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(flags_path(dir.path())).unwrap()).unwrap();
    assert!(flags.is_empty());
    assert!(!dir.path().join(".mcpscout/state/run.lock").exists());
}
