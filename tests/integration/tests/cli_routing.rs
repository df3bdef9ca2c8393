//! CLI binary integration tests.
//!
//! These tests exercise the compiled `gatelink` binary to verify that
//! top-level command routing, help text, and error handling work as expected.
//! They are skipped when the binary has not been built yet.

use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

/// Locate the compiled `gatelink` binary in the workspace target directory.
fn gatelink_bin() -> Option<PathBuf> {
    let target = match std::env::var_os("CARGO_TARGET_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            // tests/integration -> workspace root
            let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            manifest_dir.parent()?.parent()?.join("target")
        }
    };
    let bin = target
        .join("debug")
        .join(format!("gatelink{}", std::env::consts::EXE_SUFFIX));
    if bin.exists() {
        Some(bin)
    } else {
        eprintln!(
            "gatelink binary not found at {}; run `cargo build -p gatelink-cli` first",
            bin.display()
        );
        None
    }
}

fn gatelink_cmd() -> Option<Command> {
    let mut cmd = Command::new(gatelink_bin()?);
    cmd.env_remove("GATELINK_URL")
        .env_remove("GATELINK_TOKEN")
        .env_remove("GATELINK_CONFIG");
    Some(cmd)
}

#[test]
fn test_cli_version() {
    let Some(mut cmd) = gatelink_cmd() else { return };
    let output = cmd.arg("version").output().expect("failed to run gatelink");
    assert!(output.status.success(), "version command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("gatelink"),
        "version output should contain 'gatelink', got: {}",
        stdout
    );
}

#[test]
fn test_cli_help() {
    let Some(mut cmd) = gatelink_cmd() else { return };
    let output = cmd.arg("--help").output().expect("failed to run gatelink");
    assert!(output.status.success(), "--help should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["watch", "call", "chat", "identity", "config"] {
        assert!(
            stdout.contains(command),
            "help output should mention '{}', got: {}",
            command,
            stdout
        );
    }
}

#[test]
fn test_cli_unknown_command() {
    let Some(mut cmd) = gatelink_cmd() else { return };
    let output = cmd
        .arg("nonexistent-command")
        .output()
        .expect("failed to run gatelink");
    assert!(
        !output.status.success(),
        "unknown command should return non-zero exit code"
    );
}

#[test]
fn test_cli_config_init_and_path() {
    let Some(mut cmd) = gatelink_cmd() else { return };
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let output = cmd
        .args(["config", "init", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run gatelink config init");
    assert!(output.status.success(), "config init should succeed");
    assert!(path.exists(), "config init should write {}", path.display());

    let output = gatelink_cmd()
        .unwrap()
        .args(["config", "get", "reconnect.initial_delay_ms", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run gatelink config get");
    assert!(output.status.success(), "config get should succeed");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1000");
}

#[test]
fn test_cli_call_rejects_bad_params() {
    let Some(mut cmd) = gatelink_cmd() else { return };
    let output = cmd
        .args(["call", "status", "--params", "[1,2,3]"])
        .output()
        .expect("failed to run gatelink call");
    assert!(!output.status.success(), "non-object params should fail");
}
