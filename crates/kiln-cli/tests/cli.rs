//! Tests for the `kiln` binary.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn kiln() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
    for var in ["KILN_MODE", "KILN_DEV_PORT", "KILN_DEV_ROOT", "KILN_BUNDLER_COMMAND"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_dev_command() {
    kiln()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn test_missing_bundler_exits_non_zero() {
    let project = TempDir::new().unwrap();
    let port = common::free_port().to_string();

    kiln()
        .current_dir(project.path())
        .args([
            "dev",
            "--root",
            ".",
            "--port",
            &port,
            "--bundler",
            "/nonexistent/esbuild",
            "--output",
            "stream",
            "--open",
            "none",
            "--no-color",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/esbuild"));
}

#[test]
fn test_invalid_config_exits_non_zero() {
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join("kiln.toml"),
        "[bundler]\nentryPoints = []\n",
    )
    .unwrap();

    kiln()
        .current_dir(project.path())
        .args(["dev", "--open", "none", "--no-color"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_missing_root_exits_non_zero() {
    let project = TempDir::new().unwrap();

    kiln()
        .current_dir(project.path())
        .args(["dev", "--root", "does-not-exist", "--open", "none"])
        .assert()
        .failure();
}
