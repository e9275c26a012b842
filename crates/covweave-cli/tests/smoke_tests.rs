//! Smoke tests for the covweave CLI

#![allow(deprecated)] // Command::cargo_bin until assert_cmd settles its replacement
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use covweave::{Body, Instruction, Member, Module, OpCode, SourceSpan, TypeDef};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Command for the covweave binary, isolated from any ambient config
fn covweave(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("covweave").expect("covweave binary should exist");
    cmd.current_dir(dir).env_remove("COVWEAVE_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_module(dir: &Path) -> std::path::PathBuf {
    let at = |line| SourceSpan::line("src/app.cs", line);
    let body = Body::new(vec![
        Instruction::at(OpCode::op("ldarg", 0, 1), at(1)),
        Instruction::at(OpCode::Branch { target: 3, pop: 1 }, at(2)),
        Instruction::at(OpCode::op("call", 0, 0), at(3)),
        Instruction::at(OpCode::Return { pop: 0 }, at(4)),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("Run", body)));
    let path = dir.join("app.mod");
    module.save(&path).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("instrument"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("settings"));
}

#[test]
fn test_no_args_fails() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path()).assert().failure();
}

#[test]
fn test_report_subcommand_help() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .args(["report", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--threshold"));
}

// ============================================================================
// Config and Settings
// ============================================================================

#[test]
fn test_config_init_writes_file_once() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .args(["config", "--init", "covweave.yaml"])
        .assert()
        .success();
    let yaml = fs::read_to_string(dir.path().join("covweave.yaml")).unwrap();
    assert!(yaml.contains("map_path"));

    covweave(dir.path())
        .args(["config", "--init", "covweave.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_settings_prints_environment() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .args(["settings", "--run-id", "nightly", "--hits", "hits"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COVWEAVE_RUN_ID=nightly"))
        .stdout(predicate::str::contains("COVWEAVE_HITS_DIR=hits"));
}

// ============================================================================
// Instrument and Report
// ============================================================================

#[test]
fn test_instrument_then_report_thresholds() {
    let dir = TempDir::new().unwrap();
    let module = write_module(dir.path());

    covweave(dir.path())
        .args(["instrument", "-m", "map.json", "-o", "out"])
        .arg(&module)
        .assert()
        .success()
        .stdout(predicate::str::contains("Instrumented"));
    assert!(Module::load(&dir.path().join("out").join("app.mod"))
        .unwrap()
        .is_instrumented());

    covweave(dir.path())
        .args(["report", "-m", "map.json", "--hits", "hits", "-t", "line:minimum:0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("App"));

    covweave(dir.path())
        .args(["report", "-m", "map.json", "--hits", "hits", "-t", "line:minimum:50"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("FAIL"));
}

#[test]
fn test_report_json_format() {
    let dir = TempDir::new().unwrap();
    let module = write_module(dir.path());
    covweave(dir.path())
        .args(["instrument", "-m", "map.json"])
        .arg(&module)
        .assert()
        .success();

    let output = covweave(dir.path())
        .args(["report", "-m", "map.json", "--hits", "hits", "-f", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["result"]["modules"]["App"].is_object());
}

#[test]
fn test_dry_run_leaves_module_alone() {
    let dir = TempDir::new().unwrap();
    let module = write_module(dir.path());
    covweave(dir.path())
        .args(["instrument", "--dry-run"])
        .arg(&module)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
    assert!(!Module::load(&module).unwrap().is_instrumented());
    assert!(!dir.path().join("target/covweave/coverage.map.json").exists());
}

#[test]
fn test_instrument_missing_module_fails() {
    let dir = TempDir::new().unwrap();
    covweave(dir.path())
        .args(["instrument", "missing.mod"])
        .assert()
        .failure()
        .code(1);
}
