//! Smoke tests for the covtrack CLI
//!
//! These tests verify basic CLI functionality works correctly.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the covtrack binary
fn covtrack() -> Command {
    let mut cmd = Command::cargo_bin("covtrack").expect("covtrack binary should exist");
    let _ = cmd.env_remove("RUST_LOG");
    cmd
}

fn write_scripts(dir: &Path) -> Vec<PathBuf> {
    let files = [
        ("one.lua", "local function sum(a, b)\n  return a + b\nend\nassert(sum(1, 2) == 3)\n"),
        ("two.lua", "local n = 0\nwhile n < 3 do\n  n = n + 1\nend\n"),
        ("three.lua", "local t = { 1, 2, 3 }\nfor _, v in ipairs(t) do\n  print(v)\nend\n"),
    ];
    files
        .iter()
        .map(|(name, src)| {
            let path = dir.join(name);
            fs::write(&path, src).unwrap();
            path
        })
        .collect()
}

fn summary_of(store: &Path) -> serde_json::Value {
    let output = covtrack()
        .args(["report", "--format", "json"])
        .arg(store)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    report["summary"].clone()
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    covtrack()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    covtrack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("coverage"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("merge"));
}

#[test]
fn test_no_args_shows_help() {
    covtrack().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    covtrack()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--shard"))
        .stdout(predicate::str::contains("--jobs"));
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn test_run_prints_table() {
    let dir = TempDir::new().unwrap();
    write_scripts(dir.path());
    covtrack()
        .args(["--color", "never", "run"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("one.lua"))
        .stdout(predicate::str::contains("Total"))
        .stdout(predicate::str::contains("100%"));
}

#[test]
fn test_run_json_report() {
    let dir = TempDir::new().unwrap();
    let files = write_scripts(dir.path());
    covtrack()
        .args(["run", "--format", "json", "--strategy", "instrument"])
        .arg(&files[0])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"execution_coverage_percent\": 100"))
        .stdout(predicate::str::contains("\"function_coverage_percent\": 100"));
}

#[test]
fn test_failing_script_still_writes_store() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.lua");
    fs::write(&bad, "local x = 1\nerror('nope')\n").unwrap();
    let store = dir.path().join("store.json");
    covtrack()
        .args(["-q", "run"])
        .arg(&bad)
        .arg("--output")
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 scripts failed"));
    assert!(store.exists());
    assert_eq!(summary_of(&store)["executed_lines"], 2);
}

#[test]
fn test_invalid_shard_rejected() {
    covtrack()
        .args(["run", "a.lua", "--shard", "5/4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds total"));
}

#[test]
fn test_empty_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    covtrack()
        .arg("run")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .lua scripts found"));
}

// ============================================================================
// Shards, workers and merge
// ============================================================================

#[test]
fn test_shards_merge_to_single_run() {
    let dir = TempDir::new().unwrap();
    write_scripts(dir.path());
    let whole = dir.path().join("whole.json");
    covtrack()
        .args(["-q", "run"])
        .arg(dir.path())
        .arg("-o")
        .arg(&whole)
        .assert()
        .success();

    let mut parts = Vec::new();
    for shard in ["1/2", "2/2"] {
        let out = dir.path().join(format!("part-{}.json", &shard[..1]));
        covtrack()
            .args(["-q", "run", "--shard", shard])
            .arg(dir.path())
            .arg("-o")
            .arg(&out)
            .assert()
            .success();
        parts.push(out);
    }

    let merged = dir.path().join("merged.json");
    covtrack()
        .arg("merge")
        .args(&parts)
        .arg("-o")
        .arg(&merged)
        .assert()
        .success()
        .stderr(predicate::str::contains("merged 2 stores"));

    assert_eq!(summary_of(&merged), summary_of(&whole));
}

#[test]
fn test_jobs_spawn_workers() {
    let dir = TempDir::new().unwrap();
    write_scripts(dir.path());
    let single = dir.path().join("single.json");
    let parallel = dir.path().join("parallel.json");
    covtrack()
        .args(["-q", "run"])
        .arg(dir.path())
        .arg("-o")
        .arg(&single)
        .assert()
        .success();
    covtrack()
        .args(["-q", "run", "--jobs", "3"])
        .arg(dir.path())
        .arg("-o")
        .arg(&parallel)
        .assert()
        .success();
    assert_eq!(summary_of(&parallel), summary_of(&single));
}

#[test]
fn test_merge_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    covtrack()
        .args(["merge", "missing.json", "-o"])
        .arg(dir.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

// ============================================================================
// Report and analyze
// ============================================================================

#[test]
fn test_report_lists_uncovered_lines() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("partial.lua");
    fs::write(&script, "local x = 1\nif x > 2 then\n  print('big')\nend\n").unwrap();
    let store = dir.path().join("s.json");
    covtrack()
        .args(["-q", "run"])
        .arg(&script)
        .arg("-o")
        .arg(&store)
        .assert()
        .success();
    covtrack()
        .args(["--color", "never", "report", "--uncovered"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("not run: 3"));
}

#[test]
fn test_analyze_shows_line_kinds() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("c.lua");
    fs::write(&script, "local a = 1\n--[[\n  a = 2\n]]\nprint(a)\n").unwrap();
    covtrack()
        .arg("analyze")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("    2   multiline_comment"))
        .stdout(predicate::str::contains("5 lines, 2 executable"));
}

#[test]
fn test_analyze_parse_error() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("bad.lua");
    fs::write(&script, "local = 1\n").unwrap();
    covtrack()
        .arg("analyze")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parse error"));
}
