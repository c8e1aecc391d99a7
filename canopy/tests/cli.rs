//! CLI tests for `canopy validate`, `canopy run` and `canopy events`.
//!
//! Spawns the binary against the countdown demo and verifies exit codes and
//! printed reports.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};

use canopy::exit_codes;

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

/// Copy the countdown demo into `dir` so sibling config and logs stay there.
fn stage_demo(dir: &Path) -> (PathBuf, PathBuf) {
    let tree = dir.join("countdown.json");
    let memory = dir.join("countdown.memory.json");
    fs::copy(demo("countdown.json"), &tree).expect("copy tree");
    fs::copy(demo("countdown.memory.json"), &memory).expect("copy memory");
    (tree, memory)
}

fn canopy(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_canopy"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn canopy")
}

fn report(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("run report is JSON")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn validate_accepts_the_demo() {
    let output = canopy(&["validate", path_arg(&demo("countdown.json"))]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
}

#[test]
fn validate_rejects_unknown_kinds_with_location() {
    let temp = tempfile::tempdir().expect("tempdir");
    let tree = temp.path().join("tree.json");
    fs::write(&tree, r#"["sequence", ["action", {"fn": "set", "path": "a", "value": 1}], ["teleport"]]"#)
        .expect("write tree");

    let output = canopy(&["validate", path_arg(&tree)]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("teleport"), "stderr: {stderr}");
    assert!(stderr.contains("root/1"), "stderr: {stderr}");
}

#[test]
fn run_with_event_log_succeeds_and_records_the_launch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tree, memory) = stage_demo(temp.path());
    let events = temp.path().join("events.jsonl");

    let output = canopy(&[
        "run",
        path_arg(&tree),
        "--memory",
        path_arg(&memory),
        "--events",
        path_arg(&events),
    ]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let report = report(&output);
    assert_eq!(report["status"], json!("success"));
    assert_eq!(report["ticks"], json!(3));
    assert_eq!(report["working"]["calls"], json!([2, 1, 0]));

    let listed = canopy(&["events", path_arg(&events), "--tag", "mission:demo"]);
    assert_eq!(listed.status.code(), Some(exit_codes::OK));
    let lines: Vec<Value> = String::from_utf8_lossy(&listed.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("event line"))
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["type"], json!("launched"));
    assert_eq!(lines[0]["body"], json!({"name": "demo"}));
}

#[test]
fn event_log_path_comes_from_sibling_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tree, memory) = stage_demo(temp.path());
    fs::write(
        temp.path().join("canopy.toml"),
        "[event_log]\npath = \"history.jsonl\"\n",
    )
    .expect("write config");

    let output = canopy(&["run", path_arg(&tree), "--memory", path_arg(&memory)]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("history.jsonl").exists());
}

#[test]
fn run_without_event_log_exits_with_failure_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tree, memory) = stage_demo(temp.path());

    let output = canopy(&["run", path_arg(&tree), "--memory", path_arg(&memory)]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert_eq!(report(&output)["status"], json!("failure"));
}

#[test]
fn run_out_of_ticks_exits_with_still_running_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tree, memory) = stage_demo(temp.path());

    let output = canopy(&[
        "run",
        path_arg(&tree),
        "--memory",
        path_arg(&memory),
        "--max-ticks",
        "2",
    ]);
    assert_eq!(output.status.code(), Some(exit_codes::STILL_RUNNING));
    let report = report(&output);
    assert_eq!(report["status"], json!("running"));
    assert_eq!(report["ticks"], json!(2));
    assert_eq!(report["working"]["remaining"], json!(0));
}

#[test]
fn run_rejects_non_object_memory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tree, _) = stage_demo(temp.path());
    let memory = temp.path().join("seed.json");
    fs::write(&memory, "[1, 2]").expect("write seed");

    let output = canopy(&["run", path_arg(&tree), "--memory", path_arg(&memory)]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn events_on_a_missing_log_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = canopy(&["events", path_arg(&temp.path().join("none.jsonl"))]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
