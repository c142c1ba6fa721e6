//! CLI contract tests.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;

fn main_source() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/main.rs");
    match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => panic!("main source should load from {}: {err}", path.display()),
    }
}

/// The binary pointed at a database inside `dir`, isolated from any local config.
fn smsrelay(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("smsrelay").expect("binary should build");
    cmd.current_dir(dir)
        .env("SMSRELAY_CONFIG_PATH", dir.join("absent.toml"))
        .env("SMSRELAY_DB_PATH", dir.join("relay.db"))
        .env("SMSRELAY_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("stdout should be utf-8")
}

#[test]
fn main_defines_primary_subcommands() {
    let source = main_source();
    for name in ["Serve", "Worker", "Submit", "Status", "Blacklist", "Reconcile"] {
        assert!(source.contains(name), "missing subcommand {name}");
    }
}

#[test]
fn submit_then_status_reports_pending() {
    let tmp = tempfile::tempdir().expect("should create temp dir");

    let submitted = stdout_of(smsrelay(tmp.path()).args([
        "submit",
        "--phone",
        "+15550001",
        "--message",
        "hello from the cli",
    ]));
    let receipt: Value = serde_json::from_str(&submitted).expect("receipt should be json");
    assert_eq!(receipt["enqueued"], true);
    let request_id = receipt["request_id"]
        .as_str()
        .expect("request_id should be a string")
        .to_owned();

    let status = stdout_of(smsrelay(tmp.path()).args(["status", &request_id]));
    let record: Value = serde_json::from_str(&status).expect("record should be json");
    assert_eq!(record["id"], request_id.as_str());
    assert_eq!(record["status"], "Pending");
}

#[test]
fn submit_rejects_malformed_phone_number() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    smsrelay(tmp.path())
        .args(["submit", "--phone", "nope", "--message", "hi"])
        .assert()
        .failure();
}

#[test]
fn status_of_unknown_request_fails() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    smsrelay(tmp.path())
        .args(["status", "missing-id"])
        .assert()
        .failure();
}

#[test]
fn blacklist_round_trip() {
    let tmp = tempfile::tempdir().expect("should create temp dir");

    let added = stdout_of(smsrelay(tmp.path()).args([
        "blacklist",
        "add",
        "+15550002,+15550001",
        "+15550003",
    ]));
    assert!(added.contains("added 3"), "unexpected output: {added}");

    let listed = stdout_of(smsrelay(tmp.path()).args(["blacklist", "list"]));
    let numbers: Vec<&str> = listed.lines().collect();
    assert_eq!(numbers, vec!["+15550001", "+15550002", "+15550003"]);

    let removed = stdout_of(smsrelay(tmp.path()).args(["blacklist", "remove", "+15550002"]));
    assert!(removed.contains("removed +15550002"));

    let missing = stdout_of(smsrelay(tmp.path()).args(["blacklist", "remove", "+15550002"]));
    assert!(missing.contains("was not blacklisted"));
}

#[test]
fn reconcile_reports_republished_count() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    stdout_of(smsrelay(tmp.path()).args(["submit", "--phone", "+15550001", "--message", "hi"]));

    let output = stdout_of(smsrelay(tmp.path()).args(["reconcile", "--older-than-secs", "0"]));
    assert!(output.contains("re-enqueued 1"), "unexpected output: {output}");
}
