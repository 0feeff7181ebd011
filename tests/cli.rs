use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn quotaguard(state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--state")
        .arg(state_dir.join("state.json"))
        .arg("--config")
        .arg(state_dir.join("absent.toml"))
        .env_remove("RUST_LOG");
    cmd
}

fn seed(dir: &Path) {
    quotaguard(dir)
        .args(["register-subject", "alice"])
        .assert()
        .success();
    quotaguard(dir)
        .args([
            "register-resource",
            "book-1",
            "--title",
            "The Rust Book",
            "--category",
            "ebook",
            "--location",
            "https://cdn.example.com/book-1.epub",
        ])
        .assert()
        .success();
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quotaguard 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Tiered, time-windowed download quota engine",
        ));
}

#[test]
fn test_cli_consume_missing_resource_argument() {
    let dir = TempDir::new().unwrap();
    quotaguard(dir.path())
        .args(["consume", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_consume_then_replay() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    quotaguard(dir.path())
        .args(["consume", "alice", "book-1", "--channel", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"accepted\""))
        .stdout(predicate::str::contains("cdn.example.com/book-1.epub"));

    quotaguard(dir.path())
        .args(["consume", "alice", "book-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"replayed\""));

    quotaguard(dir.path())
        .args(["history", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 1"));
}

#[test]
fn test_cli_status_reports_remaining() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    quotaguard(dir.path())
        .args(["status", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"eligible\": true"))
        .stdout(predicate::str::contains("\"limit\": 15"));
}

#[test]
fn test_cli_denied_exit_code() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    quotaguard(dir.path())
        .env("QUOTAGUARD_DAILY_LIMIT", "1")
        .args(["consume", "alice", "book-1"])
        .assert()
        .success();

    quotaguard(dir.path())
        .args(["register-resource", "book-2", "--title", "Two", "--location", "loc"])
        .assert()
        .success();

    quotaguard(dir.path())
        .env("QUOTAGUARD_DAILY_LIMIT", "1")
        .args(["consume", "alice", "book-2"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"outcome\": \"denied\""))
        .stdout(predicate::str::contains("\"gate\": \"daily\""));
}

#[test]
fn test_cli_unknown_subject_fails() {
    let dir = TempDir::new().unwrap();
    quotaguard(dir.path())
        .args(["status", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("subject not found: ghost"));
}

#[test]
fn test_cli_invalid_identifier_fails() {
    let dir = TempDir::new().unwrap();
    quotaguard(dir.path())
        .args(["register-subject", "bad id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid subject_id"));
}

#[test]
fn test_cli_grant_premium_days_out_of_range() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    quotaguard(dir.path())
        .args(["grant-premium", "alice", "--days", "100000000"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--days 100000000 is out of range"))
        .stderr(predicate::str::contains("panicked").not());

    quotaguard(dir.path())
        .args(["status", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tier\": \"free\""));
}

#[test]
fn test_cli_grant_premium_and_global_stats() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    quotaguard(dir.path())
        .args(["grant-premium", "alice", "--days", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tier\": \"premium\""));

    quotaguard(dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"active_premium_subjects\": 1"));

    quotaguard(dir.path())
        .arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"expired\": []"));
}
