//! CLI integration tests using assert_cmd.
//!
//! These tests invoke the actual `rankflow` binary and verify its output.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[allow(deprecated)]
fn rankflow_cmd() -> Command {
    Command::cargo_bin("rankflow").expect("binary should exist")
}

#[test]
fn test_version_flag() {
    rankflow_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    rankflow_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rank tracking"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("cancel"));
}

#[test]
fn test_serve_help() {
    rankflow_cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--data-dir"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_run_help_shows_options() {
    rankflow_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--login"))
        .stdout(predicate::str::contains("--password"))
        .stdout(predicate::str::contains("--test"))
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--device"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_no_subcommand_shows_help() {
    rankflow_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("rankflow"));
}

#[test]
fn test_run_test_mode_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let csv = tmp.path().join("keywords.csv");
    std::fs::write(&csv, "Keyword\neinstein\ntheory\n").unwrap();

    rankflow_cmd()
        .env("RANKFLOW_CONFIG_DIR", tmp.path())
        .env("RANKFLOW_DATA_DIR", tmp.path())
        .args(["run", csv.to_str().unwrap(), "example.com", "--test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written to"))
        .stdout(predicate::str::contains("Completed: 2/2 keywords"));

    let updated = std::fs::read_to_string(&csv).unwrap();
    assert!(updated.starts_with("Keyword,Ranking,Rank Group,Rank Absolute,Device"));
    assert!(tmp.path().join("keywords.csv.backup").exists());
}

#[test]
fn test_run_from_job_file() {
    let tmp = TempDir::new().unwrap();
    let csv = tmp.path().join("keywords.csv");
    std::fs::write(&csv, "Keyword\neinstein\ntheory\nrelativity\n").unwrap();
    let job = tmp.path().join("job.json");
    let body = serde_json::json!({
        "csv_file": csv,
        "target_url": "example.com",
        "location_code": 2840,
        "limit": 2,
        "test_mode": true
    });
    std::fs::write(&job, body.to_string()).unwrap();

    rankflow_cmd()
        .env("RANKFLOW_CONFIG_DIR", tmp.path())
        .env("RANKFLOW_DATA_DIR", tmp.path())
        .args(["run", "--config", job.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loading job from"))
        .stdout(predicate::str::contains("Completed: 2/2 keywords"));

    let updated = std::fs::read_to_string(&csv).unwrap();
    let lines: Vec<&str> = updated.lines().collect();
    assert!(lines[0].starts_with("Keyword,Ranking"));
    assert_eq!(lines.len(), 4);
    assert!(lines[3].starts_with("relativity,,"));
}

#[test]
fn test_job_file_without_credentials_fails() {
    let tmp = TempDir::new().unwrap();
    let csv = tmp.path().join("keywords.csv");
    std::fs::write(&csv, "Keyword\nrust\n").unwrap();
    let job = tmp.path().join("job.json");
    let body = serde_json::json!({ "csv_file": csv, "target_url": "example.com" });
    std::fs::write(&job, body.to_string()).unwrap();

    rankflow_cmd()
        .env("RANKFLOW_CONFIG_DIR", tmp.path())
        .args(["run", "--config", job.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API credentials"));

    assert_eq!(std::fs::read_to_string(&csv).unwrap(), "Keyword\nrust\n");
}

#[test]
fn test_run_rejects_unknown_device() {
    let tmp = TempDir::new().unwrap();
    let csv = tmp.path().join("keywords.csv");
    std::fs::write(&csv, "Keyword\nrust\n").unwrap();

    rankflow_cmd()
        .args([
            "run",
            csv.to_str().unwrap(),
            "example.com",
            "--test",
            "--device",
            "phone",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown device"));
}

#[test]
fn test_status_without_service_fails() {
    rankflow_cmd()
        .args(["--port", "9", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect"));
}
