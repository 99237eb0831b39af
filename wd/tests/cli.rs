//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated home, data dir and config pointing the store into the temp dir
fn wd(temp: &TempDir) -> Command {
    let config = temp.path().join("warmd.yml");
    if !config.exists() {
        let store = temp.path().join("queue.db");
        std::fs::write(&config, format!("store:\n  path: {}\n", store.display())).unwrap();
    }

    let mut cmd = Command::cargo_bin("wd").unwrap();
    cmd.current_dir(temp.path())
        .env("HOME", temp.path())
        .env("XDG_DATA_HOME", temp.path().join("data"))
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(&config);
    cmd
}

fn stats(temp: &TempDir) -> Value {
    let output = wd(temp).args(["stats", "--format", "json"]).output().unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

fn pending(stats: &Value, queue: &str) -> u64 {
    stats
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["queue"] == queue)
        .and_then(|s| s["pending"].as_u64())
        .unwrap()
}

#[test]
fn test_help() {
    let temp = TempDir::new().unwrap();
    wd(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("preload"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn test_stats_on_empty_store() {
    let temp = TempDir::new().unwrap();
    let stats = stats(&temp);

    assert_eq!(pending(&stats, "preload"), 0);
    assert_eq!(pending(&stats, "purge"), 0);
}

#[test]
fn test_preload_queues_without_daemon() {
    let temp = TempDir::new().unwrap();
    wd(&temp)
        .args(["preload", "https://example.com/", "https://example.com/about"])
        .assert()
        .success()
        .stdout(predicate::str::contains("preload: 4 queued"));

    // Resubmission is deduplicated
    wd(&temp)
        .args(["preload", "https://example.com/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 unchanged"));

    assert_eq!(pending(&stats(&temp), "preload"), 4);
}

#[test]
fn test_preload_from_file() {
    let temp = TempDir::new().unwrap();
    let urls = temp.path().join("urls.txt");
    std::fs::write(&urls, "# pages\nhttps://example.com/a\nhttps://example.com/b\n").unwrap();

    wd(&temp)
        .args(["purge", "--file"])
        .arg(&urls)
        .assert()
        .success()
        .stdout(predicate::str::contains("purge: 2 queued"));
}

#[test]
fn test_list_and_clear() {
    let temp = TempDir::new().unwrap();
    wd(&temp).args(["purge", "https://example.com/x"]).assert().success();

    wd(&temp)
        .args(["list", "purge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://example.com/x"));

    wd(&temp)
        .args(["clear", "purge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("purge: 1 cleared"));

    assert_eq!(pending(&stats(&temp), "purge"), 0);
}

#[test]
fn test_requeue_and_reset_stale_on_empty_queue() {
    let temp = TempDir::new().unwrap();
    wd(&temp)
        .args(["requeue", "preload"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 requeued"));
    wd(&temp).arg("reset-stale").assert().success();
}

#[test]
fn test_unknown_queue_rejected() {
    let temp = TempDir::new().unwrap();
    wd(&temp).args(["run", "warm"]).assert().failure();
}

#[test]
fn test_no_urls_is_an_error() {
    let temp = TempDir::new().unwrap();
    wd(&temp)
        .arg("preload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No URLs given"));
}
