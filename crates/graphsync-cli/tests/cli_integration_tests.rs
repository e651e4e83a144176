//! CLI integration tests for graphsync
//!
//! Runs the binary end to end against a throwaway config directory. No API
//! key is set, so every graph sync fails retryably while the primary commit
//! still lands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONTRACT: &str = "# Supply Agreement\nAcme supplies Globex.\n\n# Payment\nNet 30.\n";

/// Command isolated to a temp config dir, with no API key in scope
#[allow(deprecated)]
fn graphsync_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("graphsync").unwrap();
    cmd.current_dir(dir.path())
        .env("GRAPHSYNC_CONFIG_DIR", dir.path().join("config"))
        .env_remove("GRAPHSYNC_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn ingest(dir: &TempDir, path: &Path) {
    graphsync_cmd(dir)
        .args(["ingest", path.to_str().unwrap(), "--modified-at", "2024-01-01T00:00:00Z"])
        .assert()
        .success();
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("episodes"));
}

#[test]
fn test_status_on_empty_database() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents ingested yet."));
}

#[test]
fn test_ingest_commits_without_extractor() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);

    graphsync_cmd(&dir)
        .args(["ingest", path.to_str().unwrap(), "--modified-at", "2024-01-01T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("contract: committed 2 segments (+2 ~0 -0)"));

    graphsync_cmd(&dir)
        .args(["status", "contract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"));

    graphsync_cmd(&dir)
        .args(["log", "contract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("diff_computed"))
        .stdout(predicate::str::contains("graph_sync_failed"));
}

#[test]
fn test_reingest_unchanged_is_noop() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);
    ingest(&dir, &path);

    graphsync_cmd(&dir)
        .args(["ingest", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("contract: unchanged"));
}

#[test]
fn test_ingest_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);

    let output = graphsync_cmd(&dir)
        .args([
            "--format",
            "json",
            "ingest",
            path.to_str().unwrap(),
            "--id",
            "supply-7",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["document_id"], "supply-7");
    assert_eq!(reports[0]["status"], "committed");
    assert_eq!(reports[0]["added"], 2);
}

#[test]
fn test_id_rejected_with_multiple_files() {
    let dir = TempDir::new().unwrap();
    let a = write_doc(dir.path(), "a.md", "# A\none");
    let b = write_doc(dir.path(), "b.md", "# B\ntwo");

    graphsync_cmd(&dir)
        .args(["ingest", a.to_str().unwrap(), b.to_str().unwrap(), "--id", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--id can only be used with a single file"));
}

#[test]
fn test_reconcile_reports_failures() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);
    ingest(&dir, &path);

    let output = graphsync_cmd(&dir)
        .args(["--format", "json", "reconcile"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["scanned"], 1);
    assert_eq!(report["retried"], 1);
    assert_eq!(report["still_failing"], 1);
    assert_eq!(report["failed_documents"][0], "contract");
}

#[test]
fn test_reconcile_stops_at_retry_limit() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .args(["config", "set", "sync.max_attempts", "1"])
        .assert()
        .success();

    let path = write_doc(dir.path(), "contract.md", CONTRACT);
    ingest(&dir, &path);

    graphsync_cmd(&dir)
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Over retry limit"))
        .stdout(predicate::str::contains("contract"));

    graphsync_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("stuck"));
}

#[test]
fn test_episodes_empty_without_sync() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);
    ingest(&dir, &path);

    graphsync_cmd(&dir)
        .args(["episodes", "contract", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No episodes for 'contract'."));
}

#[test]
fn test_delete_document() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(dir.path(), "contract.md", CONTRACT);
    ingest(&dir, &path);

    graphsync_cmd(&dir)
        .args(["delete", "contract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 'contract'"));

    graphsync_cmd(&dir)
        .args(["delete", "contract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"));

    graphsync_cmd(&dir)
        .args(["status", "contract"])
        .assert()
        .failure();

    // The audit log outlives the document
    graphsync_cmd(&dir)
        .args(["log", "contract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph_sync_aborted"));
}

#[test]
fn test_config_set_get_roundtrip() {
    let dir = TempDir::new().unwrap();

    graphsync_cmd(&dir)
        .args(["config", "set", "sync.reconcile_batch_size", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set sync.reconcile_batch_size = 10"));

    graphsync_cmd(&dir)
        .args(["config", "get", "sync.reconcile_batch_size"])
        .assert()
        .success()
        .stdout(predicate::str::diff("10\n"));

    graphsync_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sync.max_attempts = 3"));
}

#[test]
fn test_config_rejects_api_key() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .args(["config", "set", "llm.api_key", "sk-secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be stored"));
}

#[test]
fn test_config_unknown_key() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .args(["config", "get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_doctor_without_api_key() {
    let dir = TempDir::new().unwrap();
    graphsync_cmd(&dir)
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("API Key: Not configured"))
        .stdout(predicate::str::contains("Some checks failed"));
}
