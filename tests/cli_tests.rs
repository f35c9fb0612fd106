mod common;

use common::{stdout_json, taskbridge_command};
use predicates::prelude::*;
use tempfile::TempDir;

fn run_json(dir: &TempDir, args: &[&str]) -> serde_json::Value {
    let output = taskbridge_command(dir.path())
        .args(args)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    stdout_json(&output)
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    taskbridge_command(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("outbox"));
}

#[test]
fn test_resolve_defaults_to_admin() {
    let dir = TempDir::new().unwrap();
    taskbridge_command(dir.path())
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains("target:     admin"))
        .stdout(predicate::str::contains("collection: personalTasks"));
}

#[test]
fn test_org_project_flow() {
    let dir = TempDir::new().unwrap();
    let org_url = format!("sqlite://{}", dir.path().join("orgs").join("acme.db").display());

    let org = run_json(&dir, &["org", "add", "Acme", "--database-url", &org_url]);
    let org_id = org["id"].as_str().unwrap().to_string();

    let user = run_json(&dir, &["user", "add", "dev@acme.test", "--org", &org_id]);
    let user_id = user["id"].as_str().unwrap().to_string();

    let project = run_json(
        &dir,
        &["project", "create", "Launch", "--owner", &user_id, "--org", &org_id],
    );
    let project_id = project["id"].as_str().unwrap().to_string();
    assert!(project["custom_db_project_id"].is_string());
    assert!(dir.path().join("orgs").join("acme.db").exists());

    let route = run_json(&dir, &["resolve", "--project", &project_id]);
    assert_eq!(route["target"]["kind"], "organization");
    assert_eq!(route["target"]["id"], org_id.as_str());
    assert_eq!(route["collection"], "tasks");

    let listed = run_json(&dir, &["project", "list", "--org", &org_id]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let report = run_json(&dir, &["reconcile"]);
    assert_eq!(report["report"]["findings"], serde_json::json!([]));
}

#[test]
fn test_outbox_status_and_retry() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let broken_url = format!("sqlite://{}", blocker.join("tasks.db").display());

    let org = run_json(&dir, &["org", "add", "Down", "--database-url", &broken_url]);
    let org_id = org["id"].as_str().unwrap().to_string();
    let user = run_json(&dir, &["user", "add", "m@down.test", "--org", &org_id]);
    let project = run_json(
        &dir,
        &[
            "project",
            "create",
            "Stuck",
            "--owner",
            user["id"].as_str().unwrap(),
            "--org",
            &org_id,
        ],
    );
    assert!(project["custom_db_project_id"].is_null());

    let status = run_json(&dir, &["outbox", "status"]);
    assert_eq!(status["stats"]["pending"], 1);
    assert!(status["entries"][0]["last_error"].is_string());

    let retried = run_json(&dir, &["outbox", "retry"]);
    assert_eq!(retried["requeued"], 0);
}

#[test]
fn test_unknown_project_fails_with_json_error() {
    let dir = TempDir::new().unwrap();
    taskbridge_command(dir.path())
        .args(["project", "show", "abcdefghij0123456789"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("PROJECT_NOT_FOUND"));
}

#[test]
fn test_prune_requires_repair() {
    let dir = TempDir::new().unwrap();
    taskbridge_command(dir.path())
        .args(["reconcile", "--prune"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--repair"));
}

#[test]
fn test_unknown_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    taskbridge_command(dir.path())
        .args(["resolve", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_INPUT"));
}
