//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end with the offline demo provider.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const PROMPT: &str = "Build a todo app with tags and reminders";

/// Get the binary to test.
fn protoflow() -> Command {
    Command::cargo_bin("protoflow").unwrap()
}

/// The binary in demo mode with its session inside `temp`.
fn demo(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = protoflow();
    cmd.current_dir(temp.path())
        .env_remove("GEMINI_API_KEY")
        .arg("--demo")
        .arg("--session-dir")
        .arg(temp.child("session").path());
    cmd
}

fn started(temp: &assert_fs::TempDir) {
    demo(temp).args(["start", PROMPT]).assert().success();
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    protoflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("AI-assisted software-lifecycle workflow"));
}

#[test]
fn test_version_flag() {
    protoflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_steps_command() {
    protoflow()
        .arg("steps")
        .assert()
        .success()
        .stdout(predicate::str::contains("code_review"))
        .stdout(predicate::str::contains("from code_generation"))
        .stdout(predicate::str::contains("Total: 6 steps"));
}

#[test]
fn test_config_init_writes_local_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    protoflow()
        .current_dir(temp.path())
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote .protoflow.toml"));

    temp.child(".protoflow.toml").assert(predicate::str::contains("[validation]"));

    protoflow()
        .current_dir(temp.path())
        .args(["config", "--init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_completions_bash() {
    protoflow()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("protoflow"));
}

// ============================================================================
// Start Command Tests
// ============================================================================

#[test]
fn test_status_without_project() {
    let temp = assert_fs::TempDir::new().unwrap();
    demo(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No project started"));
}

#[test]
fn test_start_generates_first_step() {
    let temp = assert_fs::TempDir::new().unwrap();
    demo(&temp)
        .args(["start", PROMPT])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generating User Stories"))
        .stdout(predicate::str::contains("# User Stories (demo)"));

    temp.child("session/sdlc_current_step.txt").assert("user_stories");
    temp.child("session/sdlc_generated_content.txt").assert(predicate::str::contains("user_stories"));
}

#[test]
fn test_start_rejects_short_prompt() {
    let temp = assert_fs::TempDir::new().unwrap();
    demo(&temp)
        .args(["start", "todo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 10 characters"));
}

#[test]
fn test_start_requires_api_key() {
    let temp = assert_fs::TempDir::new().unwrap();
    protoflow()
        .current_dir(temp.path())
        .env_remove("GEMINI_API_KEY")
        .arg("--session-dir")
        .arg(temp.child("session").path())
        .args(["start", PROMPT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("An API key is required"));
}

#[test]
fn test_start_twice_is_rejected() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);
    demo(&temp)
        .args(["start", PROMPT])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in progress"));
}

// ============================================================================
// Review Flow Tests
// ============================================================================

#[test]
fn test_approve_moves_to_next_step() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);

    demo(&temp)
        .arg("approve")
        .assert()
        .success()
        .stdout(predicate::str::contains("User Stories approved!"))
        .stdout(predicate::str::contains("# Design Docs (demo)"));

    demo(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Current: Design Docs"))
        .stdout(predicate::str::contains("Progress: 1/6 approved (16%)"));
}

#[test]
fn test_feedback_regenerates_current_step() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);

    demo(&temp)
        .args(["feedback", "add admin stories"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feedback received! Regenerating content..."))
        .stdout(predicate::str::contains("Incorporated feedback: add admin stories"));
}

#[test]
fn test_blank_feedback_is_rejected() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);
    demo(&temp)
        .args(["feedback", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Feedback cannot be empty"));
}

#[test]
fn test_goto_locked_step_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);

    demo(&temp)
        .args(["goto", "deployment"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"Deployment Plan\" isn't available yet"));

    temp.child("session/sdlc_current_step.txt").assert("user_stories");
}

#[test]
fn test_goto_earlier_step() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);
    demo(&temp).arg("approve").assert().success();

    demo(&temp)
        .args(["goto", "user_stories"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Navigated to User Stories"));
}

#[test]
fn test_edit_code_artifact() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);
    demo(&temp).arg("approve").assert().success();
    demo(&temp)
        .arg("approve")
        .assert()
        .success()
        .stdout(predicate::str::contains("<h1>Code Generation (demo)</h1>"));

    let file = temp.child("app.html");
    file.write_str("<html><body>edited</body></html>").unwrap();

    demo(&temp)
        .args(["edit"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated Code Generation"));

    demo(&temp)
        .args(["show", "code_generation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("edited"));
}

// ============================================================================
// Export & Reset Tests
// ============================================================================

#[test]
fn test_export_workflow_and_step() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);
    let out = temp.child("out");

    demo(&temp)
        .arg("export")
        .arg("--output")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported to"));

    demo(&temp)
        .args(["export", "--step", "user_stories", "--output"])
        .arg(out.path())
        .assert()
        .success();

    let names: Vec<String> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.starts_with("sdlc_workflow_Build_a_todo_app_wit") && n.ends_with(".json")));
    assert!(names.iter().any(|n| n.starts_with("user_stories_") && n.ends_with(".md")));
}

#[test]
fn test_export_with_slash_in_prompt() {
    let temp = assert_fs::TempDir::new().unwrap();
    demo(&temp).args(["start", "Todo app w/ tags and reminders"]).assert().success();
    let out = temp.child("out");

    demo(&temp).arg("export").arg("--output").arg(out.path()).assert().success();

    let names: Vec<String> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("sdlc_workflow_Todo_app_w__tags_and_"));
}

#[test]
fn test_export_before_start_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    demo(&temp)
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to export yet"));
}

#[test]
fn test_reset_clears_session() {
    let temp = assert_fs::TempDir::new().unwrap();
    started(&temp);

    demo(&temp).arg("reset").assert().success().stdout(predicate::str::contains("Workflow reset"));
    temp.child("session/sdlc_current_step.txt").assert(predicate::path::missing());

    demo(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No project started"));
}
