// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI smoke tests: init, action listing, import, run, and selection.

use assert_cmd::Command;
use predicates::prelude::*;

fn kash() -> Command {
    Command::cargo_bin("kash").expect("kash binary")
}

#[test]
fn init_creates_workspace() {
    let dir = tempfile::tempdir().unwrap();
    kash()
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized workspace"));
    assert!(dir.path().join(".kash/selections.yml").is_file());
}

#[test]
fn actions_lists_builtins() {
    kash()
        .arg("actions")
        .assert()
        .success()
        .stdout(predicate::str::contains("lowercase"))
        .stdout(predicate::str::contains("strip_html"));
}

#[test]
fn run_requires_a_workspace() {
    let dir = tempfile::tempdir().unwrap();
    kash()
        .current_dir(dir.path())
        .args(["run", "lowercase", "docs/x.doc.md"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no workspace found"));
}

#[test]
fn import_then_run_then_selection() {
    let ws = tempfile::tempdir().unwrap();
    kash()
        .args(["init", ws.path().to_str().unwrap()])
        .assert()
        .success();

    // Import a markdown file from outside the workspace.
    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("shouting.md");
    std::fs::write(&src, "# LOUD TEXT\n\nSOME SHOUTING HERE.\n").unwrap();

    let output = kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "import",
            src.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("@docs/"), "stdout: {stdout}");
    let imported = stdout.trim().trim_start_matches('@').to_string();

    kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "run",
            "lowercase",
            &imported,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("done: 1 item(s)"));

    // Running on the same input again is skipped thanks to the cached
    // result.
    kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "run",
            "lowercase",
            &imported,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));

    kash()
        .args(["--ws", ws.path().to_str().unwrap(), "selection"])
        .assert()
        .success()
        .stdout(predicate::str::contains("@docs/"));

    let err = kash()
        .args(["--ws", ws.path().to_str().unwrap(), "run", "no_such_action"])
        .assert()
        .failure();
    err.stderr(predicate::str::contains("unknown action"));
}

#[test]
fn archive_and_unarchive_roundtrip() {
    let ws = tempfile::tempdir().unwrap();
    kash()
        .args(["init", ws.path().to_str().unwrap()])
        .assert()
        .success();

    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("notes.md");
    std::fs::write(&src, "# Notes\n\nText here.\n").unwrap();

    let output = kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "import",
            src.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let store_path = stdout.trim().trim_start_matches('@').to_string();

    kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "archive",
            &store_path,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive/"));

    kash()
        .args([
            "--ws",
            ws.path().to_str().unwrap(),
            "unarchive",
            &store_path,
        ])
        .assert()
        .success();
    assert!(ws.path().join(&store_path).exists());
}
