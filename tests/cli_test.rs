//! CLI argument surface smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn slack_presence() -> Command {
    Command::cargo_bin("slack-presence").unwrap()
}

#[test]
fn shows_help() {
    slack_presence()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("slack-presence"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--options-file"))
        .stdout(predicate::str::contains("--headless"));
}

#[test]
fn shows_version() {
    slack_presence()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("slack-presence"));
}

#[test]
fn rejects_unknown_flags() {
    slack_presence()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}
