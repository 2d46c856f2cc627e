//! Smoke tests for the binary surface.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_every_command() {
    Command::cargo_bin("cuppa")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("up")
                .and(predicate::str::contains("down"))
                .and(predicate::str::contains("check"))
                .and(predicate::str::contains("link"))
                .and(predicate::str::contains("install"))
                .and(predicate::str::contains("seed")),
        );
}

#[test]
fn test_up_help_lists_flags() {
    Command::cargo_bin("cuppa")
        .unwrap()
        .args(["up", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--clean")
                .and(predicate::str::contains("--no-virtual-interface"))
                .and(predicate::str::contains("--skip-image-seeding")),
        );
}

#[test]
fn test_missing_config_is_fatal() {
    Command::cargo_bin("cuppa")
        .unwrap()
        .args(["--config", "/nonexistent/cuppa.toml", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_unknown_command_fails() {
    Command::cargo_bin("cuppa")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}
