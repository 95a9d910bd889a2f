//! Binary-level checks for the `wearsync` CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn config_prints_defaults() {
    Command::cargo_bin("wearsync")
        .unwrap()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh_interval_ms = 1800000"))
        .stdout(predicate::str::contains("default_peer = \"companion\""));
}

#[test]
fn config_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "thumbnail_size = 48").unwrap();

    Command::cargo_bin("wearsync")
        .unwrap()
        .arg("config")
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("thumbnail_size = 48"));
}

#[test]
fn invalid_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "tick_interval_ms = 0").unwrap();

    Command::cargo_bin("wearsync")
        .unwrap()
        .arg("config")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("tick_interval_ms must be non-zero"));
}

#[test]
fn simulate_prints_json_snapshots() {
    Command::cargo_bin("wearsync")
        .unwrap()
        .args(["simulate", "--ticks", "5", "--tick-ms", "50", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tick\":5"))
        .stdout(predicate::str::contains("Partly cloudy"));
}

#[test]
fn zero_tick_override_is_rejected() {
    Command::cargo_bin("wearsync")
        .unwrap()
        .args(["simulate", "--tick-ms", "0"])
        .assert()
        .failure();
}
