use std::process::Command;

use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;

#[test]
fn prints_version() {
    let exe = env!("CARGO_BIN_EXE_wall-tui");
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .expect("run wall-tui --version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "stdout was: {}",
        stdout.trim()
    );
}

#[test]
fn prints_help() {
    let exe = env!("CARGO_BIN_EXE_wall-tui");
    let output = Command::new(exe)
        .arg("--help")
        .output()
        .expect("run wall-tui --help");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(stdout.contains("TheWall"));
    assert!(stdout.contains("--version"));
    assert!(stdout.contains("--feed"));
}

#[test]
fn feed_flag_prints_offline_wall() {
    let home = tempfile::tempdir().expect("temp home");
    AssertCommand::cargo_bin("wall-tui")
        .expect("binary")
        .arg("--feed")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("WALL_BACKEND__URL")
        .assert()
        .success()
        .stdout(predicate::str::contains("TheWall (offline)"))
        .stdout(predicate::str::contains("Welcome to TheWall!"));
}

#[test]
fn set_backend_requires_both_arguments() {
    let home = tempfile::tempdir().expect("temp home");
    AssertCommand::cargo_bin("wall-tui")
        .expect("binary")
        .args(["--set-backend", "https://example.supabase.co"])
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("usage"));
}
