//! CLI contract tests for the `discord-relay` binary.

use assert_cmd::Command;

fn relay_cmd() -> Command {
    match Command::cargo_bin("discord-relay") {
        Ok(cmd) => cmd,
        Err(err) => panic!("binary should be built: {err}"),
    }
}

#[test]
fn help_lists_subcommands() {
    let output = relay_cmd().arg("--help").output().expect("should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("start"));
    assert!(stdout.contains("send"));
}

#[test]
fn send_requires_channel_and_text() {
    let output = relay_cmd().arg("send").output().expect("should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--channel"));
}

#[test]
fn send_with_missing_config_fails_with_path() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let missing = tmp.path().join("nope.toml");

    let output = relay_cmd()
        .arg("--config")
        .arg(&missing)
        .args(["send", "--channel", "c1", "--text", "hi"])
        .output()
        .expect("should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.toml"));
}
