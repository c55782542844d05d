use assert_cmd::Command;
use predicates::prelude::*;

fn netft() -> Command {
    Command::cargo_bin("netft").expect("binary builds")
}

#[test]
fn help_lists_subcommands() {
    netft()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stream"))
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("calibration"))
        .stdout(predicate::str::contains("bias"))
        .stdout(predicate::str::contains("simulate"));
}

#[test]
fn version_prints() {
    netft()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("netft"));
}

#[test]
fn missing_config_file_is_a_clean_error() {
    netft()
        .args(["--config", "/nonexistent/prefs.toml", "calibration", "--ip", "127.0.0.1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("read config"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(
        &path,
        "[filtering]\nenabled = true\ncutoff_hz = 500.0\n",
    )
    .unwrap();
    netft()
        .args([
            "--config",
            path.to_str().unwrap(),
            "calibration",
            "--ip",
            "127.0.0.1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn stream_requires_ip() {
    netft().arg("stream").assert().failure();
}

#[test]
fn calibration_against_dead_endpoint_reports_error_code() {
    // Point at closed loopback ports; both paths must fail fast.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(
        &path,
        "[connection]\nhttp_port = 9\ntcp_port = 9\nconnect_timeout_ms = 200\n",
    )
    .unwrap();
    netft()
        .args([
            "--config",
            path.to_str().unwrap(),
            "calibration",
            "--ip",
            "127.0.0.1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Suggested action:"));
}
