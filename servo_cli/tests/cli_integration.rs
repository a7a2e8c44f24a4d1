use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Short timeouts so sim runs finish quickly
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[serial]
port = "/dev/servo-test-missing"
read_timeout_ms = 100

[buffer]
capacity = 500

[ingest]
idle_backoff_ms = 5

[display]
update_interval_ms = 20

[control]
default_speed = 1
home_angle = 90
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["--sim", "move", "--angle", "120"], 0, "Target reached", "stdout")]
#[case(&["--sim", "move", "--angle", "60", "--ccw"], 0, "servo 120 deg", "stdout")]
#[case(&["--sim", "move", "--angle", "200"], 4, "Target angle 200 was rejected", "stderr")]
#[case(&["--sim", "move", "--angle", "30", "--speed", "9"], 4, "Speed 9", "stderr")]
#[case(&["--sim", "move", "--angle", "10", "--speed", "5", "--timeout-ms", "1"], 3, "did not report reaching", "stderr")]
#[case(&["move", "--angle", "10"], 2, "Could not open serial port", "stderr")]
#[case(&["move"], 2, "required", "stderr")]
#[case(&["--sim", "reset"], 0, "Reset sent", "stdout")]
#[case(&["--sim", "monitor", "--duration-ms", "100"], 0, "Feedback lines: 0", "stdout")]
#[case(&["self-check"], 0, "Self-check OK", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("servo").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("error");
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn move_reports_statistics_and_exports_csv() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = dir.path().join("run.csv");

    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .arg("--sim")
        .arg("move")
        .arg("--angle")
        .arg("120")
        .arg("--export")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Samples: 6"))
        .stdout(predicate::str::contains("Exported 6 samples"));

    let text = fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Sample,Timestamp,Commanded_Angle,Feedback_Angle,Error")
    );
    let last = text.lines().last().unwrap();
    assert!(last.starts_with("6,"), "{last}");
    assert!(last.ends_with(",120,120,0"), "{last}");
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[buffer]\ncapacity = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--sim").arg("reset");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("buffer.capacity"));
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--log-level")
        .arg("error")
        .arg("--sim")
        .arg("reset");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("home angle 90"));
}

#[test]
fn port_flag_overrides_config() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = Command::cargo_bin("servo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .arg("--port")
        .arg("/dev/servo-flag-port")
        .arg("reset");
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("/dev/servo-flag-port"));
}
