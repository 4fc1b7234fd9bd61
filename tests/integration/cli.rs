//! Smoke tests for the `calltape` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn calltape(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("calltape").expect("binary should build");
    cmd.arg("--data-dir")
        .arg(data_dir.path())
        .env_remove("CALLTAPE_AUDIT")
        .env_remove("CALLTAPE_AUDIT_DIR");
    cmd
}

#[test]
fn test_redact_reads_stdin() {
    let data_dir = TempDir::new().unwrap();
    calltape(&data_dir)
        .arg("redact")
        .write_stdin(r#"{"apiKey": "sk-abcdefghijklmnop", "headers": {"Authorization": "secret"}}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("[REDACTED]"))
        .stdout(predicate::str::contains("secret").not())
        .stdout(predicate::str::contains("sk-abcdefghijklmnop").not());
}

#[test]
fn test_redact_rejects_invalid_json() {
    let data_dir = TempDir::new().unwrap();
    calltape(&data_dir)
        .arg("redact")
        .write_stdin("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_replay_writes_session_file() {
    let data_dir = TempDir::new().unwrap();
    let script = data_dir.path().join("script.jsonl");
    std::fs::write(
        &script,
        concat!(
            r#"{"op":"request","id":"r1","request":{"model":"x","headers":{"authorization":"secret"}},"origin":"testA"}"#,
            "\n",
            r#"{"op":"response","id":"r1","response":{"id":"resp1","output":"ok"},"origin":"testA"}"#,
            "\n"
        ),
    )
    .unwrap();
    let audit_dir = data_dir.path().join("sessions");

    let output = calltape(&data_dir)
        .env("CALLTAPE_AUDIT", "1")
        .env("CALLTAPE_AUDIT_DIR", &audit_dir)
        .arg("replay")
        .arg(&script)
        .arg("--no-store")
        .assert()
        .success()
        .stdout(predicate::str::contains("recorded=1"))
        .stdout(predicate::str::contains("completed=1"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let log_path = stdout.lines().last().unwrap();
    assert!(log_path.starts_with(audit_dir.to_str().unwrap()));

    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("Call: r1 | Origin: testA"));
    assert!(log.contains("[STORAGE DISABLED]"));
    assert!(!log.contains("\"secret\""));
}

#[test]
fn test_replay_without_audit_creates_nothing() {
    let data_dir = TempDir::new().unwrap();
    let script = data_dir.path().join("script.jsonl");
    std::fs::write(&script, r#"{"op":"request","id":"r1","request":{"model":"x"}}"#).unwrap();

    calltape(&data_dir)
        .arg("replay")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("audit disabled"));

    assert!(!data_dir.path().join("audit").exists());
}

#[test]
fn test_config_prints_example() {
    let data_dir = TempDir::new().unwrap();
    calltape(&data_dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[audit]"));
}
