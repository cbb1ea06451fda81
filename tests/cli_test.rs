//! Command-line tests against the built binary

use serde_json::{json, Value};
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn switchyard() -> Command {
    Command::new(env!("CARGO_BIN_EXE_switchyard"))
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_request_file_to_stdout() {
    let output = switchyard()
        .args(["--request", &fixture("request.json"), "--log-level", "error"])
        .output()
        .expect("failed to run switchyard");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let response: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        response,
        json!({"data": [
            [{"id": 1, "lastName": "Doe"}],
            [{"id": 2, "lastName": "Johnson"}],
            [{"id": 3, "lastName": "Jones"}]
        ]})
    );
}

#[test]
fn test_request_from_stdin_to_output_file() {
    let dir = TempDir::new().unwrap();
    let out_path = dir.path().join("response.json");

    let mut child = switchyard()
        .args(["--output", out_path.to_str().unwrap(), "--stats"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn switchyard");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"input": [1, 2, 3], "cases": [{"expression": "x > 1"}]}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("case 0: 2 / 3 passed"));
    let response: Value = serde_json::from_slice(&std::fs::read(&out_path).unwrap()).unwrap();
    assert_eq!(response, json!({"data": [[2, 3]]}));
}

#[test]
fn test_local_destination() {
    let dir = TempDir::new().unwrap();
    let request_path = dir.path().join("request.json");
    std::fs::write(
        &request_path,
        br#"{"input": [{"id": 1}], "cases": [{"alwaysRun": true}],
             "s3": {"bucketName": "out", "keyPrefix": "cli-"}}"#,
    )
    .unwrap();

    let output = switchyard()
        .args([
            "--request",
            request_path.to_str().unwrap(),
            "--destination-backend",
            "local",
            "--local-root",
            dir.path().to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stored = std::fs::read_dir(dir.path().join("out")).unwrap().count();
    assert_eq!(stored, 1);
}

#[test]
fn test_missing_input_exits_with_config_code() {
    let mut child = switchyard()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"cases": [{"default": true}]}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(switchyard::error::EXIT_CONFIG));
    assert!(String::from_utf8_lossy(&output.stderr).contains("input"));
}
