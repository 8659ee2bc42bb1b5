// CLI integration tests for encode/decode/verify flows.
use std::fs;
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_lenrec");
    let mut command = Command::new(exe);
    command.env_remove("RUST_LOG");
    command
}

fn parse_json(value: &[u8]) -> Value {
    let text = std::str::from_utf8(value).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn parse_stderr_error(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().last().expect("error line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn encode_decode_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("people.csv");
    let output = temp.path().join("people.bin");
    fs::write(&input, "name,age\nalice,30\n\nbob,41\n").expect("write input");

    let encode = cmd()
        .args(["encode", input.to_str().unwrap(), output.to_str().unwrap()])
        .output()
        .expect("encode");
    assert!(encode.status.success());
    let summary = parse_json(&encode.stdout);
    assert_eq!(summary["records"], 4);
    assert_eq!(summary["payload_bytes"], 22);
    assert_eq!(summary["bytes"], 4 * 8 + 22);

    let decode = cmd()
        .args(["decode", output.to_str().unwrap()])
        .output()
        .expect("decode");
    assert!(decode.status.success());
    assert_eq!(decode.stdout, b"name,age\nalice,30\n\nbob,41\n");

    let jsonl = cmd()
        .args(["decode", output.to_str().unwrap(), "--format", "jsonl"])
        .output()
        .expect("decode jsonl");
    assert!(jsonl.status.success());
    let text = String::from_utf8(jsonl.stdout).expect("utf8");
    let last: Value = serde_json::from_str(text.lines().last().expect("line")).expect("json");
    assert_eq!(last["index"], 3);
    assert_eq!(last["record"], "bob,41");
}

#[test]
fn missing_input_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = temp.path().join("out.bin");

    let encode = cmd()
        .args([
            "encode",
            temp.path().join("nope.csv").to_str().unwrap(),
            output.to_str().unwrap(),
        ])
        .output()
        .expect("encode");
    assert_eq!(encode.status.code().unwrap(), 3);
    assert!(!output.exists());

    let err = parse_stderr_error(&encode.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert_eq!(err["error"]["message"], "failed to open input");
}

#[test]
fn truncated_file_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("cut.bin");
    let mut bytes = 2u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(b"ok");
    bytes.extend_from_slice(&9u64.to_le_bytes());
    bytes.extend_from_slice(b"abc");
    fs::write(&path, &bytes).expect("write");

    let decode = cmd()
        .args(["decode", path.to_str().unwrap()])
        .output()
        .expect("decode");
    assert_eq!(decode.status.code().unwrap(), 9);
    assert_eq!(decode.stdout, b"ok\n");
    let err = parse_stderr_error(&decode.stderr);
    assert_eq!(err["error"]["kind"], "Truncated");
    assert_eq!(err["error"]["seq"], 1);
    assert_eq!(err["error"]["offset"], 10);

    let verify = cmd()
        .args(["verify", path.to_str().unwrap(), "--json"])
        .output()
        .expect("verify");
    assert_eq!(verify.status.code().unwrap(), 9);
    let report = parse_json(&verify.stdout);
    assert_eq!(report["status"], "truncated");
    assert_eq!(report["records"], 1);
    assert_eq!(report["last_good_offset"], 10);
}

#[test]
fn verify_ok_and_u32_layout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("in.csv");
    let output = temp.path().join("out.bin");
    fs::write(&input, "a,b,c\n").expect("write input");

    let encode = cmd()
        .args([
            "encode",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "--length-field",
            "u32le",
        ])
        .output()
        .expect("encode");
    assert!(encode.status.success());
    assert_eq!(fs::metadata(&output).expect("meta").len(), 4 + 5);

    let verify = cmd()
        .args([
            "verify",
            output.to_str().unwrap(),
            "--length-field",
            "u32le",
        ])
        .output()
        .expect("verify");
    assert!(verify.status.success());
    let text = String::from_utf8(verify.stdout).expect("utf8");
    assert!(text.starts_with("OK: "));
    assert!(text.contains("records=1"));
}

#[test]
fn usage_exit_code() {
    let encode = cmd().args(["encode", "only-one-arg"]).output().expect("encode");
    assert_eq!(encode.status.code().unwrap(), 2);
    let err = parse_stderr_error(&encode.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}
