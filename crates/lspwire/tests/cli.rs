#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

use serde_json::{json, Value};

const BIN: &str = env!("CARGO_BIN_EXE_lspwire");

fn lspwire(args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("--log-level")
        .arg("error")
        .args(args)
        .env_remove("LSPWIRE_LOG_LEVEL")
        .output()
        .expect("lspwire should run")
}

/// `lspwire call <method> [extra..] -- lspwire echo [echo_args..]`
fn call_echo(method: &str, extra: &[&str], echo_args: &[&str]) -> Output {
    let mut args = vec!["call", method, "--format", "json"];
    args.extend_from_slice(extra);
    args.extend_from_slice(&["--", BIN, "--log-level", "error", "echo"]);
    args.extend_from_slice(echo_args);
    lspwire(&args)
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn call_version_against_echo_worker() {
    let output = call_echo("version", &["--params", "{}"], &["--report-version", "1.15"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let value = stdout_json(&output);
    assert_eq!(value["method"], "version");
    assert_eq!(value["id"], 1);
    assert_eq!(value["result"], json!({"major": 1, "minor": 15}));
}

#[test]
fn call_echoes_params() {
    let output = call_echo("textDocument/hover", &["--params", r#"{"line":3,"character":7}"#], &[]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"], json!({"line": 3, "character": 7}));
}

#[test]
fn call_timeout_exits_124() {
    let output = call_echo(
        "sleep",
        &["--params", r#"{"ms":1500}"#, "--timeout", "200ms"],
        &[],
    );
    assert_eq!(output.status.code(), Some(124));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("timed out"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn remote_error_exits_1() {
    let output = call_echo("fail", &["--params", r#"{"message":"no such symbol"}"#], &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no such symbol"), "stderr: {stderr}");
}

#[test]
fn invalid_params_json_is_usage_error() {
    let output = call_echo("version", &["--params", "{nope"], &[]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn worker_that_exits_immediately_fails_the_call() {
    let output = lspwire(&["call", "version", "--timeout", "5s", "--", "true"]);
    // Stream failure (3) if the request went out first, session closed (1)
    // if end of input was seen before it.
    assert!(
        matches!(output.status.code(), Some(1) | Some(3)),
        "status: {:?}",
        output.status
    );
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_worker_program_fails() {
    let output = lspwire(&["call", "version", "--", "/nonexistent/lspwire-worker"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to spawn"), "stderr: {stderr}");
}

#[test]
fn notify_exit_succeeds() {
    let output = lspwire(&["notify", "exit", "--", BIN, "--log-level", "error", "echo"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn echo_answers_framed_request_on_stdio() {
    use std::io::Write;
    use std::process::Stdio;

    let mut child = Command::new(BIN)
        .args(["--log-level", "error", "echo", "--report-version", "2.3"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("echo should start");

    let body = r#"{"jsonrpc":"2.0","id":7,"method":"version"}"#;
    {
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        write!(stdin, "Content-Length: {}\r\n\r\n{body}", body.len()).unwrap();
    }

    let output = child.wait_with_output().expect("echo should exit on EOF");
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    let (header, reply) = text.split_once("\r\n\r\n").expect("framed reply");
    let length: usize = header.trim_start_matches("Content-Length: ").parse().unwrap();
    assert_eq!(length, reply.len());
    let reply: Value = serde_json::from_str(reply).unwrap();
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["result"], json!({"major": 2, "minor": 3}));
}

#[test]
fn version_prints_crate_version() {
    let output = lspwire(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("lspwire {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_defaults() {
    let output = lspwire(&["version", "--extended"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("default_max_pending: 1024"));
}
