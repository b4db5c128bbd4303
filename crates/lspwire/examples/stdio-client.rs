//! Spawn a worker, ask for its version, and print every notification it
//! sends while we wait.
//!
//! Run against the bundled echo worker:
//!   cargo build --features cli
//!   cargo run --example stdio-client -- target/debug/lspwire echo

use std::process::{Command, Stdio};
use std::time::Duration;

use lspwire::Session;
use serde_json::{json, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let program = argv.next().ok_or("usage: stdio-client <PROGRAM> [ARGS..]")?;

    let mut child = Command::new(program)
        .args(argv)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let session = Session::from_child(&mut child)?;
    session.register_handler("window/logMessage", |params| {
        eprintln!("worker log: {}", params.unwrap_or(Value::Null));
        Ok(Value::Null)
    });
    session.start()?;

    let version = session.request("version", Some(json!({})), Duration::from_secs(5))?;
    println!("worker version: {version}");

    session.notify("exit", None)?;
    session.shutdown();
    let status = child.wait()?;
    eprintln!("worker exited: {status}");
    Ok(())
}
