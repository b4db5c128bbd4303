use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use lspwire_frame::FrameConfig;
use lspwire_session::{Session, SessionConfig};
use serde_json::Value;

use crate::cmd::WorkerArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, USAGE};

/// How long a worker gets to exit on its own after its stdin closes.
const REAP_GRACE: Duration = Duration::from_secs(5);
const REAP_POLL: Duration = Duration::from_millis(20);

/// Spawn the worker and start a session over its stdio.
pub fn connect(args: &WorkerArgs) -> CliResult<(Session, Child)> {
    let (program, rest) = args
        .program
        .split_first()
        .ok_or_else(|| CliError::new(USAGE, "missing worker program after --"))?;

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| io_error(&format!("failed to spawn {program}"), err))?;
    tracing::debug!(program = %program, pid = child.id(), "worker spawned");

    let config = SessionConfig {
        frame: FrameConfig {
            max_payload_size: args.max_payload,
            ..FrameConfig::default()
        },
        ..SessionConfig::default()
    };

    let started = Session::from_child_with_config(&mut child, config)
        .and_then(|session| session.start().map(|()| session));
    match started {
        Ok(session) => Ok((session, child)),
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(session_error("session start failed", err))
        }
    }
}

/// Shut the session down and wait for the worker to exit, killing it after
/// a grace period.
pub fn finish(session: &Session, child: Child) -> CliResult<()> {
    session.shutdown();
    reap(child, REAP_GRACE)
}

fn reap(mut child: Child, grace: Duration) -> CliResult<()> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%status, "worker exited");
                return Ok(());
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
            Ok(None) => {
                tracing::warn!(?grace, "worker still running after stdin closed; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
            Err(err) => return Err(io_error("failed waiting for worker", err)),
        }
    }
}

pub fn parse_params(input: Option<&str>) -> CliResult<Option<Value>> {
    input
        .map(|json| {
            serde_json::from_str::<Value>(json)
                .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}")))
        })
        .transpose()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("  ").is_err());
    }

    #[test]
    fn params_are_optional_json() {
        assert_eq!(parse_params(None).unwrap(), None);
        assert_eq!(parse_params(Some(r#"{"a":1}"#)).unwrap(), Some(json!({"a": 1})));
        let err = parse_params(Some("{oops")).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn empty_program_is_usage_error() {
        let args = WorkerArgs {
            max_payload: 1024,
            program: Vec::new(),
        };
        let err = connect(&args).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[cfg(unix)]
    #[test]
    fn missing_program_fails_to_spawn() {
        let args = WorkerArgs {
            max_payload: 1024,
            program: vec!["/nonexistent/lspwire-worker".to_string()],
        };
        let err = connect(&args).unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);
        assert!(err.message.contains("failed to spawn"));
    }
}
