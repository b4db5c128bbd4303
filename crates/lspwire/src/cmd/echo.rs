use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use lspwire_frame::{
    error_codes, FrameReader, FrameWriter, Message, Request, Response, ResponseError,
};
use serde_json::{json, Value};

use crate::cmd::EchoArgs;
use crate::exit::{frame_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS, USAGE};

/// Requests with these methods get special answers; everything else is
/// echoed back.
const VERSION: &str = "version";
const SHUTDOWN: &str = "shutdown";
const SLEEP: &str = "sleep";
const FAIL: &str = "fail";
const EXIT: &str = "exit";

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let version = match &args.report_version {
        Some(text) => parse_version(text)?,
        None => crate_version(),
    };
    install_ctrlc_handler()?;

    tracing::info!("echo worker ready on stdin/stdout");
    serve(std::io::stdin().lock(), std::io::stdout().lock(), &version)
}

/// Answer requests until end of input or an `exit` notification.
fn serve<R: Read, W: Write>(input: R, output: W, version: &Value) -> CliResult<i32> {
    let mut reader = FrameReader::new(input);
    let mut writer = FrameWriter::new(output);

    loop {
        match reader.read_message() {
            Ok(Some(Message::Request(request))) => {
                tracing::debug!(id = %request.id, method = %request.method, "request");
                let reply = answer(request, version);
                writer
                    .write(&Message::Response(reply))
                    .map_err(|err| frame_error("write failed", err))?;
            }
            Ok(Some(Message::Notification(notification))) => {
                if notification.method == EXIT {
                    tracing::info!("exit notification received");
                    return Ok(SUCCESS);
                }
                tracing::info!(method = %notification.method, params = ?notification.params, "notification");
            }
            Ok(Some(Message::Response(response))) => {
                tracing::warn!(id = %response.id, "unexpected response; ignoring");
            }
            Ok(None) => {
                tracing::info!("input closed");
                return Ok(SUCCESS);
            }
            Err(err) if !err.is_fatal() => {
                tracing::warn!(error = %err, "dropping malformed message");
            }
            Err(err) => return Err(frame_error("read failed", err)),
        }
    }
}

fn answer(request: Request, version: &Value) -> Response {
    let Request { id, method, params } = request;
    match method.as_str() {
        VERSION => Response::ok(id, version.clone()),
        SHUTDOWN => Response::ok(id, Value::Null),
        SLEEP => {
            let ms = params
                .as_ref()
                .and_then(|p| p.get("ms"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            Response::ok(id, params.unwrap_or(Value::Null))
        }
        FAIL => {
            let message = params
                .as_ref()
                .and_then(|p| p.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("requested failure")
                .to_string();
            let mut error = ResponseError::new(error_codes::INTERNAL_ERROR, message);
            if let Some(params) = params {
                error = error.with_data(params);
            }
            Response::error(id, error)
        }
        _ => Response::ok(id, params.unwrap_or(Value::Null)),
    }
}

fn crate_version() -> Value {
    let major: u64 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u64 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    json!({ "major": major, "minor": minor })
}

fn parse_version(text: &str) -> CliResult<Value> {
    let invalid = || CliError::new(USAGE, format!("invalid version {text:?}, expected MAJOR.MINOR"));
    let (major, minor) = text.split_once('.').ok_or_else(invalid)?;
    let major: u64 = major.parse().map_err(|_| invalid())?;
    let minor: u64 = minor.parse().map_err(|_| invalid())?;
    Ok(json!({ "major": major, "minor": minor }))
}

fn install_ctrlc_handler() -> CliResult<()> {
    // Reads on stdin cannot be interrupted, so leave immediately.
    ctrlc::set_handler(|| {
        tracing::info!("interrupted");
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use lspwire_frame::RequestId;

    use super::*;

    fn run_serve(input: &[Message]) -> (i32, Vec<Message>) {
        let mut wire = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut wire);
            for message in input {
                writer.write(message).unwrap();
            }
        }
        let mut output = Vec::new();
        let code = serve(Cursor::new(wire), &mut output, &json!({"major": 1, "minor": 15})).unwrap();

        let mut reader = FrameReader::new(Cursor::new(output));
        let replies = reader.messages().map(|m| m.unwrap()).collect();
        (code, replies)
    }

    fn response(message: &Message) -> &Response {
        match message {
            Message::Response(response) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn version_request_reports_version() {
        let (code, replies) = run_serve(&[Message::request(1, "version", Some(json!({})))]);
        assert_eq!(code, SUCCESS);
        assert_eq!(
            replies,
            vec![Message::Response(Response::ok(
                RequestId::Number(1),
                json!({"major": 1, "minor": 15})
            ))]
        );
    }

    #[test]
    fn other_requests_echo_params() {
        let (_, replies) = run_serve(&[
            Message::request("a", "anything", Some(json!([1, "two"]))),
            Message::request(2, "no-params", None),
        ]);
        assert_eq!(response(&replies[0]).outcome, Ok(json!([1, "two"])));
        assert_eq!(response(&replies[1]).outcome, Ok(Value::Null));
    }

    #[test]
    fn fail_request_answers_with_error() {
        let (_, replies) = run_serve(&[Message::request(
            3,
            "fail",
            Some(json!({"message": "broken on purpose"})),
        )]);
        let err = response(&replies[0]).outcome.clone().unwrap_err();
        assert_eq!(err.code, error_codes::INTERNAL_ERROR);
        assert_eq!(err.message, "broken on purpose");
    }

    #[test]
    fn exit_notification_stops_before_later_requests() {
        let (code, replies) = run_serve(&[
            Message::notification("initialized", None),
            Message::request(1, "a", None),
            Message::notification("exit", None),
            Message::request(2, "b", None),
        ]);
        assert_eq!(code, SUCCESS);
        assert_eq!(replies.len(), 1);
        assert_eq!(response(&replies[0]).id, RequestId::Number(1));
    }

    #[test]
    fn malformed_body_is_skipped() {
        let mut wire = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut wire);
            writer.write_body(b"{broken").unwrap();
            writer.write(&Message::request(9, "ping", None)).unwrap();
        }

        let mut output = Vec::new();
        serve(Cursor::new(wire), &mut output, &Value::Null).unwrap();
        let mut reader = FrameReader::new(Cursor::new(output));
        let reply = reader.read_message().unwrap().unwrap();
        assert_eq!(reply.id(), Some(&RequestId::Number(9)));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let err = serve(
            Cursor::new(b"Content-Length: 50\r\n\r\n{".to_vec()),
            Vec::new(),
            &Value::Null,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);
    }

    #[test]
    fn report_version_parses() {
        assert_eq!(parse_version("1.15").unwrap(), json!({"major": 1, "minor": 15}));
        assert!(parse_version("1").is_err());
        assert!(parse_version("x.y").is_err());
    }
}
