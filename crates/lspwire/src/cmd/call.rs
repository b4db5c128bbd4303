use std::time::Instant;

use crate::cmd::worker::{connect, finish, parse_duration, parse_params};
use crate::cmd::CallArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_call, CallOutput, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.params.as_deref())?;
    let (session, child) = connect(&args.worker)?;

    let started = Instant::now();
    let outcome = session
        .send_request(&args.method, params, Some(timeout))
        .and_then(|pending| {
            let id = pending.id().clone();
            pending.wait().map(|result| (id, result))
        });
    let elapsed = started.elapsed();

    // Reap the worker regardless of the outcome; the request error wins.
    let finished = finish(&session, child);
    let (id, result) = outcome.map_err(|err| session_error(&format!("{} failed", args.method), err))?;
    finished?;

    print_call(
        &CallOutput {
            method: &args.method,
            id: &id,
            result: &result,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        },
        format,
    );
    Ok(SUCCESS)
}
