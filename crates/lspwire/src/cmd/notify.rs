use crate::cmd::worker::{connect, finish, parse_params};
use crate::cmd::NotifyArgs;
use crate::exit::{session_error, CliResult, SUCCESS};

pub fn run(args: NotifyArgs) -> CliResult<i32> {
    let params = parse_params(args.params.as_deref())?;
    let (session, child) = connect(&args.worker)?;

    let sent = session.notify(&args.method, params);
    let finished = finish(&session, child);
    sent.map_err(|err| session_error(&format!("{} failed", args.method), err))?;
    finished?;

    tracing::info!(method = %args.method, "notification sent");
    Ok(SUCCESS)
}
