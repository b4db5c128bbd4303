use clap::{Args, Subcommand};
use lspwire_frame::DEFAULT_MAX_PAYLOAD;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod echo;
pub mod notify;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn a worker, send one request, and print the result.
    Call(CallArgs),
    /// Spawn a worker and send one notification.
    Notify(NotifyArgs),
    /// Act as a worker on stdin/stdout, answering requests with their params.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Notify(args) => notify::run(args),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// The worker process to spawn, given after `--`.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Maximum frame body size in bytes, both directions.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
    /// Worker program and its arguments.
    #[arg(last = true, required = true, num_args = 1.., value_name = "PROGRAM")]
    pub program: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name, matched exactly by the worker.
    pub method: String,
    /// Request params as JSON.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    /// Time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub worker: WorkerArgs,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Method name, matched exactly by the worker.
    pub method: String,
    /// Notification params as JSON.
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,
    #[command(flatten)]
    pub worker: WorkerArgs,
}

#[derive(Args, Debug, Default)]
pub struct EchoArgs {
    /// Answer `version` with this string instead of the crate version.
    #[arg(long, value_name = "MAJOR.MINOR")]
    pub report_version: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
