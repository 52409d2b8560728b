use std::time::Duration;

use serde::Serialize;

use crate::cmd::session::Session;
use crate::cmd::ExecArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct ExecOutput<'a> {
    addr: String,
    command: &'a str,
    reply: &'a str,
}

pub fn run(args: ExecArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    let line = args.command.join(" ");
    if line.trim().is_empty() {
        return Err(CliError::new(USAGE, "command must not be empty"));
    }
    if line.contains(['\n', '\r']) {
        return Err(CliError::new(USAGE, "command must be a single line"));
    }

    let session = Session::open(&args.addr, timeout)?;
    let reply = session.raw(&line)?;

    match format {
        OutputFormat::Json => print_json(&ExecOutput {
            addr: session.addr().to_string(),
            command: &line,
            reply: &reply,
        }),
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            print_raw(reply.as_bytes())
        }
    }

    Ok(SUCCESS)
}
