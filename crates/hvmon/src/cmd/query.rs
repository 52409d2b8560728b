//! One-shot `info` queries.

use std::time::Duration;

use hvmon_monitor::{HmpCommand, HmpReply};

use crate::cmd::session::Session;
use crate::cmd::MonitorArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_blocks, print_field, OutputFormat};

pub fn status(args: MonitorArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    scalar(args, HmpCommand::Status, "status", "VM status", format, timeout)
}

pub fn qemu_version(
    args: MonitorArgs,
    format: OutputFormat,
    timeout: Duration,
) -> CliResult<i32> {
    scalar(args, HmpCommand::Version, "version", "Version", format, timeout)
}

pub fn migrate_status(
    args: MonitorArgs,
    format: OutputFormat,
    timeout: Duration,
) -> CliResult<i32> {
    scalar(
        args,
        HmpCommand::MigrateStatus,
        "migration_status",
        "Migration status",
        format,
        timeout,
    )
}

pub fn block_jobs(args: MonitorArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    scalar(
        args,
        HmpCommand::BlockJobs,
        "active_jobs",
        "Active jobs",
        format,
        timeout,
    )
}

pub fn blocks(args: MonitorArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    let session = Session::open(&args.addr, timeout)?;
    let command = HmpCommand::Blocks;
    let raw = session.query(&command)?;

    match command.parse(&raw) {
        HmpReply::Blocks(devices) => {
            tracing::debug!(devices = devices.len(), "block devices");
            print_blocks(&session.addr().to_string(), &devices, &raw, format);
            Ok(SUCCESS)
        }
        other => Err(unexpected(&command, &other)),
    }
}

fn scalar(
    args: MonitorArgs,
    command: HmpCommand,
    field: &str,
    label: &str,
    format: OutputFormat,
    timeout: Duration,
) -> CliResult<i32> {
    let session = Session::open(&args.addr, timeout)?;
    let raw = session.query(&command)?;
    let addr = session.addr().to_string();

    match command.parse(&raw) {
        HmpReply::Status(value) | HmpReply::Version(value) | HmpReply::MigrateStatus(value) => {
            if value.is_empty() {
                tracing::warn!(command = command.name(), "reply not recognised");
            }
            print_field(&addr, field, label, &value, &raw, format);
        }
        HmpReply::BlockJobs(count) => print_field(&addr, field, label, &count, &raw, format),
        other => return Err(unexpected(&command, &other)),
    }
    Ok(SUCCESS)
}

fn unexpected(command: &HmpCommand, reply: &HmpReply) -> CliError {
    CliError::new(
        INTERNAL,
        format!("unexpected reply type for {}: {reply:?}", command.name()),
    )
}
