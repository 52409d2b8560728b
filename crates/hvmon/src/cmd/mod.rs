use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod exec;
pub mod query;
pub mod session;
pub mod version;
pub mod watch;

pub const ADDR_ENV: &str = "HVMON_ADDR";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the VM run state (`info status`).
    Status(MonitorArgs),
    /// Show the hypervisor version (`info version`).
    QemuVersion(MonitorArgs),
    /// List block devices and their images (`info block`).
    Blocks(MonitorArgs),
    /// Show the migration state (`info migrate`).
    MigrateStatus(MonitorArgs),
    /// Count active block jobs (`info block-jobs`).
    BlockJobs(MonitorArgs),
    /// Send a raw monitor command and print the reply.
    Exec(ExecArgs),
    /// Poll the VM run state until interrupted.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    match command {
        Command::Status(args) => query::status(args, format, timeout),
        Command::QemuVersion(args) => query::qemu_version(args, format, timeout),
        Command::Blocks(args) => query::blocks(args, format, timeout),
        Command::MigrateStatus(args) => query::migrate_status(args, format, timeout),
        Command::BlockJobs(args) => query::block_jobs(args, format, timeout),
        Command::Exec(args) => exec::run(args, format, timeout),
        Command::Watch(args) => watch::run(args, format, timeout),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Monitor address: host:port, tcp:host:port, unix:/path or /path.
    #[arg(env = ADDR_ENV)]
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Monitor address: host:port, tcp:host:port, unix:/path or /path.
    pub addr: String,
    /// Command line to send, e.g. `info registers`.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Monitor address: host:port, tcp:host:port, unix:/path or /path.
    #[arg(env = ADDR_ENV)]
    pub addr: String,
    /// Time between polls (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub interval: String,
    /// Exit after N samples.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(what: &str, input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, format!("{what} must not be empty")));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid {what} value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(
            USAGE,
            format!("{what} must be greater than zero"),
        ));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("t", "5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("t", "2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(
            parse_duration("t", "150ms").unwrap(),
            Duration::from_millis(150)
        );
    }

    #[test]
    fn parse_duration_invalid() {
        for bad in ["0s", "0ms", "bad", "", "5m"] {
            let err = parse_duration("timeout", bad).unwrap_err();
            assert_eq!(err.code, USAGE, "{bad}");
        }
    }
}
