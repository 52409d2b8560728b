mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hvmon", version, about = "Hypervisor human monitor client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "HVMON_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    /// Connect, greeting and reply timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    timeout: String,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::parse_duration("timeout", &cli.timeout)
        .and_then(|timeout| cmd::run(cli.command, format, timeout));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_subcommand() {
        let cli = Cli::try_parse_from(["hvmon", "status", "127.0.0.1:4444", "--timeout", "3s"])
            .expect("status args should parse");
        assert!(matches!(cli.command, Command::Status(_)));
        assert_eq!(cli.timeout, "3s");
    }

    #[test]
    fn parses_exec_with_command_words() {
        let cli = Cli::try_parse_from([
            "hvmon",
            "exec",
            "unix:/run/vm1/monitor.sock",
            "info",
            "registers",
        ])
        .expect("exec args should parse");

        match cli.command {
            Command::Exec(args) => {
                assert_eq!(args.addr, "unix:/run/vm1/monitor.sock");
                assert_eq!(args.command, vec!["info", "registers"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn exec_requires_command() {
        let err = Cli::try_parse_from(["hvmon", "exec", "127.0.0.1:4444"])
            .expect_err("missing command should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_watch_interval() {
        let cli = Cli::try_parse_from([
            "hvmon",
            "watch",
            "127.0.0.1:4444",
            "--interval",
            "250ms",
            "--count",
            "3",
        ])
        .expect("watch args should parse");
        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.interval, "250ms");
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
