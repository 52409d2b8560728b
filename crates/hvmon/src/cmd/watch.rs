use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hvmon_monitor::{parse_status, HmpCommand};
use serde::Serialize;

use crate::cmd::session::Session;
use crate::cmd::{parse_duration, WatchArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_json, OutputFormat};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct Sample<'a> {
    addr: &'a str,
    sample: usize,
    status: &'a str,
}

pub fn run(args: WatchArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    let interval = parse_duration("interval", &args.interval)?;
    let session = Session::open(&args.addr, timeout)?;
    let addr = session.addr().to_string();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut taken = 0usize;
    let mut last: Option<String> = None;

    while running.load(Ordering::SeqCst) {
        let raw = session.query(&HmpCommand::Status)?;
        let status = parse_status(&raw);
        taken = taken.saturating_add(1);

        match format {
            OutputFormat::Json => print_json(&Sample {
                addr: &addr,
                sample: taken,
                status: &status,
            }),
            OutputFormat::Table | OutputFormat::Pretty => {
                let marker = match &last {
                    Some(prev) if *prev != status => " (changed)",
                    _ => "",
                };
                println!("[{taken}] {addr}: {status}{marker}");
            }
            OutputFormat::Raw => println!("{status}"),
        }
        last = Some(status);

        if args.count.is_some_and(|count| taken >= count) {
            break;
        }
        sleep_while_running(interval, &running);
    }

    Ok(SUCCESS)
}

fn sleep_while_running(interval: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
