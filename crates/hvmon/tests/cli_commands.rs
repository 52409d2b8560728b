#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::{Command, Output};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const GREETING: &str = "QEMU 6.2.0 monitor - type 'help' for more information\r\n(qemu) ";

/// Accept one connection, greet, and answer each command line. Every line
/// received is forwarded on the returned channel.
fn fake_monitor() -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr").to_string();
    let (seen_tx, seen_rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut writer = stream.try_clone().expect("clone should succeed");
        if writer.write_all(GREETING.as_bytes()).is_err() {
            return;
        }
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            let reply = reply_for(&line);
            let _ = seen_tx.send(line);
            if writer.write_all(format!("{reply}(qemu) ").as_bytes()).is_err() {
                break;
            }
        }
    });

    (addr, seen_rx)
}

fn reply_for(command: &str) -> String {
    match command {
        "info status" => "VM status: running\r\n".into(),
        "info version" => "6.2.0 (Debian 1:6.2+dfsg-2ubuntu6)\r\n".into(),
        "info migrate" => "globals:\r\nMigration status: completed\r\n".into(),
        "info block-jobs" => "No active jobs\r\n".into(),
        "info block" => concat!(
            "drive_0 (#block138): /var/lib/vm/disk.qcow2 (qcow2)\r\n",
            "    Attached to:      /machine/peripheral/virtio-disk0/virtio-backend\r\n",
            "    Backing file:     /var/lib/images/base.qcow2 (chain depth: 1)\r\n",
            "\r\n",
            "ide1-cd0: [not inserted]\r\n",
            "    Removable device: not locked, tray closed\r\n",
        )
        .into(),
        other => format!("unknown command: '{other}'\r\n"),
    }
}

fn hvmon(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hvmon"))
        .env_remove("HVMON_ADDR")
        .args(["--log-level", "error", "--timeout", "3s"])
        .args(args)
        .output()
        .expect("hvmon should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn status_json() {
    let (addr, seen) = fake_monitor();
    let output = hvmon(&["--format", "json", "status", &addr]);

    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("json output");
    assert_eq!(value["status"], "running");
    assert_eq!(value["addr"], addr.as_str());
    assert_eq!(
        seen.recv_timeout(Duration::from_secs(1)).unwrap(),
        "info status"
    );
}

#[test]
fn status_address_from_env() {
    let (addr, _seen) = fake_monitor();
    let output = Command::new(env!("CARGO_BIN_EXE_hvmon"))
        .env("HVMON_ADDR", &addr)
        .args(["--log-level", "error", "--format", "raw", "status"])
        .output()
        .expect("hvmon should run");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "VM status: running\r\n");
}

#[test]
fn version_and_migration_pretty() {
    let (addr, _seen) = fake_monitor();
    let output = hvmon(&["--format", "pretty", "qemu-version", &addr]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout(&output).trim(),
        "Version: 6.2.0 (Debian 1:6.2+dfsg-2ubuntu6)"
    );

    let (addr, _seen) = fake_monitor();
    let output = hvmon(&["--format", "pretty", "migrate-status", &addr]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output).trim(), "Migration status: completed");
}

#[test]
fn block_jobs_json_count() {
    let (addr, _seen) = fake_monitor();
    let output = hvmon(&["--format", "json", "block-jobs", &addr]);

    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("json output");
    assert_eq!(value["active_jobs"], 0);
}

#[test]
fn blocks_json_and_table() {
    let (addr, _seen) = fake_monitor();
    let output = hvmon(&["--format", "json", "blocks", &addr]);
    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("json output");
    let devices = value["devices"].as_array().expect("devices array");
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["device"], "drive_0");
    assert_eq!(devices[0]["inserted"]["file"], "/var/lib/vm/disk.qcow2");
    assert_eq!(
        devices[0]["inserted"]["backing_file"],
        "/var/lib/images/base.qcow2"
    );
    assert_eq!(devices[1]["device"], "ide1-cd0");
    assert!(devices[1].get("inserted").is_none());

    let (addr, _seen) = fake_monitor();
    let output = hvmon(&["--format", "table", "blocks", &addr]);
    assert!(output.status.success(), "{output:?}");
    let table = stdout(&output);
    assert!(table.contains("DEVICE"));
    assert!(table.contains("drive_0"));
    assert!(table.contains("[not inserted]"));
}

#[test]
fn exec_sends_raw_line() {
    let (addr, seen) = fake_monitor();
    let output = hvmon(&["--format", "raw", "exec", &addr, "info", "registers"]);

    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "unknown command: 'info registers'\r\n");
    assert_eq!(
        seen.recv_timeout(Duration::from_secs(1)).unwrap(),
        "info registers"
    );
}

#[test]
fn watch_stops_after_count() {
    let (addr, seen) = fake_monitor();
    let output = hvmon(&[
        "--format", "json", "watch", &addr, "--interval", "50ms", "--count", "3",
    ]);

    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    let samples: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[2]["sample"], 3);
    assert!(samples.iter().all(|s| s["status"] == "running"));
    assert_eq!(seen.iter().take(3).count(), 3);
}

#[test]
fn silent_monitor_times_out_with_124() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr").to_string();
    let holder = thread::spawn(move || {
        let accepted = listener.accept();
        thread::sleep(Duration::from_secs(2));
        drop(accepted);
    });

    let output = Command::new(env!("CARGO_BIN_EXE_hvmon"))
        .args(["--log-level", "error", "--timeout", "300ms", "status", &addr])
        .output()
        .expect("hvmon should run");

    assert_eq!(output.status.code(), Some(124), "{output:?}");
    let _ = holder.join();
}

#[test]
fn refused_connection_returns_3() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener.local_addr().expect("local addr").to_string()
    };
    let output = hvmon(&["status", &addr]);
    assert_eq!(output.status.code(), Some(3), "{output:?}");
}

#[test]
fn invalid_address_and_timeout_are_usage_errors() {
    let output = hvmon(&["status", "no-port-here"]);
    assert_eq!(output.status.code(), Some(64), "{output:?}");

    let output = Command::new(env!("CARGO_BIN_EXE_hvmon"))
        .args(["--timeout", "0s", "status", "127.0.0.1:4444"])
        .output()
        .expect("hvmon should run");
    assert_eq!(output.status.code(), Some(64), "{output:?}");
}

#[test]
fn version_extended() {
    let output = hvmon(&["version", "--extended"]);
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("name: hvmon"));
    assert!(text.contains("transports: tcp, unix"));
}
