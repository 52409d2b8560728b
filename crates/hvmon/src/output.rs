use std::fmt::Display;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hvmon_monitor::BlockDevice;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print one named value parsed from a monitor reply. `raw` is the reply
/// text as received, printed unchanged in raw mode.
pub fn print_field<T>(
    addr: &str,
    field: &str,
    label: &str,
    value: &T,
    raw: &str,
    format: OutputFormat,
) where
    T: Serialize + Display,
{
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::Map::new();
            out.insert("addr".to_string(), addr.into());
            out.insert(
                field.to_string(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MONITOR".to_string(), label.to_uppercase()])
                .add_row(vec![addr.to_string(), value.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{label}: {value}");
        }
        OutputFormat::Raw => print_raw(raw.as_bytes()),
    }
}

#[derive(Serialize)]
struct BlocksOutput<'a> {
    addr: &'a str,
    devices: &'a [BlockDevice],
}

pub fn print_blocks(addr: &str, devices: &[BlockDevice], raw: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&BlocksOutput { addr, devices }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "FILE", "BACKING FILE"]);
            for device in devices {
                let file = device
                    .inserted
                    .as_ref()
                    .map(|inserted| inserted.file.as_str())
                    .unwrap_or("[not inserted]");
                table.add_row(vec![
                    device.device.as_str(),
                    file,
                    device.backing_file().unwrap_or("-"),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for device in devices {
                match (&device.inserted, device.backing_file()) {
                    (None, _) => println!("{}: [not inserted]", device.device),
                    (Some(inserted), None) => println!("{}: {}", device.device, inserted.file),
                    (Some(inserted), Some(backing)) => println!(
                        "{}: {} (backing {backing})",
                        device.device, inserted.file
                    ),
                }
            }
        }
        OutputFormat::Raw => print_raw(raw.as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
