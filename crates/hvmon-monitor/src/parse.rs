//! Parsers for the monitor's line-oriented replies.
//!
//! The replies have no formal grammar and may be incomplete. A parser that
//! finds nothing it recognises returns an empty value, not an error; callers
//! must read empty as "unknown".

use serde::Serialize;

const STATUS_PREFIX: &str = "VM status:";
const MIGRATION_STATUS_PREFIX: &str = "Migration status";
const NO_ACTIVE_JOBS: &str = "No active jobs";

/// One device from `info block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDevice {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<BlockInserted>,
}

/// Medium attached to a block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInserted {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing_file: Option<String>,
}

impl BlockDevice {
    pub fn backing_file(&self) -> Option<&str> {
        self.inserted
            .as_ref()
            .and_then(|inserted| inserted.backing_file.as_deref())
    }
}

/// `info status`: the text after `VM status:`.
pub fn parse_status(raw: &str) -> String {
    raw.lines()
        .find_map(|line| line.strip_prefix(STATUS_PREFIX))
        .map(|rest| rest.trim().to_string())
        .unwrap_or_default()
}

/// `info version`: the first line that starts with a version number.
pub fn parse_version(raw: &str) -> String {
    raw.lines()
        .find(|line| line.starts_with(|c: char| c.is_ascii_digit()))
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

/// `info migrate`: the last word of the `Migration status` line.
pub fn parse_migrate_status(raw: &str) -> String {
    raw.lines()
        .find(|line| line.starts_with(MIGRATION_STATUS_PREFIX))
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
        .unwrap_or_default()
}

/// `info block-jobs`: number of active jobs.
///
/// Counts non-empty lines, so a job printed over several lines is counted
/// more than once. Callers depend on these numbers; keep the approximation.
pub fn parse_block_jobs(raw: &str) -> usize {
    if raw.lines().any(|line| line.trim() == NO_ACTIVE_JOBS) {
        return 0;
    }
    raw.lines().filter(|line| !line.trim().is_empty()).count()
}

/// `info block`: one record per device.
///
/// The dump spreads each device over several lines:
///
/// ```text
/// drive_0 (#block138): /opt/disks/vm.qcow2 (qcow2)
///     Attached to:      /machine/peripheral/virtio-disk0/virtio-backend
///     Backing file:     /opt/images/base.qcow2 (chain depth: 1)
///
/// ide1-cd0: [not inserted]
///     Attached to:      /machine/unattached/device[23]
/// ```
///
/// A line starts a new record when its first token ends with `:`, or when it
/// carries a `(#blockN):` node token and the current record is not a bare
/// `device:` header. Every other line belongs to the current record.
pub fn parse_blocks(raw: &str) -> Vec<BlockDevice> {
    merge_block_records(raw)
        .iter()
        .filter_map(|tokens| block_device(tokens))
        .collect()
}

fn merge_block_records(raw: &str) -> Vec<Vec<&str>> {
    let mut records: Vec<Vec<&str>> = Vec::new();

    for line in raw.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };

        let starts_record = if first.ends_with(':') {
            true
        } else if tokens.iter().any(|token| is_block_node(token)) {
            !matches!(records.last(), Some(record) if is_bare_header(record))
        } else {
            false
        };

        if starts_record {
            records.push(tokens);
        } else if let Some(record) = records.last_mut() {
            record.extend(tokens);
        }
    }

    records
}

fn block_device(tokens: &[&str]) -> Option<BlockDevice> {
    let first = *tokens.first()?;
    let device = first.strip_suffix(':').unwrap_or(first).to_string();

    let inserted = tokens
        .iter()
        .position(|token| is_block_node(token))
        .map(|index| BlockInserted {
            file: tokens.get(index + 1).map(|t| t.to_string()).unwrap_or_default(),
            backing_file: tokens
                .windows(3)
                .find(|w| w[0] == "Backing" && w[1] == "file:")
                .map(|w| w[2].to_string()),
        });

    Some(BlockDevice { device, inserted })
}

/// `device:` alone on its line, details to follow.
fn is_bare_header(record: &[&str]) -> bool {
    record.len() == 1 && record[0].ends_with(':')
}

/// Matches `(#block<digits>):`.
fn is_block_node(token: &str) -> bool {
    token
        .strip_prefix("(#block")
        .and_then(|rest| rest.strip_suffix("):"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_trimmed_remainder() {
        assert_eq!(parse_status("VM status: running\r\n"), "running");
        assert_eq!(
            parse_status("info status\r\nVM status: paused (postmigrate)\r\n"),
            "paused (postmigrate)"
        );
    }

    #[test]
    fn status_missing_is_empty() {
        assert_eq!(parse_status("unknown command: 'info statuz'\r\n"), "");
        assert_eq!(parse_status(""), "");
    }

    #[test]
    fn version_takes_numeric_line() {
        assert_eq!(
            parse_version("2.12.1 (qemu-kvm-ev-2.12.0-18.el7)\r\n"),
            "2.12.1 (qemu-kvm-ev-2.12.0-18.el7)"
        );
        assert_eq!(parse_version("info version\r\n4.2.0\r\n"), "4.2.0");
        assert_eq!(parse_version("garbage\r\n"), "");
    }

    #[test]
    fn migrate_status_last_word() {
        let raw = "globals:\r\nstore-global-state: on\r\ncapabilities: xbzrle: off\r\n\
                   Migration status: completed\r\ntotal time: 2311 milliseconds\r\n";
        assert_eq!(parse_migrate_status(raw), "completed");
        assert_eq!(parse_migrate_status("capabilities: xbzrle: off\r\n"), "");
    }

    #[test]
    fn block_jobs_sentinel_and_line_count() {
        assert_eq!(parse_block_jobs("No active jobs\r\n"), 0);
        assert_eq!(
            parse_block_jobs(
                "Type mirror, device drive_0: Completed 0 of 10737418240 bytes, speed limit 0 bytes/s\r\n"
            ),
            1
        );
        // Two jobs, one wrapped over two lines: counted as three.
        let raw = "Type stream, device drive_0: Completed 1 of 2 bytes,\r\n  speed limit 31457280 bytes/s\r\n\
                   Type stream, device drive_1: Completed 0 of 2 bytes, speed limit 31457280 bytes/s\r\n\r\n";
        assert_eq!(parse_block_jobs(raw), 3);
        assert_eq!(parse_block_jobs(""), 0);
    }

    #[test]
    fn blocks_merge_header_and_detail_lines() {
        let raw = "virtio0:\r\n\
                   drive_0 (#block138): /opt/disks/vm.qcow2 (qcow2)\r\n\
                   \x20   Attached to:      /machine/peripheral/virtio-disk0/virtio-backend\r\n\
                   \x20   Cache mode:       writeback\r\n\
                   \x20   Backing file:     /opt/images/base.qcow2 (chain depth: 1)\r\n\
                   virtio1:\r\n\
                   drive_1 (#block412): /opt/disks/data.qcow2 (qcow2)\r\n\
                   \x20   Cache mode:       writeback\r\n";

        let devices = parse_blocks(raw);
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].device, "virtio0");
        assert_eq!(
            devices[0].inserted.as_ref().unwrap().file,
            "/opt/disks/vm.qcow2"
        );
        assert_eq!(devices[0].backing_file(), Some("/opt/images/base.qcow2"));

        assert_eq!(devices[1].device, "virtio1");
        assert_eq!(
            devices[1].inserted.as_ref().unwrap().file,
            "/opt/disks/data.qcow2"
        );
        assert_eq!(devices[1].backing_file(), None);
    }

    #[test]
    fn blocks_node_lines_and_empty_drives() {
        let raw = "drive_0 (#block138): /opt/disks/vm.qcow2 (qcow2)\r\n\
                   \x20   Attached to:      /machine/peripheral/virtio-disk0/virtio-backend\r\n\
                   \r\n\
                   ide1-cd0: [not inserted]\r\n\
                   \x20   Attached to:      /machine/unattached/device[23]\r\n\
                   \x20   Removable device: not locked, tray closed\r\n\
                   \r\n\
                   floppy0: [not inserted]\r\n";

        let devices = parse_blocks(raw);
        let names: Vec<&str> = devices.iter().map(|d| d.device.as_str()).collect();
        assert_eq!(names, vec!["drive_0", "ide1-cd0", "floppy0"]);
        assert_eq!(
            devices[0].inserted,
            Some(BlockInserted {
                file: "/opt/disks/vm.qcow2".into(),
                backing_file: None,
            })
        );
        assert!(devices[1].inserted.is_none());
        assert!(devices[2].inserted.is_none());
    }

    #[test]
    fn blocks_ignore_leading_noise_and_empty_input() {
        assert!(parse_blocks("").is_empty());
        let devices = parse_blocks("info block\r\nsd0: [not inserted]\r\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device, "sd0");
    }

    #[test]
    fn blocks_serialize_without_absent_fields() {
        let devices = parse_blocks("ide1-cd0: [not inserted]\r\n");
        let json = serde_json::to_string(&devices).unwrap();
        assert_eq!(json, r#"[{"device":"ide1-cd0"}]"#);
    }

    #[test]
    fn block_node_token_shape() {
        assert!(is_block_node("(#block1):"));
        assert!(is_block_node("(#block138):"));
        assert!(!is_block_node("(#block):"));
        assert!(!is_block_node("(#blockx):"));
        assert!(!is_block_node("#block1:"));
    }
}
