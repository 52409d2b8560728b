//! Typed monitor commands and their wire format.

use std::fmt;

use crate::parse::{
    parse_block_jobs, parse_blocks, parse_migrate_status, parse_status, parse_version,
    BlockDevice,
};

/// Rate passed to `block_stream`, in MB/s.
pub const BLOCK_STREAM_SPEED_MB: u32 = 30;

/// The monitor only honours the first 8 characters of a VNC password.
pub const VNC_PASSWORD_MAX_LEN: usize = 8;

/// Address `nbd_server_start` binds to.
pub const NBD_LISTEN_HOST: &str = "0.0.0.0";

/// Which disks `migrate` copies along with memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrateCopy {
    /// Shared storage; memory only.
    #[default]
    None,
    /// Copy only the top image (`-i`).
    Incremental,
    /// Copy the full disk chain (`-b`).
    Full,
}

/// Sync mode for `drive_mirror`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorSync {
    /// Mirror the whole chain (`-f`).
    Full,
    /// Mirror the top image only.
    #[default]
    Top,
}

/// VNC password, truncated to [`VNC_PASSWORD_MAX_LEN`] characters.
///
/// Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct VncPassword(String);

impl VncPassword {
    pub fn new(password: &str) -> Self {
        Self(password.chars().take(VNC_PASSWORD_MAX_LEN).collect())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VncPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted:{} chars>", self.0.chars().count())
    }
}

/// One monitor operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmpCommand {
    Status,
    Version,
    Blocks,
    MigrateStatus,
    BlockJobs,
    EjectCdrom {
        device: String,
    },
    ChangeCdrom {
        device: String,
        path: String,
    },
    DriveDel {
        id: String,
    },
    DeviceDel {
        id: String,
    },
    DriveAdd {
        bus: String,
        params: Vec<(String, String)>,
    },
    DeviceAdd {
        driver: String,
        params: Vec<(String, String)>,
    },
    MigrateSetCapability {
        capability: String,
        enabled: bool,
    },
    Migrate {
        dest: String,
        copy: MigrateCopy,
    },
    ReloadDiskBlkdev {
        device: String,
        path: String,
    },
    DriveMirror {
        drive: String,
        target: String,
        sync: MirrorSync,
    },
    BlockStream {
        drive: String,
    },
    SetVncPassword {
        protocol: String,
        password: VncPassword,
    },
    StartNbdServer {
        port: u16,
        export_all: bool,
        writable: bool,
    },
    ResizeDisk {
        drive: String,
        size_mb: u64,
    },
    /// Free-form command line, sent verbatim.
    Raw(String),
}

/// Parsed reply to an [`HmpCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HmpReply {
    /// Raw reply text; the monitor's own error messages arrive here too.
    Text(String),
    /// Run state (`running`, `paused`, ...). Empty when not reported.
    Status(String),
    /// Version string. Empty when not reported.
    Version(String),
    /// Migration state (`active`, `completed`, ...). Empty when not reported.
    MigrateStatus(String),
    /// Approximate number of active block jobs.
    BlockJobs(usize),
    Blocks(Vec<BlockDevice>),
}

impl HmpCommand {
    pub fn drive_add<K, V>(bus: impl Into<String>, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        Self::DriveAdd {
            bus: bus.into(),
            params: collect_params(params),
        }
    }

    pub fn device_add<K, V>(
        driver: impl Into<String>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        Self::DeviceAdd {
            driver: driver.into(),
            params: collect_params(params),
        }
    }

    pub fn set_vnc_password(protocol: impl Into<String>, password: &str) -> Self {
        Self::SetVncPassword {
            protocol: protocol.into(),
            password: VncPassword::new(password),
        }
    }

    /// The command line written to the monitor (without the newline).
    pub fn wire(&self) -> String {
        match self {
            HmpCommand::Status => "info status".to_string(),
            HmpCommand::Version => "info version".to_string(),
            HmpCommand::Blocks => "info block".to_string(),
            HmpCommand::MigrateStatus => "info migrate".to_string(),
            HmpCommand::BlockJobs => "info block-jobs".to_string(),
            HmpCommand::EjectCdrom { device } => format!("eject -f {device}"),
            HmpCommand::ChangeCdrom { device, path } => format!("change {device} {path}"),
            HmpCommand::DriveDel { id } => format!("drive_del {id}"),
            HmpCommand::DeviceDel { id } => format!("device_del {id}"),
            HmpCommand::DriveAdd { bus, params } => {
                format!("drive_add {bus} {}", join_params(params))
            }
            HmpCommand::DeviceAdd { driver, params } if params.is_empty() => {
                format!("device_add {driver}")
            }
            HmpCommand::DeviceAdd { driver, params } => {
                format!("device_add {driver},{}", join_params(params))
            }
            HmpCommand::MigrateSetCapability {
                capability,
                enabled,
            } => {
                let state = if *enabled { "on" } else { "off" };
                format!("migrate_set_capability {capability} {state}")
            }
            HmpCommand::Migrate { dest, copy } => {
                let mut cmd = String::from("migrate -d");
                match copy {
                    MigrateCopy::Incremental => cmd.push_str(" -i"),
                    MigrateCopy::Full => cmd.push_str(" -b"),
                    MigrateCopy::None => {}
                }
                cmd.push(' ');
                cmd.push_str(dest);
                cmd
            }
            HmpCommand::ReloadDiskBlkdev { device, path } => {
                format!("reload_disk_snapshot_blkdev -n {device} {path}")
            }
            HmpCommand::DriveMirror {
                drive,
                target,
                sync,
            } => {
                let mut cmd = String::from("drive_mirror -n");
                if *sync == MirrorSync::Full {
                    cmd.push_str(" -f");
                }
                format!("{cmd} {drive} {target}")
            }
            HmpCommand::BlockStream { drive } => {
                format!("block_stream {drive} {BLOCK_STREAM_SPEED_MB}")
            }
            HmpCommand::SetVncPassword { protocol, password } => {
                format!("set_password {protocol} {}", password.expose())
            }
            HmpCommand::StartNbdServer {
                port,
                export_all,
                writable,
            } => {
                let mut cmd = String::from("nbd_server_start");
                if *export_all {
                    cmd.push_str(" -a");
                }
                if *writable {
                    cmd.push_str(" -w");
                }
                format!("{cmd} {NBD_LISTEN_HOST}:{port}")
            }
            HmpCommand::ResizeDisk { drive, size_mb } => format!("block_resize {drive} {size_mb}"),
            HmpCommand::Raw(line) => line.clone(),
        }
    }

    /// Convert raw reply text into the typed reply for this command.
    pub fn parse(&self, raw: &str) -> HmpReply {
        match self {
            HmpCommand::Status => HmpReply::Status(parse_status(raw)),
            HmpCommand::Version => HmpReply::Version(parse_version(raw)),
            HmpCommand::Blocks => HmpReply::Blocks(parse_blocks(raw)),
            HmpCommand::MigrateStatus => HmpReply::MigrateStatus(parse_migrate_status(raw)),
            HmpCommand::BlockJobs => HmpReply::BlockJobs(parse_block_jobs(raw)),
            _ => HmpReply::Text(raw.to_string()),
        }
    }

    /// Short operation name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            HmpCommand::Status => "status",
            HmpCommand::Version => "version",
            HmpCommand::Blocks => "blocks",
            HmpCommand::MigrateStatus => "migrate_status",
            HmpCommand::BlockJobs => "block_jobs",
            HmpCommand::EjectCdrom { .. } => "eject_cdrom",
            HmpCommand::ChangeCdrom { .. } => "change_cdrom",
            HmpCommand::DriveDel { .. } => "drive_del",
            HmpCommand::DeviceDel { .. } => "device_del",
            HmpCommand::DriveAdd { .. } => "drive_add",
            HmpCommand::DeviceAdd { .. } => "device_add",
            HmpCommand::MigrateSetCapability { .. } => "migrate_set_capability",
            HmpCommand::Migrate { .. } => "migrate",
            HmpCommand::ReloadDiskBlkdev { .. } => "reload_disk_blkdev",
            HmpCommand::DriveMirror { .. } => "drive_mirror",
            HmpCommand::BlockStream { .. } => "block_stream",
            HmpCommand::SetVncPassword { .. } => "set_vnc_password",
            HmpCommand::StartNbdServer { .. } => "start_nbd_server",
            HmpCommand::ResizeDisk { .. } => "resize_disk",
            HmpCommand::Raw(_) => "raw",
        }
    }
}

fn collect_params<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Vec<(String, String)>
where
    K: Into<String>,
    V: fmt::Display,
{
    params
        .into_iter()
        .map(|(key, value)| (key.into(), value.to_string()))
        .collect()
}

fn join_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Command line safe for logging: password arguments are masked.
pub(crate) fn redact(command: &str) -> String {
    match command.strip_prefix("set_password ") {
        Some(rest) => {
            let protocol = rest.split_whitespace().next().unwrap_or_default();
            format!("set_password {protocol} <redacted>")
        }
        None => command.to_string(),
    }
}
