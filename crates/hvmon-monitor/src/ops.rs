//! Typed operations. Each one formats an [`HmpCommand`], submits it and
//! parses the reply before calling back; none of them touch the queues.

use std::fmt;
use std::time::Duration;

use crate::command::{HmpCommand, HmpReply, MigrateCopy, MirrorSync};
use crate::engine::HmpMonitor;
use crate::error::Result;
use crate::parse::{
    parse_block_jobs, parse_blocks, parse_migrate_status, parse_status, parse_version,
    BlockDevice,
};

impl HmpMonitor {
    /// Submit any typed command and receive its parsed reply.
    pub fn execute<F>(&self, command: HmpCommand, callback: F)
    where
        F: FnOnce(HmpReply) + Send + 'static,
    {
        let wire = command.wire();
        self.submit(wire, move |raw| callback(command.parse(&raw)));
    }

    /// Blocking form of [`HmpMonitor::execute`].
    pub fn call(&self, command: HmpCommand, timeout: Duration) -> Result<HmpReply> {
        let raw = self.request(command.wire(), timeout)?;
        Ok(command.parse(&raw))
    }

    pub fn query_status<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(HmpCommand::Status.wire(), move |raw| {
            callback(parse_status(&raw))
        });
    }

    pub fn get_version<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(HmpCommand::Version.wire(), move |raw| {
            callback(parse_version(&raw))
        });
    }

    pub fn get_blocks<F>(&self, callback: F)
    where
        F: FnOnce(Vec<BlockDevice>) + Send + 'static,
    {
        self.submit(HmpCommand::Blocks.wire(), move |raw| {
            callback(parse_blocks(&raw))
        });
    }

    pub fn get_migrate_status<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(HmpCommand::MigrateStatus.wire(), move |raw| {
            let status = parse_migrate_status(&raw);
            tracing::debug!(%status, "migration status");
            callback(status)
        });
    }

    /// Approximate count; see [`parse_block_jobs`].
    pub fn get_block_jobs<F>(&self, callback: F)
    where
        F: FnOnce(usize) + Send + 'static,
    {
        self.submit(HmpCommand::BlockJobs.wire(), move |raw| {
            callback(parse_block_jobs(&raw))
        });
    }

    pub fn eject_cdrom<F>(&self, device: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::EjectCdrom {
            device: device.to_string(),
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn change_cdrom<F>(&self, device: &str, path: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::ChangeCdrom {
            device: device.to_string(),
            path: path.to_string(),
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn drive_del<F>(&self, id: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::DriveDel { id: id.to_string() };
        self.submit(cmd.wire(), callback);
    }

    pub fn device_del<F>(&self, id: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::DeviceDel { id: id.to_string() };
        self.submit(cmd.wire(), callback);
    }

    /// `params` are joined as `k=v` pairs in iteration order.
    pub fn drive_add<K, V, F>(
        &self,
        bus: &str,
        params: impl IntoIterator<Item = (K, V)>,
        callback: F,
    ) where
        K: Into<String>,
        V: fmt::Display,
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(HmpCommand::drive_add(bus, params).wire(), callback);
    }

    /// `params` are joined as `k=v` pairs in iteration order.
    pub fn device_add<K, V, F>(
        &self,
        driver: &str,
        params: impl IntoIterator<Item = (K, V)>,
        callback: F,
    ) where
        K: Into<String>,
        V: fmt::Display,
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(HmpCommand::device_add(driver, params).wire(), callback);
    }

    pub fn migrate_set_capability<F>(&self, capability: &str, enabled: bool, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::MigrateSetCapability {
            capability: capability.to_string(),
            enabled,
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn migrate<F>(&self, dest: &str, copy: MigrateCopy, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::Migrate {
            dest: dest.to_string(),
            copy,
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn reload_disk_blkdev<F>(&self, device: &str, path: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::ReloadDiskBlkdev {
            device: device.to_string(),
            path: path.to_string(),
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn drive_mirror<F>(&self, drive: &str, target: &str, sync: MirrorSync, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::DriveMirror {
            drive: drive.to_string(),
            target: target.to_string(),
            sync,
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn block_stream<F>(&self, drive: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::BlockStream {
            drive: drive.to_string(),
        };
        self.submit(cmd.wire(), callback);
    }

    /// Passwords longer than 8 characters are truncated.
    pub fn set_vnc_password<F>(&self, protocol: &str, password: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(
            HmpCommand::set_vnc_password(protocol, password).wire(),
            callback,
        );
    }

    pub fn start_nbd_server<F>(&self, port: u16, export_all: bool, writable: bool, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::StartNbdServer {
            port,
            export_all,
            writable,
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn resize_disk<F>(&self, drive: &str, size_mb: u64, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let cmd = HmpCommand::ResizeDisk {
            drive: drive.to_string(),
            size_mb,
        };
        self.submit(cmd.wire(), callback);
    }

    pub fn simple_command<F>(&self, command: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(command, callback);
    }

    pub fn human_monitor_command<F>(&self, command: &str, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(command, callback);
    }
}
