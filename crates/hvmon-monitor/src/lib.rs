//! Command channel for hypervisor human monitor consoles.
//!
//! The monitor answers commands strictly in the order it receives them and
//! carries no request identifiers, so [`HmpMonitor`] correlates replies by
//! position: the oldest command written gets the next reply frame. Callers
//! submit from any thread; writes happen on one pump thread and reads on
//! another.
//!
//! The first frame after connecting is the monitor's greeting. It confirms
//! the handshake and is never delivered to a caller.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod observer;
mod ops;
pub mod parse;
pub mod state;

pub use command::{
    HmpCommand, HmpReply, MigrateCopy, MirrorSync, VncPassword, BLOCK_STREAM_SPEED_MB,
    NBD_LISTEN_HOST, VNC_PASSWORD_MAX_LEN,
};
pub use config::MonitorConfig;
pub use engine::{HmpMonitor, ReplyHandler};
pub use error::{MonitorError, Result};
pub use observer::{MonitorObserver, NoopObserver};
pub use parse::{
    parse_block_jobs, parse_blocks, parse_migrate_status, parse_status, parse_version,
    BlockDevice, BlockInserted,
};
pub use state::ConnectionState;
