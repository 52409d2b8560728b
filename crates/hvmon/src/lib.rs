//! Client for the human monitor console of QEMU-style hypervisors.
//!
//! A supervisor drives many virtual machines; each one exposes a text
//! monitor on a TCP or Unix socket. hvmon keeps one ordered command channel
//! per monitor and turns the free-form replies into typed values.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams to the monitor (TCP, Unix sockets)
//! - [`frame`]: prompt-delimited reply framing and command writing
//! - [`monitor`]: the command channel engine, typed commands and reply parsers

/// Re-export transport types.
pub mod transport {
    pub use hvmon_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hvmon_frame::*;
}

/// Re-export monitor types.
pub mod monitor {
    pub use hvmon_monitor::*;
}

pub use hvmon_monitor::{HmpCommand, HmpMonitor, HmpReply, MonitorConfig, MonitorError};
