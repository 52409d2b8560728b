//! Byte-stream transport to hypervisor monitor consoles.
//!
//! A monitor console is reached over a plain duplex byte stream:
//! - TCP (`-monitor tcp:host:port,server,nowait`)
//! - Unix domain sockets (`-monitor unix:/path,server,nowait`)
//!
//! This is the lowest layer of hvmon. Everything else builds on top of
//! the [`MonitorStream`] type provided here.

pub mod addr;
pub mod error;
pub mod stream;

pub use addr::MonitorAddr;
pub use error::{Result, TransportError};
pub use stream::{MonitorStream, DEFAULT_CONNECT_TIMEOUT};
