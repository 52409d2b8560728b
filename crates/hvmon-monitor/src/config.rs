use std::time::Duration;

use hvmon_frame::{FrameConfig, DEFAULT_MAX_FRAME_SIZE};
use hvmon_transport::DEFAULT_CONNECT_TIMEOUT;

/// Configuration for one monitor connection.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Read deadline for the greeting frame. Cleared once it arrives;
    /// replies to individual commands have no deadline.
    pub handshake_timeout: Duration,
    /// Write timeout applied to the command stream.
    pub write_timeout: Option<Duration>,
    /// Maximum bytes buffered for a single reply.
    pub max_frame_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: Duration::from_secs(3),
            write_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl MonitorConfig {
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
            read_timeout: Some(self.handshake_timeout),
            write_timeout: self.write_timeout,
        }
    }
}
