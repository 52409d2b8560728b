use std::time::Duration;

use crate::state::ConnectionState;

/// Errors that can occur in monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hvmon_transport::TransportError),

    /// Frame-level error (read/write failure, deadline expiry).
    #[error("frame error: {0}")]
    Frame(#[from] hvmon_frame::FrameError),

    /// A stream was already attached to this monitor.
    #[error("monitor already started (state: {0})")]
    AlreadyStarted(ConnectionState),

    /// The monitor closed the stream.
    #[error("monitor closed the connection")]
    ConnectionClosed,

    /// No stream is attached to this monitor.
    #[error("monitor not attached")]
    NotAttached,

    /// A pump or reply thread could not be started.
    #[error("failed to spawn monitor thread: {0}")]
    Spawn(std::io::Error),

    /// A blocking request gave up waiting for its reply.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// The reply handler was dropped without being invoked.
    #[error("reply abandoned (monitor failed before replying)")]
    ReplyDropped,
}

impl MonitorError {
    /// True when the error is an expired read deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            MonitorError::Frame(err) => err.is_timeout(),
            MonitorError::ReplyTimeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
