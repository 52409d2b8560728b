use std::path::PathBuf;

/// Errors that can occur in monitor transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The monitor address could not be parsed.
    #[error("invalid monitor address '{input}': {reason}")]
    InvalidAddress { input: String, reason: &'static str },

    /// The host name did not resolve to any socket address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to connect to a TCP monitor.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to connect to a Unix socket monitor.
    #[error("failed to connect to {path}: {source}")]
    ConnectUnix {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// The underlying I/O error, if this error wraps one.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Resolve { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::ConnectUnix { source, .. }
            | TransportError::Io(source) => Some(source),
            TransportError::InvalidAddress { .. } | TransportError::Shutdown => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
