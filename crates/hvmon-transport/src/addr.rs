use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Where a monitor console listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAddr {
    /// `host:port`, as configured with `-monitor tcp:...`.
    Tcp { host: String, port: u16 },
    /// Filesystem path, as configured with `-monitor unix:...`.
    Unix(PathBuf),
}

impl MonitorAddr {
    /// Build a TCP address.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Build a Unix socket address.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            MonitorAddr::Tcp { .. } => "tcp",
            MonitorAddr::Unix(_) => "unix",
        }
    }
}

impl FromStr for MonitorAddr {
    type Err = TransportError;

    /// Accepted forms:
    /// - `unix:/run/vm/monitor.sock` or a bare absolute path
    /// - `tcp:127.0.0.1:4444` or `127.0.0.1:4444`
    /// - `[::1]:4444`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = |reason| TransportError::InvalidAddress {
            input: input.to_string(),
            reason,
        };

        if let Some(path) = trimmed.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            return Ok(Self::unix(path));
        }
        if trimmed.starts_with('/') {
            return Ok(Self::unix(trimmed));
        }

        let hostport = trimmed.strip_prefix("tcp:").unwrap_or(trimmed);
        let (host, port) = if let Some(rest) = hostport.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 bracket"))?;
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            hostport
                .rsplit_once(':')
                .ok_or_else(|| invalid("expected host:port or unix:/path"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self::tcp(host, port))
    }
}

impl fmt::Display for MonitorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorAddr::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            MonitorAddr::Tcp { host, port } => write!(f, "{host}:{port}"),
            MonitorAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
