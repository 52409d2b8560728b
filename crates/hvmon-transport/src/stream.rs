use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::addr::MonitorAddr;
use crate::error::{Result, TransportError};

/// Default timeout for establishing a TCP connection to a monitor.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A connected monitor stream. Implements `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps either a TCP stream or a Unix domain socket stream.
pub struct MonitorStream {
    inner: MonitorStreamInner,
}

enum MonitorStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for MonitorStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            MonitorStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for MonitorStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            MonitorStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            MonitorStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl From<TcpStream> for MonitorStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: MonitorStreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for MonitorStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: MonitorStreamInner::Unix(stream),
        }
    }
}

impl MonitorStream {
    /// Connect to a monitor at `addr`.
    ///
    /// `timeout` bounds TCP connection establishment; Unix sockets connect
    /// immediately or fail.
    pub fn connect(addr: &MonitorAddr, timeout: Duration) -> Result<Self> {
        match addr {
            MonitorAddr::Tcp { host, port } => Self::connect_tcp(host, *port, timeout),
            MonitorAddr::Unix(path) => Self::connect_unix(path),
        }
    }

    /// Connect to a TCP monitor, trying each resolved address in turn.
    pub fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?;

        let mut last_err = None;
        for sock_addr in addrs {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(%sock_addr, "connected to tcp monitor");
                    return Ok(stream.into());
                }
                Err(err) => last_err = Some(err),
            }
        }

        let source = last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            )
        });
        Err(TransportError::Connect {
            host: host.to_string(),
            port,
            source,
        })
    }

    /// Connect to a Unix socket monitor.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
            TransportError::ConnectUnix {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        debug!(?path, "connected to unix socket monitor");
        Ok(stream.into())
    }

    /// Connect to a Unix socket monitor.
    #[cfg(not(unix))]
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        Err(TransportError::ConnectUnix {
            path: path.as_ref().to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix socket monitors are not supported on this platform",
            ),
        })
    }

    /// Set the read deadline on the underlying stream. `None` clears it.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            MonitorStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => {
                stream.set_read_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            MonitorStreamInner::Tcp(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            MonitorStreamInner::Tcp(stream) => Ok(stream.try_clone()?.into()),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => Ok(stream.try_clone()?.into()),
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// Blocked readers on any clone of this stream observe end-of-file.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            MonitorStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            MonitorStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => {
                Err(TransportError::Shutdown)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            MonitorStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            MonitorStreamInner::Unix(_) => "unix",
        }
    }

    /// Get the credentials of the monitor process (Linux Unix sockets only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            MonitorStreamInner::Unix(stream) => stream.as_raw_fd(),
            MonitorStreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the monitor process.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl std::fmt::Debug for MonitorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read, Write};
    use std::net::TcpListener;

    #[test]
    fn tcp_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"(qemu) ").unwrap();
            let mut buf = [0u8; 12];
            conn.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"info status\n");
        });

        let mut stream =
            MonitorStream::connect(&MonitorAddr::tcp("127.0.0.1", port), DEFAULT_CONNECT_TIMEOUT)
                .unwrap();
        assert_eq!(stream.transport_name(), "tcp");

        let mut prompt = [0u8; 7];
        stream.read_exact(&mut prompt).unwrap();
        assert_eq!(&prompt, b"(qemu) ");
        stream.write_all(b"info status\n").unwrap();

        server.join().unwrap();
    }

    #[test]
    fn tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = MonitorStream::connect_tcp("127.0.0.1", port, Duration::from_millis(500));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn unix_connect_missing_path() {
        let missing = std::env::temp_dir().join(format!("hvmon-missing-{}.sock", std::process::id()));
        let result = MonitorStream::connect(&MonitorAddr::unix(&missing), DEFAULT_CONNECT_TIMEOUT);
        assert!(matches!(result, Err(TransportError::ConnectUnix { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn read_timeout_expires_and_clears() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut stream = MonitorStream::from(left);

        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));

        stream.set_read_timeout(None).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_wakes_clone_with_eof() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = MonitorStream::from(left);
        let mut reader = stream.try_clone().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).unwrap()
        });

        std::thread::sleep(Duration::from_millis(20));
        stream.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn unix_peer_credentials_report_own_pid() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = MonitorStream::from(left);
        let (_, _, pid) = stream.peer_credentials().unwrap();
        assert_eq!(pid, std::process::id());
    }
}
