use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use hvmon_transport::MonitorStream;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes newline-terminated monitor commands to any `Write` stream.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> CommandWriter<T> {
    /// Create a new command writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new command writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Send one command line (blocking).
    ///
    /// Partial writes are retried until every byte, including the trailing
    /// newline, has been accepted by the stream.
    pub fn send(&mut self, command: &str) -> Result<()> {
        self.buf.clear();
        self.buf.reserve(command.len() + 1);
        self.buf.put_slice(command.as_bytes());
        self.buf.put_u8(b'\n');

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl CommandWriter<MonitorStream> {
    /// Create a command writer for `MonitorStream` and apply write timeout from config.
    pub fn with_config_monitor(inner: MonitorStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn appends_newline() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send("info status").unwrap();
        writer.send("info block").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"info status\ninfo block\n");
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut writer = CommandWriter::new(ChunkedWriter {
            written: Vec::new(),
            max_chunk: 3,
            interrupted_once: false,
        });
        writer.send("migrate -d tcp:10.0.0.2:4000").unwrap();

        assert_eq!(writer.get_ref().written, b"migrate -d tcp:10.0.0.2:4000\n");
        assert!(writer.get_ref().interrupted_once);
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = CommandWriter::new(ZeroWriter);
        let err = writer.send("info status").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn hard_error_is_returned() {
        let mut writer = CommandWriter::new(BrokenPipeWriter);
        let err = writer.send("info status").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    #[cfg(unix)]
    fn writes_to_monitor_stream() {
        use std::io::Read;

        let (left, mut right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer =
            CommandWriter::with_config_monitor(MonitorStream::from(left), FrameConfig::default())
                .unwrap();
        writer.send("info version").unwrap();

        let mut buf = [0u8; 13];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"info version\n");
    }

    struct ChunkedWriter {
        written: Vec<u8>,
        max_chunk: usize,
        interrupted_once: bool,
    }

    impl Write for ChunkedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted_once {
                self.interrupted_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.max_chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipeWriter;

    impl Write for BrokenPipeWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
