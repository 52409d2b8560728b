use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use hvmon_transport::MonitorStream;

use crate::codec::{split_frame_from, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads prompt-delimited replies from any `Read` stream.
///
/// Partial reads are buffered internally; callers only ever see complete frames.
/// Once the stream reaches end-of-file the remaining bytes are returned as a
/// final frame and the reader is exhausted; it cannot be restarted.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    scan_from: usize,
    config: FrameConfig,
    at_eof: bool,
    failed: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scan_from: 0,
            config,
            at_eof: false,
            failed: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` once the stream is exhausted. An expired read
    /// deadline surfaces as `FrameError::Io` with `WouldBlock`/`TimedOut`.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let next = split_frame_from(&mut self.buf, self.at_eof, &mut self.scan_from);
            if let Some(frame) = next {
                return Ok(Some(frame));
            }
            if self.at_eof {
                return Ok(None);
            }

            if self.buf.len() > self.config.max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: self.buf.len(),
                    max: self.config.max_frame_size,
                });
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                tracing::trace!(buffered = self.buf.len(), "monitor stream reached end");
                self.at_eof = true;
                continue;
            }

            self.buf.extend_from_slice(&chunk[..read]);
            tracing::trace!(bytes = read, buffered = self.buf.len(), "monitor bytes read");
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

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_frame().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl FrameReader<MonitorStream> {
    /// Create a frame reader for `MonitorStream` and apply read timeout from config.
    pub fn with_config_monitor(inner: MonitorStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: hvmon_transport::TransportError) -> FrameError {
    match err {
        hvmon_transport::TransportError::Io(io) => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
