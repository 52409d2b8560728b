/// Errors that can occur while reading replies or writing commands.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// More bytes were buffered than allowed without seeing a prompt.
    #[error("reply too large ({size} bytes without prompt, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted zero bytes on write.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the error is an expired read or write deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
