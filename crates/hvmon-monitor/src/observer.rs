use crate::error::MonitorError;

/// Connection lifecycle notifications.
///
/// Invoked from the read pump thread, never with the engine lock held.
/// Implementations should return quickly.
pub trait MonitorObserver: Send + Sync {
    /// The greeting frame arrived; queued commands are being sent.
    fn on_connected(&self) {}

    /// The stream failed or closed after the greeting.
    fn on_disconnected(&self, _err: &MonitorError) {}

    /// The stream failed, closed or timed out before the greeting.
    fn on_handshake_timeout(&self, _err: &MonitorError) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MonitorObserver for NoopObserver {}
