use std::fmt;

use serde::Serialize;

/// Lifecycle of one monitor connection.
///
/// ```text
/// Disconnected --attach--> AwaitingHandshake --greeting--> Connected --error--> Failed
///                                   \--error/deadline--> TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    AwaitingHandshake,
    Connected,
    TimedOut,
    Failed,
}

impl ConnectionState {
    /// `TimedOut` and `Failed` are final; the monitor instance is spent.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::TimedOut | ConnectionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::AwaitingHandshake => "awaiting_handshake",
            ConnectionState::Connected => "connected",
            ConnectionState::TimedOut => "timed_out",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
