use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hvmon_monitor::{HmpCommand, HmpMonitor, MonitorConfig, MonitorError, MonitorObserver};
use hvmon_transport::MonitorAddr;

use crate::exit::{monitor_error, transport_error, CliError, CliResult, FAILURE, TIMEOUT};

/// Grace period on top of the greeting deadline, so the engine reports the
/// timeout before this side gives up waiting for it.
const EVENT_SLACK: Duration = Duration::from_millis(250);

enum SessionEvent {
    Connected,
    HandshakeFailed { timed_out: bool, message: String },
    Disconnected(String),
}

struct EventObserver {
    tx: Mutex<Sender<SessionEvent>>,
}

impl EventObserver {
    fn send(&self, event: SessionEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event);
        }
    }
}

impl MonitorObserver for EventObserver {
    fn on_connected(&self) {
        self.send(SessionEvent::Connected);
    }

    fn on_disconnected(&self, err: &MonitorError) {
        self.send(SessionEvent::Disconnected(err.to_string()));
    }

    fn on_handshake_timeout(&self, err: &MonitorError) {
        self.send(SessionEvent::HandshakeFailed {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        });
    }
}

/// One connected monitor for the lifetime of a CLI command.
pub struct Session {
    monitor: HmpMonitor,
    addr: MonitorAddr,
    timeout: Duration,
    events: Receiver<SessionEvent>,
}

impl Session {
    /// Connect to `addr` and wait for the monitor's greeting.
    pub fn open(addr: &str, timeout: Duration) -> CliResult<Self> {
        let addr: MonitorAddr = addr
            .parse()
            .map_err(|err| transport_error("invalid monitor address", err))?;

        let (tx, events) = mpsc::channel();
        let config = MonitorConfig {
            connect_timeout: timeout,
            handshake_timeout: timeout,
            ..MonitorConfig::default()
        };
        let observer = EventObserver { tx: Mutex::new(tx) };
        let monitor = HmpMonitor::with_observer(config, Arc::new(observer));

        monitor
            .connect_addr(&addr)
            .map_err(|err| monitor_error(&format!("connect to {addr} failed"), err))?;

        match events.recv_timeout(timeout + EVENT_SLACK) {
            Ok(SessionEvent::Connected) => {
                tracing::debug!(%addr, "monitor ready");
                if let Some((uid, gid, pid)) = monitor.peer_credentials() {
                    tracing::info!(%addr, uid, gid, pid, "monitor process");
                }
            }
            Ok(SessionEvent::HandshakeFailed { timed_out, message }) => {
                let code = if timed_out { TIMEOUT } else { FAILURE };
                return Err(CliError::new(
                    code,
                    format!("no greeting from monitor at {addr}: {message}"),
                ));
            }
            Ok(SessionEvent::Disconnected(message)) => {
                return Err(CliError::new(
                    FAILURE,
                    format!("monitor at {addr} disconnected: {message}"),
                ));
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no greeting from monitor at {addr} within {timeout:?}"),
                ));
            }
        }

        Ok(Self {
            monitor,
            addr,
            timeout,
            events,
        })
    }

    pub fn addr(&self) -> &MonitorAddr {
        &self.addr
    }

    /// Send a typed command and return the raw reply text.
    pub fn query(&self, command: &HmpCommand) -> CliResult<String> {
        self.send_line(&command.wire(), command.name())
    }

    /// Send a free-form command line and return the raw reply text.
    pub fn raw(&self, line: &str) -> CliResult<String> {
        self.send_line(line, "command")
    }

    fn send_line(&self, line: &str, name: &str) -> CliResult<String> {
        match self.monitor.request(line, self.timeout) {
            Ok(reply) => Ok(reply),
            Err(MonitorError::ReplyDropped) => {
                let reason = self
                    .events
                    .try_iter()
                    .find_map(|event| match event {
                        SessionEvent::Disconnected(message) => Some(message),
                        _ => None,
                    })
                    .unwrap_or_else(|| MonitorError::ReplyDropped.to_string());
                Err(CliError::new(
                    FAILURE,
                    format!("{name} on {}: monitor disconnected: {reason}", self.addr),
                ))
            }
            Err(err) => Err(monitor_error(&format!("{name} on {}", self.addr), err)),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.monitor.disconnect() {
            tracing::debug!(error = %err, "monitor disconnect");
        }
    }
}
