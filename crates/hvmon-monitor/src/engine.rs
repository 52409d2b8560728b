//! The command channel: FIFO correlation of commands and replies.
//!
//! The human monitor protocol carries no request identifiers. A reply is
//! matched to a command purely by position: the n-th reply after the
//! greeting answers the n-th command written. Everything here exists to keep
//! that positional correspondence intact while several threads submit
//! commands concurrently. It is only sound while this engine is the sole
//! client driving the monitor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use hvmon_frame::{CommandWriter, Frame, FrameReader};
use hvmon_transport::{MonitorAddr, MonitorStream};
use tracing::{debug, error, info, warn};

use crate::command::redact;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::observer::{MonitorObserver, NoopObserver};
use crate::state::ConnectionState;

/// Handler invoked with the raw text of the reply to its command.
pub type ReplyHandler = Box<dyn FnOnce(String) + Send + 'static>;

struct PendingCommand {
    seq: u64,
    command: String,
    handler: ReplyHandler,
}

/// Queue state guarded by the engine lock.
///
/// `pending` pairs every command with its handler, so the command and
/// callback sequences can never diverge. Entries `[0, sent)` have been
/// written and await a reply; entries `[sent, len)` are still queued.
struct EngineState {
    connection: ConnectionState,
    pending: VecDeque<PendingCommand>,
    sent: usize,
    next_seq: u64,
    abandoned: Vec<String>,
}

struct Shared {
    config: MonitorConfig,
    observer: Arc<dyn MonitorObserver>,
    state: Mutex<EngineState>,
    writing: AtomicBool,
    reading: AtomicBool,
    writer: Mutex<Option<CommandWriter<MonitorStream>>>,
    reader: Mutex<Option<FrameReader<MonitorStream>>>,
    control: Mutex<Option<MonitorStream>>,
}

/// Client for one monitor console.
///
/// Cheap to clone; clones share the same connection and queues. Each
/// virtual machine owns its own instance, nothing is process-global.
#[derive(Clone)]
pub struct HmpMonitor {
    shared: Arc<Shared>,
}

enum FrameDisposition {
    Handshake,
    Reply,
}

impl HmpMonitor {
    /// Create a monitor with default configuration and no observer.
    pub fn new() -> Self {
        Self::with_observer(MonitorConfig::default(), Arc::new(NoopObserver))
    }

    /// Create a monitor in the `Disconnected` state.
    pub fn with_observer(config: MonitorConfig, observer: Arc<dyn MonitorObserver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                observer,
                state: Mutex::new(EngineState {
                    connection: ConnectionState::Disconnected,
                    pending: VecDeque::new(),
                    sent: 0,
                    next_seq: 0,
                    abandoned: Vec::new(),
                }),
                writing: AtomicBool::new(false),
                reading: AtomicBool::new(false),
                writer: Mutex::new(None),
                reader: Mutex::new(None),
                control: Mutex::new(None),
            }),
        }
    }

    /// Connect to a TCP monitor and start waiting for its greeting.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.connect_addr(&MonitorAddr::tcp(host, port))
    }

    /// Connect to a monitor at `addr` and start waiting for its greeting.
    pub fn connect_addr(&self, addr: &MonitorAddr) -> Result<()> {
        self.ensure_disconnected()?;
        let stream = MonitorStream::connect(addr, self.shared.config.connect_timeout)?;
        info!(%addr, "connected to monitor");
        self.attach(stream)
    }

    /// Take ownership of an already-open stream and start the read pump.
    ///
    /// The first frame read from the stream is treated as the greeting.
    pub fn attach(&self, stream: MonitorStream) -> Result<()> {
        let frame_config = self.shared.config.frame_config();
        let control = stream.try_clone()?;
        let reader = FrameReader::with_config_monitor(stream.try_clone()?, frame_config.clone())?;
        let writer = CommandWriter::with_config_monitor(stream, frame_config)?;

        {
            let mut state = lock(&self.shared.state);
            if state.connection != ConnectionState::Disconnected {
                return Err(MonitorError::AlreadyStarted(state.connection));
            }
            state.connection = ConnectionState::AwaitingHandshake;
        }

        *lock(&self.shared.writer) = Some(writer);
        *lock(&self.shared.reader) = Some(reader);
        *lock(&self.shared.control) = Some(control);

        debug!(
            timeout = ?self.shared.config.handshake_timeout,
            "awaiting monitor greeting"
        );
        self.start_read_pump();
        Ok(())
    }

    /// Shut the stream down. The read pump reports the closure through the
    /// observer like any other stream failure.
    pub fn disconnect(&self) -> Result<()> {
        let control = lock(&self.shared.control).take();
        match control {
            Some(stream) => {
                debug!("shutting down monitor stream");
                stream.shutdown()?;
                Ok(())
            }
            None => Err(MonitorError::NotAttached),
        }
    }

    /// Credentials of the monitor process as `(uid, gid, pid)`.
    ///
    /// Only available for Unix socket monitors on Linux, and only while the
    /// stream is attached.
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        lock(&self.shared.control)
            .as_ref()
            .and_then(MonitorStream::peer_credentials)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.state).connection
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of commands queued or awaiting a reply.
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    /// Commands that were still unanswered when the connection ended.
    ///
    /// Their handlers were dropped without being called. Replay them on a
    /// fresh monitor if they still matter.
    pub fn abandoned_commands(&self) -> Vec<String> {
        lock(&self.shared.state).abandoned.clone()
    }

    /// Queue `command` and invoke `handler` with the raw text of its reply.
    ///
    /// Commands submitted before the greeting arrives are buffered and sent
    /// once the connection is established. Once the monitor has failed or
    /// timed out, `handler` is dropped at once and the command is recorded
    /// in [`HmpMonitor::abandoned_commands`].
    pub fn submit<F>(&self, command: impl Into<String>, handler: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.enqueue(command.into(), Box::new(handler));
    }

    /// Submit `command` and block until its reply arrives or `timeout` elapses.
    ///
    /// Giving up does not cancel the command: its reply still consumes the
    /// command's slot when it eventually arrives.
    pub fn request(&self, command: impl Into<String>, timeout: Duration) -> Result<String> {
        let (tx, rx) = mpsc::channel();
        self.submit(command, move |reply| {
            let _ = tx.send(reply);
        });
        rx.recv_timeout(timeout).map_err(|err| match err {
            mpsc::RecvTimeoutError::Timeout => MonitorError::ReplyTimeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => MonitorError::ReplyDropped,
        })
    }

    fn enqueue(&self, command: String, handler: ReplyHandler) {
        let connected = {
            let mut state = lock(&self.shared.state);
            if state.connection.is_terminal() {
                warn!(
                    command = %redact(&command),
                    state = %state.connection,
                    "monitor is gone, dropping command"
                );
                state.abandoned.push(command);
                drop(state);
                drop(handler);
                return;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back(PendingCommand {
                seq,
                command,
                handler,
            });
            state.connection == ConnectionState::Connected
        };

        if connected {
            self.start_write_pump();
            self.start_read_pump();
        }
    }

    fn ensure_disconnected(&self) -> Result<()> {
        let state = lock(&self.shared.state);
        if state.connection != ConnectionState::Disconnected {
            return Err(MonitorError::AlreadyStarted(state.connection));
        }
        Ok(())
    }

    fn start_write_pump(&self) {
        if !try_acquire(&self.shared.writing) {
            return;
        }
        let monitor = self.clone();
        let spawned = thread::Builder::new()
            .name("hvmon-write".to_string())
            .spawn(move || monitor.write_pump());
        if let Err(err) = spawned {
            error!(error = %err, "failed to start monitor write pump");
            self.shared.writing.store(false, Ordering::Release);
        }
    }

    fn start_read_pump(&self) {
        if !try_acquire(&self.shared.reading) {
            return;
        }
        let Some(reader) = lock(&self.shared.reader).take() else {
            self.shared.reading.store(false, Ordering::Release);
            return;
        };
        let monitor = self.clone();
        let spawned = thread::Builder::new()
            .name("hvmon-read".to_string())
            .spawn(move || monitor.read_pump(reader));
        if let Err(err) = spawned {
            self.shared.reading.store(false, Ordering::Release);
            self.finish(MonitorError::Spawn(err));
        }
    }

    fn write_pump(&self) {
        loop {
            let clean = self.drain_commands();
            self.shared.writing.store(false, Ordering::Release);
            if !clean {
                return;
            }
            // A submit may have observed `writing == true` just before the
            // flag was cleared; pick its command up rather than stranding it.
            if !self.has_unsent() || !try_acquire(&self.shared.writing) {
                return;
            }
        }
    }

    /// Write queued commands until none remain. Returns false on a write error.
    fn drain_commands(&self) -> bool {
        loop {
            let (seq, command) = {
                let mut state = lock(&self.shared.state);
                if state.connection != ConnectionState::Connected
                    || state.sent >= state.pending.len()
                {
                    return true;
                }
                let index = state.sent;
                let entry = &state.pending[index];
                let next = (entry.seq, entry.command.clone());
                state.sent += 1;
                next
            };

            let result = match lock(&self.shared.writer).as_mut() {
                Some(writer) => writer.send(&command).map_err(MonitorError::from),
                None => Err(MonitorError::NotAttached),
            };

            match result {
                Ok(()) => debug!(command = %redact(&command), "command written"),
                Err(err) => {
                    error!(command = %redact(&command), error = %err, "write to monitor failed");
                    self.discard(seq);
                    // The read pump sees the shutdown and moves to `Failed`.
                    self.shutdown_stream();
                    return false;
                }
            }
        }
    }

    fn has_unsent(&self) -> bool {
        let state = lock(&self.shared.state);
        state.connection == ConnectionState::Connected && state.sent < state.pending.len()
    }

    /// Drop a command whose write failed. Its handler is never invoked.
    fn discard(&self, seq: u64) {
        let removed = {
            let mut state = lock(&self.shared.state);
            let position = state.pending.iter().position(|entry| entry.seq == seq);
            let removed = position.and_then(|index| {
                if index < state.sent {
                    state.sent -= 1;
                }
                state.pending.remove(index)
            });
            if let Some(entry) = &removed {
                state.abandoned.push(entry.command.clone());
            }
            removed
        };
        drop(removed);
    }

    /// Shut the stream down if it is still attached. Wakes a pump blocked in
    /// a read or write.
    fn shutdown_stream(&self) {
        let control = lock(&self.shared.control).take();
        if let Some(stream) = control {
            if let Err(err) = stream.shutdown() {
                debug!(error = %err, "monitor stream already closed");
            }
        }
    }

    fn read_pump(&self, mut reader: FrameReader<MonitorStream>) {
        let failure = loop {
            match reader.read_frame() {
                Ok(Some(frame)) => {
                    if frame.is_empty() {
                        continue;
                    }
                    match self.accept_frame() {
                        FrameDisposition::Handshake => {
                            debug!(greeting = %frame.text().trim(), "monitor greeting received");
                            if let Err(err) = reader.get_ref().set_read_timeout(None) {
                                warn!(error = %err, "failed to clear monitor read deadline");
                            }
                            self.shared.observer.on_connected();
                            self.start_write_pump();
                        }
                        FrameDisposition::Reply => self.dispatch(frame),
                    }
                }
                Ok(None) => break MonitorError::ConnectionClosed,
                Err(err) => break MonitorError::Frame(err),
            }
        };

        drop(reader);
        self.shared.reading.store(false, Ordering::Release);
        self.finish(failure);
    }

    /// Flip `AwaitingHandshake` to `Connected` on the first frame.
    fn accept_frame(&self) -> FrameDisposition {
        let mut state = lock(&self.shared.state);
        if state.connection == ConnectionState::AwaitingHandshake {
            state.connection = ConnectionState::Connected;
            return FrameDisposition::Handshake;
        }
        FrameDisposition::Reply
    }

    /// Hand `frame` to the oldest command awaiting a reply.
    fn dispatch(&self, frame: Frame) {
        let next = {
            let mut state = lock(&self.shared.state);
            if state.sent == 0 {
                None
            } else {
                state.sent -= 1;
                state.pending.pop_front()
            }
        };

        let Some(pending) = next else {
            warn!(reply = %frame.text().trim(), "discarding reply with no outstanding command");
            return;
        };

        let PendingCommand {
            command, handler, ..
        } = pending;
        let reply = frame.text();
        debug!(command = %redact(&command), bytes = reply.len(), "reply received");

        let spawned = thread::Builder::new()
            .name("hvmon-reply".to_string())
            .spawn(move || handler(reply));
        if let Err(err) = spawned {
            error!(command = %redact(&command), error = %err, "failed to run reply handler");
        }
    }

    /// Move to the terminal state matching how far the connection got.
    fn finish(&self, err: MonitorError) {
        let (previous, abandoned) = {
            let mut state = lock(&self.shared.state);
            let previous = state.connection;
            state.connection = match previous {
                ConnectionState::Connected => ConnectionState::Failed,
                ConnectionState::AwaitingHandshake => ConnectionState::TimedOut,
                other => other,
            };
            state.sent = 0;
            let abandoned: Vec<PendingCommand> = state.pending.drain(..).collect();
            state
                .abandoned
                .extend(abandoned.iter().map(|entry| entry.command.clone()));
            (previous, abandoned)
        };

        // A write pump blocked in `send` holds the writer lock until the
        // shutdown wakes it.
        self.shutdown_stream();
        *lock(&self.shared.writer) = None;

        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "abandoning unanswered monitor commands");
        }
        drop(abandoned);

        match previous {
            ConnectionState::Connected => {
                error!(error = %err, "monitor disconnected");
                self.shared.observer.on_disconnected(&err);
            }
            ConnectionState::AwaitingHandshake => {
                error!(error = %err, "monitor greeting not received");
                self.shared.observer.on_handshake_timeout(&err);
            }
            other => debug!(state = %other, error = %err, "read pump stopped"),
        }
    }
}

impl Default for HmpMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HmpMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("HmpMonitor")
            .field("state", &state.connection)
            .field("pending", &state.pending.len())
            .field("sent", &state.sent)
            .finish()
    }
}

fn try_acquire(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
