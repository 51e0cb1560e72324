//! Link lifecycle: connect, read, reconnect, shutdown
//!
//! The blocking read loop runs on its own OS thread. Its only contact with the
//! pipeline is a non-blocking channel send per decoded line. The open handle
//! is the one piece of state shared with the rest of the station; its mutex
//! is held for a single open/close/read/write call at a time.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backend::{LinkBackend, LinkPort};
use crate::config::LinkTiming;
use crate::pipeline::{LineOrigin, PipelineEvent};
use crate::types::{LinkConfig, LinkStatus, PortInfo};
use crate::{Result, StationError, UplinkFailure};

/// Longest partial line kept while waiting for a terminator.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Granularity of interruptible retry waits.
const PAUSE_SLICE: Duration = Duration::from_millis(25);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration plus a generation bumped on every change.
#[derive(Debug)]
struct VersionedConfig {
    config: LinkConfig,
    generation: u64,
}

/// State shared between the reader thread, the uplink writer and control calls.
struct LinkShared {
    config: Mutex<VersionedConfig>,
    port: Mutex<Option<Box<dyn LinkPort>>>,
    status: watch::Sender<LinkStatus>,
}

impl LinkShared {
    fn config_snapshot(&self) -> (LinkConfig, u64) {
        let guard = lock(&self.config);
        (guard.config.clone(), guard.generation)
    }

    fn set_status(&self, status: LinkStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    /// Store a freshly opened handle unless the config changed while opening.
    fn install(&self, port: Box<dyn LinkPort>, generation: u64) -> bool {
        let config = lock(&self.config);
        if config.generation != generation {
            return false;
        }
        *lock(&self.port) = Some(port);
        drop(config);
        self.set_status(LinkStatus::Connected);
        true
    }

    /// Drop the open handle, if any.
    fn close(&self) -> bool {
        let closed = lock(&self.port).take().is_some();
        self.set_status(LinkStatus::Disconnected);
        closed
    }

    fn with_port<T>(&self, f: impl FnOnce(&mut dyn LinkPort) -> T) -> Option<T> {
        let mut guard = lock(&self.port);
        guard.as_mut().map(|port| f(port.as_mut()))
    }

    fn write_frame(&self, frame: &[u8]) -> std::result::Result<(), UplinkFailure> {
        let result = self
            .with_port(|port| port.write_all(frame).and_then(|_| port.flush()))
            .ok_or(UplinkFailure::NoConnection)?;

        if let Err(e) = result {
            // A failed write ends the connection; the reader will reconnect
            self.close();
            return Err(UplinkFailure::Write(e));
        }
        Ok(())
    }
}

/// Cloneable control surface for the link: configuration, status, enumeration.
#[derive(Clone)]
pub struct LinkControl {
    shared: Arc<LinkShared>,
    backend: Arc<dyn LinkBackend>,
}

impl LinkControl {
    /// Current address and speed.
    pub fn config(&self) -> LinkConfig {
        self.shared.config_snapshot().0
    }

    /// Replace address and speed, then force a reconnect.
    ///
    /// Fails with [`StationError::InvalidSpeed`] without changing anything
    /// when the speed is not a preset.
    pub fn set_config(&self, config: LinkConfig) -> Result<()> {
        config.validate()?;
        {
            let mut current = lock(&self.shared.config);
            info!(event = "cfg_changed", address = %config.address, speed = config.speed);
            current.config = config;
            current.generation += 1;
        }
        if self.shared.close() {
            debug!("Closed link for reconfiguration");
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn status(&self) -> LinkStatus {
        *self.shared.status.borrow()
    }

    /// Observe lifecycle changes.
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.shared.status.subscribe()
    }

    /// Peripherals currently present.
    pub fn available_ports(&self) -> Result<Vec<PortInfo>> {
        self.backend.available()
    }
}

/// Sole write access to the link. Not cloneable: exactly one owner exists.
pub(crate) struct LinkWriter {
    shared: Arc<LinkShared>,
}

impl LinkWriter {
    /// Write one command followed by CRLF through the current handle.
    pub(crate) async fn write_line(&self, command: &str) -> std::result::Result<(), UplinkFailure> {
        let mut frame = Vec::with_capacity(command.len() + 2);
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(b"\r\n");

        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.write_frame(&frame))
            .await
            .unwrap_or_else(|e| Err(UplinkFailure::Write(std::io::Error::other(e))))
    }
}

/// Owner of the link lifecycle; consumed by [`LinkManager::spawn`].
pub(crate) struct LinkManager {
    shared: Arc<LinkShared>,
    backend: Arc<dyn LinkBackend>,
    timing: LinkTiming,
    cancel: CancellationToken,
}

impl LinkManager {
    /// Build the manager with its control surface and its single writer.
    pub(crate) fn new(
        backend: Arc<dyn LinkBackend>,
        config: LinkConfig,
        timing: LinkTiming,
        cancel: CancellationToken,
    ) -> (Self, LinkControl, LinkWriter) {
        let (status, _) = watch::channel(LinkStatus::Disconnected);
        let shared = Arc::new(LinkShared {
            config: Mutex::new(VersionedConfig { config, generation: 0 }),
            port: Mutex::new(None),
            status,
        });

        let control = LinkControl { shared: Arc::clone(&shared), backend: Arc::clone(&backend) };
        let writer = LinkWriter { shared: Arc::clone(&shared) };
        (Self { shared, backend, timing, cancel }, control, writer)
    }

    /// Start the reader thread.
    pub(crate) fn spawn(
        self,
        sink: mpsc::UnboundedSender<PipelineEvent>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new().name("groundlink-reader".into()).spawn(move || self.run(sink))
    }

    fn run(self, sink: mpsc::UnboundedSender<PipelineEvent>) {
        info!("Link reader started");

        while self.connect() {
            if !self.read_until_closed(&sink) {
                break;
            }
        }

        self.shared.close();
        info!("Link reader stopped");
    }

    /// Loop until a handle is installed. Returns false when cancelled.
    fn connect(&self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            self.shared.set_status(LinkStatus::Connecting);
            let (config, generation) = self.shared.config_snapshot();

            let present = match self.backend.available() {
                Ok(ports) => ports.iter().any(|p| p.port == config.address),
                Err(e) => {
                    warn!(event = "link_enumeration_failed", error = %e);
                    false
                }
            };

            if !present {
                info!(event = "link_absent", address = %config.address, "Configured port not present");
                if !self.pause(self.timing.absent_retry()) {
                    return false;
                }
                continue;
            }

            match self.backend.open(&config, self.timing.read_timeout()) {
                Ok(port) => {
                    if self.shared.install(port, generation) {
                        info!(event = "serial_connected", address = %config.address, speed = config.speed);
                        return true;
                    }
                    debug!("Config changed while opening, retrying with the new one");
                }
                Err(StationError::LinkPermissionDenied { address }) => {
                    warn!(
                        event = "serial_open_failed",
                        diagnostic = "permission_denied",
                        address = %address,
                        speed = config.speed,
                        "Permission denied opening link"
                    );
                    if !self.pause(self.timing.open_retry()) {
                        return false;
                    }
                }
                Err(e) => {
                    warn!(
                        event = "serial_open_failed",
                        address = %config.address,
                        speed = config.speed,
                        error = %e
                    );
                    if !self.pause(self.timing.open_retry()) {
                        return false;
                    }
                }
            }
        }
    }

    /// Read lines until the handle goes away.
    ///
    /// Returns false when the reader should stop (cancelled or pipeline gone).
    fn read_until_closed(&self, sink: &mpsc::UnboundedSender<PipelineEvent>) -> bool {
        let mut pending: Vec<u8> = Vec::with_capacity(512);
        let mut chunk = [0u8; 512];

        loop {
            if self.cancel.is_cancelled() {
                return false;
            }

            let Some(result) = self.shared.with_port(|port| port.read(&mut chunk)) else {
                info!(event = "serial_disconnected", reason = "closed");
                return true;
            };

            match result {
                Ok(0) => {
                    info!(event = "serial_disconnected", reason = "EOF");
                    self.shared.close();
                    return true;
                }
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    for line in drain_lines(&mut pending) {
                        trace!(line = %line, "Received line");
                        if sink.send(PipelineEvent::Line { raw: line, origin: LineOrigin::Link }).is_err() {
                            debug!("Pipeline gone, stopping reader");
                            return false;
                        }
                    }
                    if pending.len() > MAX_PENDING_BYTES {
                        warn!(bytes = pending.len(), "Discarding unterminated input");
                        pending.clear();
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => {
                    warn!(event = "serial_disconnected", reason = %e);
                    self.shared.close();
                    return true;
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns false when cancelled.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

/// Split complete lines off the front of `pending`.
///
/// Terminators (`\n`, optionally preceded by `\r`) are stripped, bytes are
/// decoded lossily, and empty lines are dropped.
fn drain_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
        let text = text.trim_end_matches('\r');
        if !text.is_empty() {
            lines.push(text.to_string());
        }
    }
    lines
}
