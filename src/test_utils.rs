//! Test utilities: small schemas, fast timings and an in-memory link
//!
//! The mock backend stands in for serial hardware. Ports can appear and
//! disappear, opens can be refused, and the wire can be fed or broken from
//! the test while the link manager's reader thread is running.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{FeedTiming, LinkSettings, LinkTiming, StationConfig};
use crate::link::{LinkBackend, LinkPort};
use crate::types::{Column, ColumnType, LinkConfig, PortInfo, Schema};
use crate::{Result, StationError};

/// The three-column schema used by the documented scenarios:
/// `TEAM` (int), `SEQ` (int, sequence), `ALT` (float).
pub fn scenario_schema() -> Schema {
    Schema::new(
        vec![
            Column::new("TEAM", "team", ColumnType::Int),
            Column::new("SEQ", "seq", ColumnType::Int),
            Column::new("ALT", "alt", ColumnType::Float),
        ],
        "seq",
        ',',
    )
    .expect("scenario schema is valid")
}

/// Link timing short enough for tests to observe several retry cycles.
pub fn fast_link_timing() -> LinkTiming {
    LinkTiming { absent_retry_ms: 10, open_retry_ms: 10, read_timeout_ms: 5 }
}

/// Station config writing into `data_dir`, linked to mock port `mock0`.
pub fn test_config(data_dir: &Path) -> StationConfig {
    StationConfig {
        team_id: 1043,
        link: LinkSettings { address: "mock0".to_string(), speed: 115200, enabled: true },
        data_dir: data_dir.to_path_buf(),
        log_file: None,
        history_capacity: 1_000,
        keepalive_ms: 10_000,
        link_timing: fast_link_timing(),
        feed_timing: FeedTiming { settle_ms: 1, cadence_ms: 5, generator_period_ms: 5, generator_seed: Some(1) },
        schema_path: None,
    }
}

/// Lines in the built-in flight schema layout, for benches and parser tests.
pub fn sample_flight_lines(count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| {
            format!(
                "1043,00:00:{:02},{},S,ASCENT,{:.2},24.1,99.870,8.21,0.25,0.10,-0.20,0.30,0.01,0.02,9.81,12:00:{:02},{:.2},13.75630,100.50180,9,CXON,{}",
                n % 60,
                n,
                n as f64 * 3.5,
                n % 60,
                n as f64 * 3.5,
                if n % 2 == 0 { "181.50" } else { "" },
            )
        })
        .map(|line| line.trim_end_matches(',').to_string())
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct WireState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_next_read: bool,
    fail_writes: bool,
}

/// Both directions of the mock wire. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockWire {
    state: Arc<Mutex<WireState>>,
}

impl MockWire {
    /// Make bytes available to the next reads.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Fail the next read with a broken pipe.
    pub fn fail_next_read(&self) {
        lock(&self.state).fail_next_read = true;
    }

    /// Fail every write until turned off.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

/// Open handle onto a [`MockWire`].
#[derive(Debug)]
pub struct MockPort {
    wire: MockWire,
    read_timeout: Duration,
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = lock(&self.wire.state);
            if state.fail_next_read {
                state.fail_next_read = false;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }

        std::thread::sleep(self.read_timeout.min(Duration::from_millis(5)));
        Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.wire.state);
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BackendState {
    ports: Vec<String>,
    deny_permission: bool,
    open_attempts: usize,
    opened: Vec<String>,
}

/// In-memory [`LinkBackend`].
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<BackendState>,
    wire: MockWire,
}

impl MockBackend {
    /// Backend whose enumeration reports `ports`.
    pub fn with_ports(ports: &[&str]) -> Self {
        let backend = Self::default();
        backend.set_ports(ports);
        backend
    }

    /// Replace the enumerated ports.
    pub fn set_ports(&self, ports: &[&str]) {
        lock(&self.state).ports = ports.iter().map(|p| p.to_string()).collect();
    }

    /// Refuse opens with a permission error while set.
    pub fn deny_permission(&self, deny: bool) {
        lock(&self.state).deny_permission = deny;
    }

    /// Calls to `open`, successful or not.
    pub fn open_attempts(&self) -> usize {
        lock(&self.state).open_attempts
    }

    /// Addresses successfully opened, in order.
    pub fn opened_addresses(&self) -> Vec<String> {
        lock(&self.state).opened.clone()
    }

    /// The wire shared by every handle this backend opens.
    pub fn wire(&self) -> MockWire {
        self.wire.clone()
    }
}

impl LinkBackend for MockBackend {
    fn available(&self) -> Result<Vec<PortInfo>> {
        Ok(lock(&self.state)
            .ports
            .iter()
            .map(|port| PortInfo { port: port.clone(), info: "Mock radio 0000:0000".to_string() })
            .collect())
    }

    fn open(&self, config: &LinkConfig, read_timeout: Duration) -> Result<Box<dyn LinkPort>> {
        let mut state = lock(&self.state);
        state.open_attempts += 1;

        if state.deny_permission {
            return Err(StationError::LinkPermissionDenied { address: config.address.clone() });
        }
        if !state.ports.contains(&config.address) {
            return Err(StationError::link_open_failed(&config.address, "no such device"));
        }

        state.opened.push(config.address.clone());
        Ok(Box::new(MockPort { wire: self.wire.clone(), read_timeout }))
    }
}
