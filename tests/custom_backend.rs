//! A station driven through the public API on a hand-written link backend.
//!
//! The backend loops every uplink command back as a telemetry line, so one
//! test exercises enumeration, connect, uplink, downlink, logging and health.

use anyhow::{Context, Result};
use groundlink::{
    Envelope, GroundStation, HistoryEntry, LinkBackend, LinkConfig, LinkPort, LinkStatus, PortInfo, StationConfig,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Echoes `CMD,<team>,ECHO,<seq>,<alt>` back as `<team>,<seq>,<alt>`.
struct LoopbackPort {
    pending: Arc<Mutex<VecDeque<u8>>>,
}

impl Read for LoopbackPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            drop(pending);
            std::thread::sleep(Duration::from_millis(2));
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(pending.len());
        for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for LoopbackPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for command in text.split_terminator("\r\n") {
            let parts: Vec<&str> = command.split(',').collect();
            if let ["CMD", team, "ECHO", seq, alt] = parts.as_slice() {
                let line = format!("{},{},{}\n", team, seq, alt);
                self.pending.lock().unwrap().extend(line.bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct LoopbackBackend;

impl LinkBackend for LoopbackBackend {
    fn available(&self) -> groundlink::Result<Vec<PortInfo>> {
        Ok(vec![PortInfo { port: "loop0".into(), info: "Loopback".into() }])
    }

    fn open(&self, _config: &LinkConfig, _read_timeout: Duration) -> groundlink::Result<Box<dyn LinkPort>> {
        Ok(Box::new(LoopbackPort { pending: Arc::new(Mutex::new(VecDeque::new())) }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_loop_back_as_telemetry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let schema_path = dir.path().join("schema.yaml");
    std::fs::write(
        &schema_path,
        "sequence_key: seq\ncolumns:\n  - { name: TEAM, key: team, type: int }\n  - { name: SEQ, key: seq, type: int }\n  - { name: ALT, key: alt, type: float }\n",
    )?;

    let yaml = format!(
        "team_id: 42\nlink:\n  address: loop0\n  speed: 9600\ndata_dir: {}\nschema_path: {}\nlink_timing:\n  absent_retry_ms: 10\n  open_retry_ms: 10\n  read_timeout_ms: 5\n",
        dir.path().display(),
        schema_path.display()
    );
    let config = StationConfig::from_yaml_str(&yaml)?;
    let station = GroundStation::spawn_with_backend(config, Arc::new(LoopbackBackend))?;
    let mut live = station.subscribe().await?;

    let mut status = station.watch_link_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| *s == LinkStatus::Connected))
        .await
        .context("link never connected")??;

    assert_eq!(station.send_command("ECHO,1,12.5")?, "CMD,0042,ECHO,1,12.5");
    station.send_command("ECHO,4,40")?;

    let mut seqs = Vec::new();
    while seqs.len() < 2 {
        let envelope = tokio::time::timeout(WAIT, live.recv()).await?.context("subscription ended")?;
        if let Envelope::Telemetry(record) = &*envelope {
            seqs.push(record.int("seq").context("seq column")?);
        }
    }
    assert_eq!(seqs, vec![1, 4]);

    let health = station.health().await?;
    assert_eq!(health.received, 2);
    assert_eq!(health.lost, 2);
    assert_eq!(health.last_command.as_deref(), Some("CMD,0042,ECHO,4,40"));

    let history = station.history(10).await?;
    let sent = history.iter().filter(|e| matches!(e, HistoryEntry::Uplink(_))).count();
    assert_eq!(sent, 2);

    let log = std::fs::read_to_string(dir.path().join("Flight_0042.csv"))?;
    assert_eq!(log, "TEAM,SEQ,ALT\r\n42,1,12.50\r\n42,4,40.00\r\n");

    station.shutdown().await;
    Ok(())
}
