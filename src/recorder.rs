//! Durable append-only flight log and one-shot snapshots

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, StationError};

/// Line terminator used for every durable file.
pub const LINE_ENDING: &str = "\r\n";

/// Prefix of flight log and snapshot file names.
pub const FLIGHT_FILE_PREFIX: &str = "Flight_";

/// Default durable log name for a team (`Flight_1043.csv`).
pub fn flight_file_name(team_id: u16) -> String {
    format!("{}{:04}.csv", FLIGHT_FILE_PREFIX, team_id)
}

/// Append-only writer for canonical telemetry lines.
///
/// The destination is created with a header row on first use. Existing
/// content is never truncated or rewritten.
#[derive(Debug)]
pub struct Recorder {
    dir: PathBuf,
    path: PathBuf,
    header: String,
    delimiter: char,
    team_id: u16,
    writer: Option<BufWriter<File>>,
}

impl Recorder {
    /// Create a recorder writing `file_name` inside `dir`.
    ///
    /// Nothing touches the filesystem until the first append.
    pub fn new(
        dir: impl Into<PathBuf>,
        file_name: &str,
        header: impl Into<String>,
        delimiter: char,
        team_id: u16,
    ) -> Self {
        let dir = dir.into();
        let path = dir.join(file_name);
        Self { dir, path, header: header.into(), delimiter, team_id, writer: None }
    }

    /// Path of the durable log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line, flushing before returning.
    pub fn append(&mut self, line: &str) -> Result<()> {
        let path = self.path.clone();
        let result = self.writer().and_then(|writer| {
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.write_all(LINE_ENDING.as_bytes()))
                .and_then(|_| writer.flush())
                .map_err(|e| StationError::file_error(&path, e))
        });

        if result.is_err() {
            // Reopen on the next append instead of writing into a broken handle
            self.writer = None;
        }
        result
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            fs::create_dir_all(&self.dir).map_err(|e| StationError::file_error(&self.dir, e))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| StationError::file_error(&self.path, e))?;
            let is_empty = file.metadata().map_err(|e| StationError::file_error(&self.path, e))?.len() == 0;

            let mut writer = BufWriter::new(file);
            if is_empty {
                writer
                    .write_all(self.header.as_bytes())
                    .and_then(|_| writer.write_all(LINE_ENDING.as_bytes()))
                    .and_then(|_| writer.flush())
                    .map_err(|e| StationError::file_error(&self.path, e))?;
                info!(event = "log_created", path = %self.path.display(), "Created flight log");
            } else {
                debug!(path = %self.path.display(), "Appending to existing flight log");
            }
            self.writer = Some(writer);
        }

        // Populated just above
        self.writer.as_mut().ok_or_else(|| StationError::channel_closed("recorder writer"))
    }

    /// Write `rows` to a fresh file next to the durable log and return its path.
    ///
    /// The name is `Flight_<team>.csv`, where team comes from the first row
    /// whose first field is all digits, else the configured team. An existing
    /// name gets `(1)`, `(2)`, ... appended; nothing is ever overwritten.
    pub fn save_snapshot(&self, rows: &[String]) -> Result<PathBuf> {
        if rows.is_empty() {
            return Err(StationError::EmptyInput);
        }

        fs::create_dir_all(&self.dir).map_err(|e| StationError::file_error(&self.dir, e))?;

        let team = self.snapshot_team(rows);
        let mut content = String::with_capacity(rows.iter().map(|r| r.len() + 2).sum::<usize>() + 256);
        content.push_str(&self.header);
        content.push_str(LINE_ENDING);
        for row in rows {
            content.push_str(row.trim_end_matches(['\r', '\n']));
            content.push_str(LINE_ENDING);
        }

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}.csv", FLIGHT_FILE_PREFIX, team)
            } else {
                format!("{}{}({}).csv", FLIGHT_FILE_PREFIX, team, attempt)
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).map_err(|e| StationError::file_error(&path, e))?;
                    info!(event = "snapshot_saved", path = %path.display(), rows = rows.len(), "Saved snapshot");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Snapshot create failed");
                    return Err(StationError::file_error(path, e));
                }
            }
        }
    }

    fn snapshot_team(&self, rows: &[String]) -> String {
        rows.iter()
            .filter_map(|row| row.split(self.delimiter).next())
            .map(str::trim)
            .find(|first| !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()))
            .map(|team| format!("{:0>4}", team))
            .unwrap_or_else(|| format!("{:04}", self.team_id))
    }
}
