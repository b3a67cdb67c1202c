use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace, warn};

use super::connection::{DeviceConnection, is_device_traffic};
use super::ledger::{LEDGER_CAPACITY, LEDGER_FILE, ProcessedLedger};
use super::log_parser::parse_line;
use crate::storage::{self, DirLock};

pub const CONNECTIONS_FILE: &str = "device_connections.json";
/// Number of trailing access-log lines examined on each pass.
pub const TAIL_WINDOW: usize = 1000;

pub type ConnectionMap = BTreeMap<String, DeviceConnection>;

/// One of the reverse proxy's log files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogSource {
    #[default]
    #[serde(rename = "nginx_access", alias = "access")]
    Access,
    #[serde(rename = "nginx_error", alias = "error")]
    Error,
}

impl LogSource {
    pub fn label(self) -> &'static str {
        match self {
            LogSource::Access => "access",
            LogSource::Error => "error",
        }
    }
}

/// Requests made by the panel's own UI and API, as seen in the access log.
pub fn is_panel_line(line: &str) -> bool {
    ["/ui/", "/api/", " /ui ", " /api "]
        .iter()
        .any(|needle| line.contains(needle))
}

/// Rebuilds per-device connection history from the tail of the access log.
#[derive(Debug, Clone)]
pub struct DeviceTracker {
    connections_path: PathBuf,
    ledger_path: PathBuf,
    access_log: PathBuf,
    error_log: Option<PathBuf>,
    lock: DirLock,
}

impl DeviceTracker {
    pub fn new(config_dir: &Path, access_log: impl Into<PathBuf>, lock: DirLock) -> Self {
        Self {
            connections_path: config_dir.join(CONNECTIONS_FILE),
            ledger_path: config_dir.join(LEDGER_FILE),
            access_log: access_log.into(),
            error_log: None,
            lock,
        }
    }

    pub fn with_error_log(mut self, error_log: impl Into<PathBuf>) -> Self {
        self.error_log = Some(error_log.into());
        self
    }

    pub fn access_log(&self) -> &Path {
        &self.access_log
    }

    /// Path of the given log, if one is configured.
    pub fn log_path(&self, source: LogSource) -> Option<&Path> {
        match source {
            LogSource::Access => Some(&self.access_log),
            LogSource::Error => self.error_log.as_deref(),
        }
    }

    fn require_log(&self, source: LogSource) -> io::Result<&Path> {
        self.log_path(source).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} log configured", source.label()),
            )
        })
    }

    /// Folds any unseen log lines into the persisted device map, drops stale
    /// devices and returns the result. Never fails: I/O problems are logged
    /// and the best available state is returned.
    pub fn refresh(&self, now: i64) -> ConnectionMap {
        let _guard = self.lock.acquire();

        let mut connections: ConnectionMap = storage::load_json_or_default(&self.connections_path);
        let mut ledger = ProcessedLedger::load(&self.ledger_path);

        let lines = match read_tail(&self.access_log, TAIL_WINDOW) {
            Ok(lines) => lines,
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    debug!(path = %self.access_log.display(), "Access log not present yet.");
                } else {
                    warn!(path = %self.access_log.display(), error = %e, "Failed to read access log.");
                }
                return connections;
            }
        };

        let mut folded = 0usize;
        for line in &lines {
            if !ledger.contains(line) && fold_line(&mut connections, line) {
                folded += 1;
            }
        }
        ledger.merge(lines, LEDGER_CAPACITY);

        let before = connections.len();
        connections.retain(|_, device| !device.is_expired(now));
        let expired = before - connections.len();

        if let Err(e) = ledger.save(&self.ledger_path) {
            error!(path = %self.ledger_path.display(), error = %e, "Failed to save processed-line ledger.");
        }
        if let Err(e) = storage::save_json(&self.connections_path, &connections) {
            error!(path = %self.connections_path.display(), error = %e, "Failed to save device connections.");
        }

        debug!(folded, expired, devices = connections.len(), "Device connections refreshed.");
        connections
    }

    /// Last `count` non-empty lines of a log. For the access log, the panel's
    /// own `/ui/` and `/api/` requests are dropped from that window.
    pub fn recent_lines(&self, source: LogSource, count: usize) -> io::Result<Vec<String>> {
        let mut lines = read_tail(self.require_log(source)?, count)?;
        if source == LogSource::Access {
            lines.retain(|line| !is_panel_line(line));
        }
        Ok(lines)
    }

    /// Appends a visual marker to a log. The log must already exist.
    pub fn mark_log(&self, source: LogSource, now: DateTime<Utc>) -> io::Result<String> {
        let marker = mark_line(now);
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.require_log(source)?)?;
        writeln!(file, "{marker}")?;
        Ok(marker)
    }
}

pub fn mark_line(now: DateTime<Utc>) -> String {
    format!("===== MARK: {} =====", now.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// Returns whether the line produced a device update. Unparseable and
/// excluded lines are only recorded in the ledger by the caller.
fn fold_line(connections: &mut ConnectionMap, line: &str) -> bool {
    let record = match parse_line(line) {
        Ok(record) => record,
        Err(e) => {
            trace!(error = %e, "Skipping unparseable access-log line.");
            return false;
        }
    };
    if !is_device_traffic(&record) {
        return false;
    }

    connections
        .entry(record.ip.clone())
        .or_insert_with(|| DeviceConnection::new(&record))
        .record(&record);
    true
}

/// The last `max_lines` lines of `path`, trimmed, with blank lines dropped.
pub fn read_tail(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let raw = fs::read(path)?;
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);

    Ok(lines[start..]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
