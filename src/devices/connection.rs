use serde::{Deserialize, Serialize};

use super::log_parser::AccessLogRecord;

/// Requests closer together than this belong to the same session.
pub const SESSION_GAP_SECS: i64 = 300;
pub const MAX_SESSIONS: usize = 50;
/// Devices not seen for longer than this are dropped.
pub const DEVICE_TTL_SECS: i64 = 86_400;

const DEVICE_AGENT_MARKERS: [&str; 3] = ["Arista", "EOS", "ZTP"];
const BROWSER_AGENT_MARKERS: [&str; 4] = ["Mozilla", "Gecko", "Chrome", "Safari"];
const PANEL_PATHS: [&str; 3] = ["/health", "/ui", "/api"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub start: i64,
    pub end: i64,
    #[serde(rename = "requests")]
    pub request_count: u64,
}

impl DeviceSession {
    fn starting_at(timestamp: i64) -> Self {
        Self {
            start: timestamp,
            end: timestamp,
            request_count: 1,
        }
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnection {
    pub ip: String,
    pub first_seen: i64,
    pub last_seen: i64,
    #[serde(default)]
    pub bootstrap_downloaded: bool,
    #[serde(default)]
    pub bootstrap_download_time: Option<i64>,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub sessions: Vec<DeviceSession>,
}

pub fn is_bootstrap_path(path: &str) -> bool {
    path == "/bootstrap.py" || path == "/"
}

/// Whether a request should count as device traffic rather than panel,
/// health-check or browser noise.
pub fn is_device_traffic(record: &AccessLogRecord) -> bool {
    let agent = record.user_agent.as_str();
    let path = record.path.as_str();

    let device_agent = DEVICE_AGENT_MARKERS.iter().any(|m| agent.contains(m));
    if device_agent || is_bootstrap_path(path) {
        return true;
    }

    let panel_path = PANEL_PATHS.contains(&path)
        || path.starts_with("/ui/")
        || path.starts_with("/api/")
        || path.contains("/api/");
    let browser_agent = BROWSER_AGENT_MARKERS.iter().any(|m| agent.contains(m));
    !(panel_path || browser_agent)
}

impl DeviceConnection {
    pub fn new(record: &AccessLogRecord) -> Self {
        Self {
            ip: record.ip.clone(),
            first_seen: record.timestamp,
            last_seen: record.timestamp,
            bootstrap_downloaded: false,
            bootstrap_download_time: None,
            total_requests: 0,
            user_agent: record.user_agent.clone(),
            sessions: Vec::new(),
        }
    }

    /// Folds one request into the device's counters and session windows.
    pub fn record(&mut self, record: &AccessLogRecord) {
        let ts = record.timestamp;
        self.last_seen = self.last_seen.max(ts);
        self.total_requests += 1;
        self.user_agent.clone_from(&record.user_agent);

        if record.status == 200 && is_bootstrap_path(&record.path) {
            self.bootstrap_downloaded = true;
            let latest = self.bootstrap_download_time.map_or(ts, |t| t.max(ts));
            self.bootstrap_download_time = Some(latest);
        }

        match self.sessions.last_mut() {
            Some(last) if ts - last.end < SESSION_GAP_SECS => {
                last.end = last.end.max(ts);
                last.request_count += 1;
            }
            _ => self.sessions.push(DeviceSession::starting_at(ts)),
        }
        if self.sessions.len() > MAX_SESSIONS {
            let excess = self.sessions.len() - MAX_SESSIONS;
            self.sessions.drain(..excess);
        }
    }

    /// Retained while `last_seen` is at most `DEVICE_TTL_SECS` old.
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.last_seen > DEVICE_TTL_SECS
    }
}

/// Per-device totals served by the device-connections endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub ip: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub bootstrap_downloaded: bool,
    pub bootstrap_download_time: Option<i64>,
    pub total_requests: u64,
    pub total_sessions: usize,
    pub total_duration: i64,
    pub last_session_duration: i64,
    pub user_agent: String,
}

impl From<&DeviceConnection> for DeviceSummary {
    fn from(device: &DeviceConnection) -> Self {
        Self {
            ip: device.ip.clone(),
            first_seen: device.first_seen,
            last_seen: device.last_seen,
            bootstrap_downloaded: device.bootstrap_downloaded,
            bootstrap_download_time: device.bootstrap_download_time,
            total_requests: device.total_requests,
            total_sessions: device.sessions.len(),
            total_duration: device.sessions.iter().map(DeviceSession::duration).sum(),
            last_session_duration: device.sessions.last().map_or(0, DeviceSession::duration),
            user_agent: if device.user_agent.is_empty() {
                "Unknown".to_string()
            } else {
                device.user_agent.clone()
            },
        }
    }
}
