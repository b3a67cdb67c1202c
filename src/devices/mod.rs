//! Device check-in tracking reconstructed from the reverse proxy's access log.

pub mod connection;
pub mod ledger;
pub mod log_parser;
pub mod tracker;

pub use connection::{DeviceConnection, DeviceSession, DeviceSummary};
pub use log_parser::{AccessLogRecord, LogParseError};
pub use tracker::{ConnectionMap, DeviceTracker, LogSource};

/// Device summaries ordered by most recently seen first.
pub fn summarize(connections: &ConnectionMap) -> Vec<DeviceSummary> {
    let mut summaries: Vec<DeviceSummary> = connections.values().map(DeviceSummary::from).collect();
    summaries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    summaries
}
