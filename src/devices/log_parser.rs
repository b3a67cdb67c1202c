use chrono::DateTime;

/// One access-log line in the combined format:
/// `IP - - [timestamp] "METHOD PATH PROTOCOL" STATUS SIZE "REFERRER" "USER-AGENT"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogRecord {
    pub ip: String,
    /// Epoch seconds.
    pub timestamp: i64,
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub status: u16,
    pub size: String,
    pub referrer: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogParseError {
    #[error("malformed log line: expected {0}")]
    Malformed(&'static str),
    #[error("invalid status code: {0}")]
    InvalidStatus(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub const LOG_TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn expect(&mut self, literal: &str, what: &'static str) -> Result<(), LogParseError> {
        self.rest = self
            .rest
            .strip_prefix(literal)
            .ok_or(LogParseError::Malformed(what))?;
        Ok(())
    }

    /// Everything up to (not including) `delim`; consumes the delimiter.
    fn until(&mut self, delim: char, what: &'static str) -> Result<&'a str, LogParseError> {
        let (taken, rest) = self
            .rest
            .split_once(delim)
            .ok_or(LogParseError::Malformed(what))?;
        self.rest = rest;
        Ok(taken)
    }

    fn non_empty_until(
        &mut self,
        delim: char,
        what: &'static str,
    ) -> Result<&'a str, LogParseError> {
        let taken = self.until(delim, what)?;
        if taken.is_empty() {
            return Err(LogParseError::Malformed(what));
        }
        Ok(taken)
    }
}

pub fn parse_line(line: &str) -> Result<AccessLogRecord, LogParseError> {
    let mut cursor = Cursor { rest: line };

    let ip = cursor.non_empty_until(' ', "client address")?;
    cursor.expect("- - [", "identity fields")?;
    let raw_timestamp = cursor.non_empty_until(']', "timestamp")?;
    cursor.expect(" \"", "request")?;
    let request = cursor.until('"', "request")?;
    cursor.expect(" ", "status")?;
    let status = cursor.non_empty_until(' ', "status")?;
    let size = cursor.non_empty_until(' ', "size")?;
    cursor.expect("\"", "referrer")?;
    let referrer = cursor.until('"', "referrer")?;
    cursor.expect(" \"", "user agent")?;
    let user_agent = cursor.until('"', "user agent")?;

    let mut parts = request.splitn(3, ' ');
    let method = parts.next().filter(|m| !m.is_empty());
    let path = parts.next().filter(|p| !p.is_empty());
    let protocol = parts.next().filter(|p| !p.is_empty());
    let (Some(method), Some(path), Some(protocol)) = (method, path, protocol) else {
        return Err(LogParseError::Malformed("METHOD PATH PROTOCOL"));
    };

    if !status.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LogParseError::InvalidStatus(status.to_string()));
    }
    let status: u16 = status
        .parse()
        .map_err(|_| LogParseError::InvalidStatus(status.to_string()))?;

    let timestamp = DateTime::parse_from_str(raw_timestamp, LOG_TIMESTAMP_FORMAT)
        .map_err(|_| LogParseError::InvalidTimestamp(raw_timestamp.to_string()))?
        .timestamp();

    Ok(AccessLogRecord {
        ip: ip.to_string(),
        timestamp,
        method: method.to_string(),
        path: path.to_string(),
        protocol: protocol.to_string(),
        status,
        size: size.to_string(),
        referrer: referrer.to_string(),
        user_agent: user_agent.to_string(),
    })
}
