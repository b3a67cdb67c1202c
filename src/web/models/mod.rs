use serde::{Deserialize, Serialize};

use crate::devices::{DeviceSummary, LogSource};
use crate::scripts::RestoreMode;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub expires_at: i64,
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub expires_at: Option<i64>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub new_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RestoreRequest {
    #[serde(default)]
    pub restore_as: RestoreMode,
}

#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    pub serve_as_filename: bool,
}

/// Generic acknowledgement for mutating script operations.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
    #[serde(default)]
    pub source: LogSource,
}

/// Which logs receive a MARK line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkTarget {
    #[default]
    Both,
    #[serde(alias = "nginx_access")]
    Access,
    #[serde(alias = "nginx_error")]
    Error,
}

impl MarkTarget {
    pub fn sources(self) -> &'static [LogSource] {
        match self {
            MarkTarget::Both => &[LogSource::Access, LogSource::Error],
            MarkTarget::Access => &[LogSource::Access],
            MarkTarget::Error => &[LogSource::Error],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkQuery {
    #[serde(default)]
    pub source: MarkTarget,
}

#[derive(Debug, Serialize)]
pub struct MarkResponse {
    pub success: bool,
    pub message: String,
    pub marker: String,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceConnectionsResponse {
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub config_dir_exists: bool,
    pub bootstrap_script_exists: bool,
    pub active_script: Option<String>,
    pub access_log_exists: bool,
    pub auth_configured: bool,
}
