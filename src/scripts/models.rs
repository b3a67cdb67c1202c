use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptInfo {
    pub name: String,
    pub size: u64,
    /// Modification time, epoch seconds.
    pub modified: f64,
    pub active: bool,
    pub serve_as_filename: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScriptListing {
    pub scripts: Vec<ScriptInfo>,
    pub active: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptContent {
    pub name: String,
    pub content: String,
    pub size: u64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub size: u64,
    pub modified: f64,
    pub timestamp: i64,
    pub human_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Overwrite `bootstrap.py` with the backup bytes.
    Active,
    /// Copy the backup to a fresh `bootstrap_restored_*.py` file.
    #[default]
    New,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "restored_as", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Active,
    New { new_filename: String },
}

/// Per-script flags kept in `scripts_metadata.json`. Unknown keys written by
/// other tools survive a load/save cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serve_as_filename: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub(crate) fn modified_secs(meta: &Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
