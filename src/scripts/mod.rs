//! Bootstrap script registry: the set of `bootstrap*.py` files, which one is
//! served as `bootstrap.py`, backup rotation and per-script metadata.

use std::io;

pub mod backup;
pub mod metadata;
pub mod models;
pub mod naming;
pub mod pointer;
pub mod registry;

pub use models::{
    BackupInfo, RestoreMode, RestoreOutcome, ScriptContent, ScriptInfo, ScriptListing,
    ScriptMetadata,
};
pub use registry::ScriptRegistry;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Script not found: {0}")]
    NotFound(String),
    #[error("Invalid script name: {0}")]
    InvalidName(String),
    #[error("A script with the name {0} already exists")]
    Conflict(String),
    #[error("Cannot modify the active script {0}. Set another script as active first.")]
    ActiveScriptLocked(String),
    #[error("Symlink target not found: {0}")]
    SymlinkTargetMissing(String),
    #[error("File system error: {0}")]
    Io(#[from] io::Error),
}
