use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::warn;

/// Serializes every read-modify-write cycle against one config directory.
///
/// The script registry and the device tracker share a single instance, since
/// both rewrite files living side by side in the same directory.
#[derive(Debug, Clone, Default)]
pub struct DirLock(Arc<Mutex<()>>);

impl DirLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Replaces `path` with `contents` via a temp file in the same directory and
/// an atomic rename. Readers see either the old file or the new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    // nginx reads the scripts as a different user; temp files start out 0600.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Loads a JSON document, treating a missing or unreadable file as empty state.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file, starting empty.");
            return T::default();
        }
    };

    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Failed to parse state file, starting empty.");
        T::default()
    })
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    write_atomic(path, &body)
}
