use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// State of the `bootstrap.py` entry that the reverse proxy serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivePointer {
    Missing,
    /// A regular file: its content is the active script.
    Regular,
    /// A symlink; holds the raw link target as stored on disk.
    Alias(PathBuf),
}

impl ActivePointer {
    pub fn read(path: &Path) -> io::Result<Self> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => Ok(Self::Alias(fs::read_link(path)?)),
            Ok(_) => Ok(Self::Regular),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Missing),
            Err(e) => Err(e),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular)
    }
}

/// File name an entry finally resolves to after following every symlink.
/// `None` for missing entries, dangling links and loops.
pub fn resolved_name(path: &Path) -> Option<String> {
    let resolved = fs::canonicalize(path).ok()?;
    resolved.file_name()?.to_str().map(str::to_string)
}

/// True when both entries resolve to the same file on disk.
pub fn same_target(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
