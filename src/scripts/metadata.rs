use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use super::models::ScriptMetadata;
use crate::storage;

pub const METADATA_FILE: &str = "scripts_metadata.json";

pub type MetadataMap = BTreeMap<String, ScriptMetadata>;

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(METADATA_FILE),
        }
    }

    pub fn load(&self) -> MetadataMap {
        storage::load_json_or_default(&self.path)
    }

    pub fn save(&self, metadata: &MetadataMap) -> io::Result<()> {
        storage::save_json(&self.path, metadata)
    }

    /// Moves the entry for `old` to `new`. Returns false when `old` had none.
    pub fn rename_entry(&self, old: &str, new: &str) -> io::Result<bool> {
        let mut metadata = self.load();
        let Some(entry) = metadata.remove(old) else {
            return Ok(false);
        };
        metadata.insert(new.to_string(), entry);
        self.save(&metadata)?;
        Ok(true)
    }
}
