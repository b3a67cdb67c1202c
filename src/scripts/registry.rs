use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

use super::backup::{self, MAX_BACKUPS};
use super::metadata::{MetadataMap, MetadataStore};
use super::models::{
    BackupInfo, RestoreMode, RestoreOutcome, ScriptContent, ScriptInfo, ScriptListing,
    ScriptMetadata, modified_secs,
};
use super::naming::{
    self, POINTER_NAME, is_backup_name, normalize_new_name, sanitize, validate_api_name,
};
use super::pointer::{ActivePointer, resolved_name, same_target};
use super::RegistryError;
use crate::storage::{self, DirLock};

/// Owns the script directory. Every operation runs under the directory lock,
/// so a reader never observes a half-rotated pointer.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    dir: PathBuf,
    lock: DirLock,
    metadata: MetadataStore,
}

impl ScriptRegistry {
    pub fn new(dir: impl Into<PathBuf>, lock: DirLock) -> Self {
        let dir = dir.into();
        let metadata = MetadataStore::new(&dir);
        Self {
            dir,
            lock,
            metadata,
        }
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_NAME)
    }

    fn active_name(&self) -> Option<String> {
        resolved_name(&self.pointer_path())
    }

    /// Name of the script `bootstrap.py` currently resolves to.
    pub fn active_script(&self) -> Option<String> {
        let _guard = self.lock.acquire();
        self.active_name()
    }

    /// Looks up a named entry that resolves to a regular file.
    fn existing_file(&self, name: &str) -> Result<(PathBuf, fs::Metadata), RegistryError> {
        let path = self.dir.join(name);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok((path, meta)),
            Ok(_) => Err(RegistryError::NotFound(name.to_string())),
            // Dangling links and loops count as absent.
            Err(e) if e.kind() == io::ErrorKind::NotFound || path.is_symlink() => {
                Err(RegistryError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn script_info(
        name: String,
        meta: &fs::Metadata,
        active: Option<&str>,
        metadata: &MetadataMap,
    ) -> ScriptInfo {
        let serve_as_filename = metadata
            .get(&name)
            .and_then(|m| m.serve_as_filename)
            .unwrap_or(false);
        ScriptInfo {
            active: active == Some(name.as_str()),
            size: meta.len(),
            modified: modified_secs(meta),
            serve_as_filename,
            name,
        }
    }

    pub fn list(&self) -> Result<ScriptListing, RegistryError> {
        let _guard = self.lock.acquire();
        let active = self.active_name();
        let metadata = self.metadata.load();

        let mut scripts = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read directory entry.");
                    continue;
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if sanitize(&name).is_none() || is_backup_name(&name) {
                continue;
            }

            // fs::metadata follows links, so loops and dangling links drop out here.
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {
                    scripts.push(Self::script_info(name, &meta, active.as_deref(), &metadata));
                }
                Ok(_) => {}
                Err(e) => debug!(script = %name, error = %e, "Skipping unresolvable entry."),
            }
        }

        if !scripts.iter().any(|s| s.name == POINTER_NAME) {
            if let Ok(meta) = fs::metadata(self.pointer_path()) {
                scripts.push(Self::script_info(
                    POINTER_NAME.to_string(),
                    &meta,
                    active.as_deref(),
                    &metadata,
                ));
            }
        }

        scripts.sort_by(|a, b| b.active.cmp(&a.active).then_with(|| a.name.cmp(&b.name)));
        scripts.dedup_by(|a, b| a.name == b.name);

        Ok(ScriptListing { scripts, active })
    }

    pub fn get(&self, name: &str) -> Result<ScriptContent, RegistryError> {
        let name = validate_api_name(name)?;
        let _guard = self.lock.acquire();
        let (path, meta) = self.existing_file(name)?;
        let bytes = fs::read(&path)?;

        Ok(ScriptContent {
            name: name.to_string(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
            size: meta.len(),
            active: self.active_name().as_deref() == Some(name),
        })
    }

    /// Makes `name` the script served as `bootstrap.py`.
    ///
    /// Activating `bootstrap.py` itself turns a symlinked pointer into a
    /// regular file holding the target's bytes. Activating anything else
    /// points `bootstrap.py` at it; a regular-file pointer is first kept as
    /// `bootstrap_backup_<mtime>.py` and old backups are pruned.
    pub fn activate(&self, name: &str) -> Result<(), RegistryError> {
        let name = validate_api_name(name)?;
        let _guard = self.lock.acquire();
        let pointer_path = self.pointer_path();
        let pointer = ActivePointer::read(&pointer_path)?;

        if name == POINTER_NAME {
            return self.promote_pointer(&pointer_path, &pointer);
        }

        let (target_path, _) = self.existing_file(name)?;
        if target_path.is_symlink() && same_target(&target_path, &pointer_path) {
            // An alias of the active content; relinking could loop back to bootstrap.py.
            debug!(script = %name, "Script already resolves to the active content.");
            return Ok(());
        }

        // A symlink carries no content of its own, so only a regular file is kept.
        let backup_path = match &pointer {
            ActivePointer::Regular => Some(self.link_backup(&pointer_path)?),
            ActivePointer::Alias(_) | ActivePointer::Missing => None,
        };

        // bootstrap.py stays in place until the new link is renamed over it.
        if let Err(e) = self.link_pointer(name) {
            if let Some(backup_path) = backup_path {
                let _ = fs::remove_file(backup_path);
            }
            return Err(e);
        }
        if backup_path.is_some() {
            backup::prune_backups(&self.dir, MAX_BACKUPS);
        }
        info!(script = %name, "Activated bootstrap script.");
        Ok(())
    }

    /// Hard-links the regular-file pointer to `bootstrap_backup_<mtime>.py`.
    /// The backup shares the pointer's inode, so content and mtime carry over.
    fn link_backup(&self, pointer_path: &Path) -> Result<PathBuf, RegistryError> {
        let modified = fs::symlink_metadata(pointer_path)?.modified()?;
        let timestamp = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let backup_name = naming::backup_name(timestamp);
        let backup_path = self.dir.join(&backup_name);

        if backup_path.exists() || backup_path.is_symlink() {
            warn!(backup = %backup_name, "Replacing existing backup with the same timestamp.");
            fs::remove_file(&backup_path)?;
        }
        fs::hard_link(pointer_path, &backup_path)?;
        info!(backup = %backup_name, "Saved previous bootstrap.py content as backup.");
        Ok(backup_path)
    }

    fn promote_pointer(
        &self,
        pointer_path: &Path,
        pointer: &ActivePointer,
    ) -> Result<(), RegistryError> {
        let link = match pointer {
            ActivePointer::Missing => {
                return Err(RegistryError::NotFound(POINTER_NAME.to_string()));
            }
            ActivePointer::Regular => return Ok(()),
            ActivePointer::Alias(link) => link,
        };

        let source = fs::canonicalize(pointer_path)
            .map_err(|_| RegistryError::SymlinkTargetMissing(link.display().to_string()))?;
        let source_meta = fs::metadata(&source)?;
        let bytes = fs::read(&source)?;

        // Persisting over the symlink replaces the link itself, not its target.
        storage::write_atomic(pointer_path, &bytes)?;
        File::options()
            .write(true)
            .open(pointer_path)?
            .set_modified(source_meta.modified()?)?;

        info!(source = %source.display(), "bootstrap.py is now a regular file.");
        Ok(())
    }

    /// Points `bootstrap.py` at `target` by renaming a fresh symlink over it.
    fn link_pointer(&self, target: &str) -> Result<(), RegistryError> {
        let tmp = self
            .dir
            .join(format!(".{POINTER_NAME}.{}.tmp", hex::encode(rand::random::<[u8; 8]>())));
        symlink(target, &tmp)?;
        if let Err(e) = fs::rename(&tmp, self.pointer_path()) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Renames a script, returning the normalized new name.
    pub fn rename(&self, old: &str, new: &str) -> Result<String, RegistryError> {
        let old = validate_api_name(old)?;
        let new = normalize_new_name(new)?;
        let _guard = self.lock.acquire();
        let (old_path, _) = self.existing_file(old)?;

        let new_path = self.dir.join(&new);
        if new != old && (new_path.exists() || new_path.is_symlink()) {
            return Err(RegistryError::Conflict(new));
        }
        if same_target(&old_path, &self.pointer_path()) {
            return Err(RegistryError::ActiveScriptLocked(old.to_string()));
        }
        if new == old {
            return Ok(new);
        }

        fs::rename(&old_path, &new_path)?;
        if let Err(e) = self.metadata.rename_entry(old, &new) {
            warn!(old = %old, new = %new, error = %e, "Failed to move script metadata.");
        }
        info!(old = %old, new = %new, "Renamed bootstrap script.");
        Ok(new)
    }

    pub fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let name = validate_api_name(name)?;
        let _guard = self.lock.acquire();
        let (path, _) = self.existing_file(name)?;
        let pointer_path = self.pointer_path();

        if name == POINTER_NAME && ActivePointer::read(&pointer_path)?.is_regular() {
            return Err(RegistryError::ActiveScriptLocked(name.to_string()));
        }
        if same_target(&path, &pointer_path) {
            return Err(RegistryError::ActiveScriptLocked(name.to_string()));
        }

        fs::remove_file(&path)?;
        info!(script = %name, "Deleted bootstrap script.");
        Ok(())
    }

    pub fn list_backups(&self) -> Vec<BackupInfo> {
        let _guard = self.lock.acquire();
        backup::list_backups(&self.dir)
    }

    /// Restores a backup. `RestoreMode::Active` overwrites `bootstrap.py`
    /// directly without taking a new backup; the source is never deleted.
    pub fn restore_backup(
        &self,
        name: &str,
        mode: RestoreMode,
        now: DateTime<Utc>,
    ) -> Result<RestoreOutcome, RegistryError> {
        if !is_backup_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let name = sanitize(name).ok_or_else(|| RegistryError::InvalidName(name.to_string()))?;
        let _guard = self.lock.acquire();
        let (backup_path, _) = self.existing_file(name)?;
        let bytes = fs::read(&backup_path)?;

        match mode {
            RestoreMode::Active => {
                storage::write_atomic(&self.pointer_path(), &bytes)?;
                info!(backup = %name, "Restored backup as bootstrap.py.");
                Ok(RestoreOutcome::Active)
            }
            RestoreMode::New => {
                let new_filename = naming::restored_name(name, now);
                let new_path = self.dir.join(&new_filename);
                if new_path.exists() || new_path.is_symlink() {
                    return Err(RegistryError::Conflict(new_filename));
                }
                storage::write_atomic(&new_path, &bytes)?;
                info!(backup = %name, restored = %new_filename, "Restored backup as new script.");
                Ok(RestoreOutcome::New { new_filename })
            }
        }
    }

    /// Stores uploaded content under a normalized name, replacing any regular
    /// file of that name. Returns the stored name.
    pub fn upload(&self, filename: &str, contents: &[u8]) -> Result<String, RegistryError> {
        let name = normalize_new_name(filename)?;
        let _guard = self.lock.acquire();
        let path = self.dir.join(&name);
        if path.is_symlink() {
            return Err(RegistryError::Conflict(name));
        }

        storage::write_atomic(&path, contents)?;
        info!(script = %name, bytes = contents.len(), "Uploaded bootstrap script.");
        Ok(name)
    }

    pub fn set_metadata(
        &self,
        name: &str,
        serve_as_filename: bool,
    ) -> Result<ScriptMetadata, RegistryError> {
        let name = validate_api_name(name)?;
        let _guard = self.lock.acquire();
        self.existing_file(name)?;

        let mut metadata = self.metadata.load();
        let entry = metadata.entry(name.to_string()).or_default();
        entry.serve_as_filename = Some(serve_as_filename);
        let updated = entry.clone();
        self.metadata.save(&metadata)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn registry() -> (tempfile::TempDir, ScriptRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ScriptRegistry::new(dir.path(), DirLock::new());
        (dir, registry)
    }

    fn write_with_mtime(path: &Path, contents: &[u8], mtime: u64) {
        fs::write(path, contents).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
            .unwrap();
    }

    fn active_flags(listing: &ScriptListing) -> Vec<&str> {
        listing
            .scripts
            .iter()
            .filter(|s| s.active)
            .map(|s| s.name.as_str())
            .collect()
    }

    #[test]
    fn test_activate_regular_pointer_creates_backup() {
        let (dir, registry) = registry();
        write_with_mtime(&dir.path().join("bootstrap.py"), b"original", 1000);
        fs::write(dir.path().join("bootstrap2.py"), b"second").unwrap();

        registry.activate("bootstrap2.py").unwrap();

        let pointer = dir.path().join("bootstrap.py");
        assert_eq!(fs::read_link(&pointer).unwrap(), PathBuf::from("bootstrap2.py"));
        assert_eq!(
            fs::read(dir.path().join("bootstrap_backup_1000.py")).unwrap(),
            b"original"
        );

        let listing = registry.list().unwrap();
        assert_eq!(listing.active.as_deref(), Some("bootstrap2.py"));
        assert_eq!(active_flags(&listing), vec!["bootstrap2.py"]);
        assert_eq!(listing.scripts[0].name, "bootstrap2.py");
        assert_eq!(
            listing.scripts.iter().filter(|s| s.name == "bootstrap.py").count(),
            1
        );
        assert!(listing.scripts.iter().all(|s| !s.name.starts_with("bootstrap_backup_")));
    }

    #[test]
    fn test_pointer_never_missing_during_rotation() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

        let (dir, registry) = registry();
        write_with_mtime(&dir.path().join("bootstrap.py"), b"base", 500);
        for (i, name) in ["bootstrap_a.py", "bootstrap_b.py"].iter().enumerate() {
            write_with_mtime(&dir.path().join(name), name.as_bytes(), 600 + i as u64);
        }

        let pointer = dir.path().join("bootstrap.py");
        let done = Arc::new(AtomicBool::new(false));
        let missing = Arc::new(AtomicUsize::new(0));
        let reader = {
            let (done, missing) = (done.clone(), missing.clone());
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    if fs::symlink_metadata(&pointer).is_err() {
                        missing.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };

        for round in 0..50 {
            let name = if round % 2 == 0 { "bootstrap_a.py" } else { "bootstrap_b.py" };
            registry.activate(name).unwrap();
            registry.activate("bootstrap.py").unwrap();
        }
        done.store(true, Ordering::Relaxed);
        reader.join().unwrap();

        assert_eq!(missing.load(Ordering::Relaxed), 0);
        assert!(registry.list_backups().len() <= MAX_BACKUPS);
    }

    #[test]
    fn test_backup_with_same_timestamp_is_replaced() {
        let (dir, registry) = registry();
        let pointer = dir.path().join("bootstrap.py");
        write_with_mtime(&pointer, b"first", 1000);
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        fs::write(dir.path().join("bootstrap3.py"), b"three").unwrap();

        registry.activate("bootstrap2.py").unwrap();
        fs::remove_file(&pointer).unwrap();
        write_with_mtime(&pointer, b"second", 1000);
        registry.activate("bootstrap3.py").unwrap();

        let backups = registry.list_backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read(dir.path().join("bootstrap_backup_1000.py")).unwrap(),
            b"second"
        );
        assert_eq!(registry.active_script().as_deref(), Some("bootstrap3.py"));
    }

    #[test]
    fn test_activate_over_symlink_takes_no_backup() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        fs::write(dir.path().join("bootstrap3.py"), b"three").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        registry.activate("bootstrap3.py").unwrap();
        registry.activate("bootstrap3.py").unwrap();

        assert!(registry.list_backups().is_empty());
        assert_eq!(registry.active_script().as_deref(), Some("bootstrap3.py"));
        assert_eq!(fs::read(dir.path().join("bootstrap2.py")).unwrap(), b"two");
    }

    #[test]
    fn test_activate_missing_script_is_not_found() {
        let (_dir, registry) = registry();
        assert!(matches!(
            registry.activate("bootstrap9.py"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.activate("bootstrap.py"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.activate("../bootstrap.py"),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_activate_pointer_promotes_symlink_target() {
        let (dir, registry) = registry();
        write_with_mtime(&dir.path().join("bootstrap2.py"), b"two", 4242);
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        registry.activate("bootstrap.py").unwrap();

        let pointer = dir.path().join("bootstrap.py");
        assert!(!pointer.is_symlink());
        assert_eq!(fs::read(&pointer).unwrap(), b"two");
        assert_eq!(
            fs::metadata(&pointer).unwrap().modified().unwrap(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(4242)
        );
        let listing = registry.list().unwrap();
        assert_eq!(active_flags(&listing), vec!["bootstrap.py"]);

        // Already a regular file: nothing changes.
        registry.activate("bootstrap.py").unwrap();
        assert_eq!(fs::read(&pointer).unwrap(), b"two");
    }

    #[test]
    fn test_activate_pointer_with_dangling_symlink() {
        let (dir, registry) = registry();
        symlink("bootstrap_gone.py", dir.path().join("bootstrap.py")).unwrap();

        assert!(matches!(
            registry.activate("bootstrap.py"),
            Err(RegistryError::SymlinkTargetMissing(_))
        ));
    }

    #[test]
    fn test_backup_count_never_exceeds_limit() {
        let (dir, registry) = registry();
        write_with_mtime(&dir.path().join("bootstrap.py"), b"seed", 900);

        for i in 0..8u64 {
            let name = format!("bootstrap{i}.py");
            write_with_mtime(&dir.path().join(&name), name.as_bytes(), 1000 + i);
            registry.activate(&name).unwrap();
            assert!(registry.list_backups().len() <= MAX_BACKUPS);
            registry.activate("bootstrap.py").unwrap();
        }

        let backups = registry.list_backups();
        assert_eq!(backups.len(), MAX_BACKUPS);
        assert_eq!(backups[0].name, "bootstrap_backup_1006.py");
    }

    #[test]
    fn test_exactly_one_active_after_activation_sequence() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap.py"), b"base").unwrap();
        for name in ["bootstrap_a.py", "bootstrap_b.py", "bootstrap_c.py"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        for name in [
            "bootstrap_a.py",
            "bootstrap_b.py",
            "bootstrap.py",
            "bootstrap_c.py",
            "bootstrap_c.py",
            "bootstrap_a.py",
        ] {
            registry.activate(name).unwrap();
            let listing = registry.list().unwrap();
            let expected = if name == "bootstrap.py" {
                "bootstrap.py"
            } else {
                name
            };
            assert_eq!(active_flags(&listing), vec![expected]);
            assert_eq!(listing.active.as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_list_is_stable_and_skips_loops() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap.py"), b"base").unwrap();
        fs::write(dir.path().join("bootstrap_b.py"), b"b").unwrap();
        fs::write(dir.path().join("bootstrap_a.py"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        symlink("bootstrap_loop.py", dir.path().join("bootstrap_loop.py")).unwrap();

        let first = registry.list().unwrap();
        let second = registry.list().unwrap();
        assert_eq!(first, second);

        let names: Vec<&str> = first.scripts.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bootstrap.py", "bootstrap_a.py", "bootstrap_b.py"]);
    }

    #[test]
    fn test_get_reports_content_and_active_flag() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"print(2)").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        let script = registry.get("bootstrap2.py").unwrap();
        assert_eq!(script.content, "print(2)");
        assert_eq!(script.size, 8);
        assert!(script.active);
        assert!(!registry.get("bootstrap.py").unwrap().active);
        assert!(matches!(
            registry.get("bootstrap3.py"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.get("bootstrap2"),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_delete_regular_pointer_is_locked() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap.py"), b"base").unwrap();

        assert!(matches!(
            registry.delete("bootstrap.py"),
            Err(RegistryError::ActiveScriptLocked(_))
        ));
        assert!(dir.path().join("bootstrap.py").exists());
    }

    #[test]
    fn test_delete_active_target_is_locked_and_others_removed() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        fs::write(dir.path().join("bootstrap3.py"), b"three").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        assert!(matches!(
            registry.delete("bootstrap2.py"),
            Err(RegistryError::ActiveScriptLocked(_))
        ));
        assert!(matches!(
            registry.delete("bootstrap.py"),
            Err(RegistryError::ActiveScriptLocked(_))
        ));

        registry.delete("bootstrap3.py").unwrap();
        assert!(!dir.path().join("bootstrap3.py").exists());
        assert!(matches!(
            registry.delete("bootstrap3.py"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_prefixes_and_moves_metadata() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap.py"), b"base").unwrap();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        registry.set_metadata("bootstrap2.py", true).unwrap();

        let new_name = registry.rename("bootstrap2.py", "prod").unwrap();

        assert_eq!(new_name, "bootstrap_prod.py");
        assert!(!dir.path().join("bootstrap2.py").exists());
        assert_eq!(fs::read(dir.path().join("bootstrap_prod.py")).unwrap(), b"two");
        let listing = registry.list().unwrap();
        let renamed = listing
            .scripts
            .iter()
            .find(|s| s.name == "bootstrap_prod.py")
            .unwrap();
        assert!(renamed.serve_as_filename);
    }

    #[test]
    fn test_rename_to_same_name_is_noop() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap.py"), b"base").unwrap();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        registry.set_metadata("bootstrap2.py", true).unwrap();
        let before = registry.list().unwrap();

        assert_eq!(
            registry.rename("bootstrap2.py", "bootstrap2.py").unwrap(),
            "bootstrap2.py"
        );

        assert_eq!(fs::read(dir.path().join("bootstrap2.py")).unwrap(), b"two");
        assert_eq!(registry.list().unwrap(), before);
    }

    #[test]
    fn test_rename_rejections() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        fs::write(dir.path().join("bootstrap3.py"), b"three").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        assert!(matches!(
            registry.rename("bootstrap3.py", "bootstrap2.py"),
            Err(RegistryError::Conflict(_))
        ));
        assert!(matches!(
            registry.rename("bootstrap3.py", "prod.sh"),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.rename("bootstrap2.py", "bootstrap_new.py"),
            Err(RegistryError::ActiveScriptLocked(_))
        ));
        assert!(matches!(
            registry.rename("bootstrap.py", "bootstrap_new.py"),
            Err(RegistryError::ActiveScriptLocked(_))
        ));
        assert!(matches!(
            registry.rename("bootstrap9.py", "bootstrap_new.py"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_restore_backup_as_new_and_active() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap_backup_1762603200.py"), b"old").unwrap();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();
        let now = DateTime::from_timestamp(0, 0).unwrap();

        let outcome = registry
            .restore_backup("bootstrap_backup_1762603200.py", RestoreMode::New, now)
            .unwrap();
        assert_eq!(
            outcome,
            RestoreOutcome::New {
                new_filename: "bootstrap_restored_20251108_120000.py".to_string()
            }
        );
        assert_eq!(
            fs::read(dir.path().join("bootstrap_restored_20251108_120000.py")).unwrap(),
            b"old"
        );
        assert!(matches!(
            registry.restore_backup("bootstrap_backup_1762603200.py", RestoreMode::New, now),
            Err(RegistryError::Conflict(_))
        ));

        let outcome = registry
            .restore_backup("bootstrap_backup_1762603200.py", RestoreMode::Active, now)
            .unwrap();
        assert_eq!(outcome, RestoreOutcome::Active);
        let pointer = dir.path().join("bootstrap.py");
        assert!(!pointer.is_symlink());
        assert_eq!(fs::read(&pointer).unwrap(), b"old");
        assert_eq!(fs::read(dir.path().join("bootstrap2.py")).unwrap(), b"two");
        assert!(dir.path().join("bootstrap_backup_1762603200.py").exists());
        assert_eq!(registry.list_backups().len(), 1);
    }

    #[test]
    fn test_restore_rejects_non_backup_names() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        let now = Utc::now();

        assert!(matches!(
            registry.restore_backup("bootstrap2.py", RestoreMode::New, now),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.restore_backup("bootstrap_backup_1.py", RestoreMode::New, now),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_upload_normalizes_and_refuses_symlinks() {
        let (dir, registry) = registry();
        fs::write(dir.path().join("bootstrap2.py"), b"two").unwrap();
        symlink("bootstrap2.py", dir.path().join("bootstrap.py")).unwrap();

        assert_eq!(registry.upload("lab.py", b"lab").unwrap(), "bootstrap_lab.py");
        assert_eq!(fs::read(dir.path().join("bootstrap_lab.py")).unwrap(), b"lab");
        assert!(matches!(
            registry.upload("bootstrap.py", b"x"),
            Err(RegistryError::Conflict(_))
        ));
        assert!(matches!(
            registry.upload("../evil.py", b"x"),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_set_metadata_requires_existing_script() {
        let (_dir, registry) = registry();
        assert!(matches!(
            registry.set_metadata("bootstrap2.py", true),
            Err(RegistryError::NotFound(_))
        ));
    }
}
