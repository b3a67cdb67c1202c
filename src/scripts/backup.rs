use chrono::DateTime;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{info, warn};

use super::models::{BackupInfo, modified_secs};
use super::naming::{backup_timestamp, is_backup_name};

pub const MAX_BACKUPS: usize = 5;

fn backup_entries(dir: &Path) -> Vec<(String, fs::Metadata)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read script directory.");
            return Vec::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !is_backup_name(&name) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            meta.is_file().then_some((name, meta))
        })
        .collect()
}

/// Deletes every backup beyond the `keep` most recently modified ones.
/// Returns how many files were removed; removal failures are only logged.
pub fn prune_backups(dir: &Path, keep: usize) -> usize {
    let mut backups = backup_entries(dir);
    backups.sort_by_key(|(_, meta)| {
        std::cmp::Reverse(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
    });

    let mut removed = 0;
    for (name, _) in backups.into_iter().skip(keep) {
        match fs::remove_file(dir.join(&name)) {
            Ok(()) => {
                info!(backup = %name, "Deleted old backup.");
                removed += 1;
            }
            Err(e) => warn!(backup = %name, error = %e, "Failed to delete old backup."),
        }
    }
    removed
}

/// Backups, newest first by the timestamp embedded in their name.
pub fn list_backups(dir: &Path) -> Vec<BackupInfo> {
    let mut backups: Vec<BackupInfo> = backup_entries(dir)
        .into_iter()
        .map(|(name, meta)| {
            let modified = modified_secs(&meta);
            let timestamp = backup_timestamp(&name).unwrap_or(modified as i64);
            let human_date = DateTime::from_timestamp(timestamp, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            BackupInfo {
                size: meta.len(),
                name,
                modified,
                timestamp,
                human_date,
            }
        })
        .collect();

    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.name.cmp(&b.name)));
    backups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn write_with_mtime(path: &Path, contents: &[u8], mtime: u64) {
        fs::write(path, contents).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
            .unwrap();
    }

    #[test]
    fn test_prune_keeps_newest_five() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=7u64 {
            write_with_mtime(
                &dir.path().join(format!("bootstrap_backup_{i}.py")),
                b"old",
                i * 100,
            );
        }
        fs::write(dir.path().join("bootstrap2.py"), b"keep me").unwrap();

        assert_eq!(prune_backups(dir.path(), MAX_BACKUPS), 2);

        let left: Vec<String> = list_backups(dir.path()).into_iter().map(|b| b.name).collect();
        assert_eq!(
            left,
            vec![
                "bootstrap_backup_7.py",
                "bootstrap_backup_6.py",
                "bootstrap_backup_5.py",
                "bootstrap_backup_4.py",
                "bootstrap_backup_3.py",
            ]
        );
        assert!(dir.path().join("bootstrap2.py").exists());
    }

    #[test]
    fn test_list_backups_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        write_with_mtime(&dir.path().join("bootstrap_backup_manual.py"), b"x", 1_000);
        write_with_mtime(&dir.path().join("bootstrap_backup_2000.py"), b"yy", 50);

        let backups = list_backups(dir.path());
        assert_eq!(backups[0].name, "bootstrap_backup_2000.py");
        assert_eq!(backups[0].size, 2);
        assert_eq!(backups[1].timestamp, 1_000);
        assert_eq!(backups[1].human_date, "1970-01-01 00:16:40");
    }
}
