use chrono::{DateTime, Utc};

use super::RegistryError;

pub const POINTER_NAME: &str = "bootstrap.py";
pub const SCRIPT_PREFIX: &str = "bootstrap";
pub const SCRIPT_EXTENSION: &str = ".py";
pub const BACKUP_PREFIX: &str = "bootstrap_backup_";
pub const RESTORED_PREFIX: &str = "bootstrap_restored_";

/// Returns the name unchanged if it matches `bootstrap[A-Za-z0-9_.-]*\.py`
/// and carries no traversal sequence.
pub fn sanitize(name: &str) -> Option<&str> {
    if name.is_empty()
        || name.contains('\0')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return None;
    }

    let middle = name
        .strip_prefix(SCRIPT_PREFIX)?
        .strip_suffix(SCRIPT_EXTENSION)?;
    middle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .then_some(name)
}

/// Validates a name taken from a request path.
pub fn validate_api_name(name: &str) -> Result<&str, RegistryError> {
    if !name.ends_with(SCRIPT_EXTENSION) {
        return Err(RegistryError::InvalidName(format!(
            "{name} must end with {SCRIPT_EXTENSION}"
        )));
    }
    sanitize(name).ok_or_else(|| RegistryError::InvalidName(name.to_string()))
}

/// Turns a user-supplied target name into a valid script name.
///
/// A bare name without any extension gets `.py` appended; a name carrying a
/// different extension is rejected. Names missing the `bootstrap` prefix get
/// `bootstrap_` prepended before re-validating.
pub fn normalize_new_name(candidate: &str) -> Result<String, RegistryError> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(RegistryError::InvalidName("name is required".to_string()));
    }
    if let Some(valid) = sanitize(candidate) {
        return Ok(valid.to_string());
    }

    let mut fixed = candidate.to_string();
    if !fixed.ends_with(SCRIPT_EXTENSION) {
        let has_extension = fixed
            .rsplit_once('.')
            .is_some_and(|(stem, _)| !stem.is_empty());
        if has_extension {
            return Err(RegistryError::InvalidName(format!(
                "{candidate} must end with {SCRIPT_EXTENSION}"
            )));
        }
        fixed.push_str(SCRIPT_EXTENSION);
    }
    if !fixed.starts_with(SCRIPT_PREFIX) {
        fixed = format!("{SCRIPT_PREFIX}_{fixed}");
    }

    match sanitize(&fixed) {
        Some(_) => Ok(fixed),
        None => Err(RegistryError::InvalidName(candidate.to_string())),
    }
}

pub fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(SCRIPT_EXTENSION)
}

pub fn backup_name(timestamp: i64) -> String {
    format!("{BACKUP_PREFIX}{timestamp}{SCRIPT_EXTENSION}")
}

/// The unix timestamp embedded in a backup name, if it parses.
pub fn backup_timestamp(name: &str) -> Option<i64> {
    name.strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(SCRIPT_EXTENSION)?
        .parse()
        .ok()
}

pub fn restored_name(backup: &str, now: DateTime<Utc>) -> String {
    let when = backup_timestamp(backup)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or(now);
    format!(
        "{RESTORED_PREFIX}{}{SCRIPT_EXTENSION}",
        when.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_accepts_grammar() {
        assert_eq!(sanitize("bootstrap.py"), Some("bootstrap.py"));
        assert_eq!(sanitize("bootstrap2.py"), Some("bootstrap2.py"));
        assert_eq!(sanitize("bootstrap_v1.2-rc.py"), Some("bootstrap_v1.2-rc.py"));
    }

    #[test]
    fn test_sanitize_rejects_traversal_and_bad_chars() {
        for bad in [
            "",
            "bootstrap",
            "boot.py",
            "bootstrap..py",
            "../bootstrap.py",
            "bootstrap/x.py",
            "bootstrap\\x.py",
            "bootstrap\0.py",
            "bootstrap x.py",
            "bootstrap.sh",
        ] {
            assert_eq!(sanitize(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_api_name_requires_extension() {
        assert!(validate_api_name("bootstrap2.py").is_ok());
        assert!(matches!(
            validate_api_name("bootstrap2"),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_normalize_new_name() {
        assert_eq!(normalize_new_name("prod").unwrap(), "bootstrap_prod.py");
        assert_eq!(normalize_new_name("prod.py").unwrap(), "bootstrap_prod.py");
        assert_eq!(normalize_new_name(" bootstrap3.py ").unwrap(), "bootstrap3.py");
        assert!(normalize_new_name("prod.sh").is_err());
        assert!(normalize_new_name("../etc/passwd").is_err());
        assert!(normalize_new_name("   ").is_err());
    }

    #[test]
    fn test_backup_names() {
        assert_eq!(backup_name(1000), "bootstrap_backup_1000.py");
        assert!(is_backup_name("bootstrap_backup_1000.py"));
        assert!(!is_backup_name("bootstrap.py"));
        assert_eq!(backup_timestamp("bootstrap_backup_1000.py"), Some(1000));
        assert_eq!(backup_timestamp("bootstrap_backup_old.py"), None);
    }

    #[test]
    fn test_restored_name_uses_embedded_timestamp() {
        let now = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(
            restored_name("bootstrap_backup_1762603200.py", now),
            "bootstrap_restored_20251108_120000.py"
        );
        assert_eq!(
            restored_name("bootstrap_backup_manual.py", now),
            "bootstrap_restored_19700101_000000.py"
        );
    }
}
