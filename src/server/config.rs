use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::storage;

const NGINX_LOG_DIR: &str = "/var/log/nginx";
const ACCESS_LOG_NAME: &str = "ztpbootstrap_access.log";
const ERROR_LOG_NAME: &str = "ztpbootstrap_error.log";

#[derive(Clone)]
pub struct ServerConfig {
    /// Directory holding the bootstrap scripts and the panel's state files.
    pub config_dir: PathBuf,
    pub access_log: PathBuf,
    pub error_log: PathBuf,
    pub listen_addr: String,
    pub log_dir: String,
    pub admin_password_hash: Option<String>,
    /// Plaintext fallback, hashed once at startup when no hash is configured.
    pub admin_password: Option<String>,
    /// Session lifetime in seconds.
    pub session_timeout: u64,
    pub session_secret: String,
    pub https_enabled: bool,
    /// The TOML file the config was read from, if any.
    pub source_path: Option<PathBuf>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    config_dir: Option<PathBuf>,
    access_log: Option<PathBuf>,
    error_log: Option<PathBuf>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    admin_password_hash: Option<String>,
    admin_password: Option<String>,
    session_timeout: Option<u64>,
    session_secret: Option<String>,
    https_enabled: Option<bool>,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/opt/containerdata/ztpbootstrap")
}

/// The nginx log if it is mounted where nginx writes it, otherwise the copy
/// under `<config_dir>/logs`.
fn default_nginx_log(config_dir: &Path, name: &str) -> PathBuf {
    let nginx_log = Path::new(NGINX_LOG_DIR).join(name);
    if nginx_log.exists() {
        nginx_log
    } else {
        config_dir.join("logs").join(name)
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn random_session_secret() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let (file_config, source_path) = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                let parsed: PartialServerConfig = toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?;
                (parsed, Some(path.to_path_buf()))
            }
            Some(path) => (PartialServerConfig::default(), Some(path.to_path_buf())),
            None => (PartialServerConfig::default(), None),
        };

        // 2. Load from ZTP_-prefixed environment variables
        let env_config: PartialServerConfig = envy::prefixed("ZTP_")
            .from_env()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Ok(Self::merge(env_config, file_config, source_path))
    }

    fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
        source_path: Option<PathBuf>,
    ) -> Self {
        let config_dir = env_config
            .config_dir
            .or(file_config.config_dir)
            .unwrap_or_else(default_config_dir);
        let access_log = env_config
            .access_log
            .or(file_config.access_log)
            .unwrap_or_else(|| default_nginx_log(&config_dir, ACCESS_LOG_NAME));
        let error_log = env_config
            .error_log
            .or(file_config.error_log)
            .unwrap_or_else(|| default_nginx_log(&config_dir, ERROR_LOG_NAME));

        ServerConfig {
            access_log,
            error_log,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            admin_password_hash: env_config
                .admin_password_hash
                .or(file_config.admin_password_hash)
                .filter(|hash| !hash.is_empty()),
            admin_password: env_config
                .admin_password
                .or(file_config.admin_password)
                .filter(|password| !password.is_empty()),
            session_timeout: env_config
                .session_timeout
                .or(file_config.session_timeout)
                .unwrap_or(3600),
            session_secret: env_config
                .session_secret
                .or(file_config.session_secret)
                .unwrap_or_else(random_session_secret),
            https_enabled: env_config
                .https_enabled
                .or(file_config.https_enabled)
                .unwrap_or(false),
            config_dir,
            source_path,
        }
    }
}

/// Writes `admin_password_hash` into the TOML file at `path`, keeping every
/// other key as it was.
pub fn save_admin_password_hash(path: &Path, hash: &str) -> Result<(), String> {
    // A missing file starts out as an empty table.
    let existing_content = fs::read_to_string(path).unwrap_or_default();
    let mut document: toml::Value = toml::from_str(&existing_content)
        .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?;

    match document.as_table_mut() {
        Some(table) => {
            table.insert(
                "admin_password_hash".to_string(),
                toml::Value::String(hash.to_string()),
            );
        }
        None => return Err(format!("Config file at {path:?} is not a TOML table")),
    }

    let updated = toml::to_string_pretty(&document)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;
    storage::write_atomic(path, updated.as_bytes())
        .map_err(|e| format!("Failed to write config file at {path:?}: {e}"))?;

    info!(path = ?path, "Saved new admin password hash.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> PartialServerConfig {
        envy::prefixed("ZTP_")
            .from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .unwrap()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = ServerConfig::merge(
            PartialServerConfig::default(),
            PartialServerConfig::default(),
            None,
        );
        assert_eq!(config.config_dir, default_config_dir());
        assert_eq!(config.listen_addr, "0.0.0.0:5000");
        assert_eq!(config.session_timeout, 3600);
        assert!(!config.https_enabled);
        assert!(config.admin_password_hash.is_none());
        assert_eq!(config.session_secret.len(), 64);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: PartialServerConfig = toml::from_str(
            r#"
            config_dir = "/srv/ztp"
            listen_addr = "127.0.0.1:8000"
            session_timeout = 600
            "#,
        )
        .unwrap();
        let env = env(&[
            ("ZTP_LISTEN_ADDR", "127.0.0.1:9000"),
            ("ZTP_HTTPS_ENABLED", "true"),
            ("UNRELATED", "x"),
        ]);

        let config = ServerConfig::merge(env, file, None);
        assert_eq!(config.config_dir, PathBuf::from("/srv/ztp"));
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.session_timeout, 600);
        assert!(config.https_enabled);
    }

    #[test]
    fn test_nginx_logs_fall_back_under_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&[("ZTP_CONFIG_DIR", dir.path().to_str().unwrap())]);
        let config = ServerConfig::merge(env, PartialServerConfig::default(), None);

        if !Path::new(NGINX_LOG_DIR).join(ACCESS_LOG_NAME).exists() {
            assert_eq!(config.access_log, dir.path().join("logs").join(ACCESS_LOG_NAME));
        }
        if !Path::new(NGINX_LOG_DIR).join(ERROR_LOG_NAME).exists() {
            assert_eq!(config.error_log, dir.path().join("logs").join(ERROR_LOG_NAME));
        }
    }

    #[test]
    fn test_error_log_from_env() {
        let env = env(&[("ZTP_ERROR_LOG", "/tmp/ztp/error.log")]);
        let config = ServerConfig::merge(env, PartialServerConfig::default(), None);
        assert_eq!(config.error_log, PathBuf::from("/tmp/ztp/error.log"));
    }

    #[test]
    fn test_save_admin_password_hash_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.toml");
        fs::write(&path, "listen_addr = \"127.0.0.1:8000\"\nadmin_password_hash = \"old\"\n").unwrap();

        save_admin_password_hash(&path, "$2b$04$new").unwrap();

        let saved: PartialServerConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.listen_addr.as_deref(), Some("127.0.0.1:8000"));
        assert_eq!(saved.admin_password_hash.as_deref(), Some("$2b$04$new"));
    }
}
