use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::server::config::{ServerConfig, save_admin_password_hash};

pub const SESSION_COOKIE: &str = "ztp_session";
pub const MIN_PASSWORD_LEN: usize = 8;
const SESSION_SUBJECT: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication is not configured")]
    NotConfigured,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("New password must be at least 8 characters long")]
    PasswordTooShort,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Token creation failed: {0}")]
    Token(String),
    #[error("Failed to save new password: {0}")]
    Persist(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    /// Token the client must echo in `X-CSRF-Token` on mutating requests.
    pub csrf: String,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub csrf_token: String,
    pub expires_at: i64,
}

/// Single-admin password check and signed session tokens.
pub struct AuthService {
    password_hash: RwLock<Option<String>>,
    session_secret: String,
    session_timeout: u64,
    https_enabled: bool,
    config_path: Option<PathBuf>,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(password_hash: Option<String>, session_secret: String, session_timeout: u64) -> Self {
        Self {
            password_hash: RwLock::new(password_hash),
            session_secret,
            session_timeout,
            https_enabled: false,
            config_path: None,
            hash_cost: DEFAULT_COST,
        }
    }

    /// Builds the service from config, hashing a plaintext admin password
    /// when no hash was provided.
    pub fn from_config(config: &ServerConfig) -> Result<Self, AuthError> {
        let password_hash = match (&config.admin_password_hash, &config.admin_password) {
            (Some(existing), _) => Some(existing.clone()),
            (None, Some(plain)) => {
                info!("Hashing admin password from environment.");
                Some(hash(plain, DEFAULT_COST).map_err(|e| AuthError::Hashing(e.to_string()))?)
            }
            (None, None) => {
                warn!("No admin password configured; write operations are disabled.");
                None
            }
        };

        let mut service = Self::new(
            password_hash,
            config.session_secret.clone(),
            config.session_timeout,
        );
        service.https_enabled = config.https_enabled;
        if let Some(path) = &config.source_path {
            service = service.with_config_path(path);
        }
        Ok(service)
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn https_enabled(&self) -> bool {
        self.https_enabled
    }

    pub async fn is_configured(&self) -> bool {
        self.password_hash.read().await.is_some()
    }

    async fn verify_password(&self, password: &str) -> Result<bool, AuthError> {
        let guard = self.password_hash.read().await;
        let stored = guard.as_deref().ok_or(AuthError::NotConfigured)?;
        match verify(password, stored) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                // Unsupported or corrupt hash formats never authenticate.
                warn!(error = %e, "Stored admin password hash could not be checked.");
                Ok(false)
            }
        }
    }

    pub async fn login(&self, password: &str) -> Result<IssuedSession, AuthError> {
        if !self.verify_password(password).await? {
            return Err(AuthError::InvalidPassword);
        }
        self.issue_session()
    }

    fn issue_session(&self) -> Result<IssuedSession, AuthError> {
        let expires_at = Utc::now().timestamp() + self.session_timeout as i64;
        let claims = SessionClaims {
            sub: SESSION_SUBJECT.to_string(),
            exp: expires_at as usize,
            csrf: hex::encode(rand::random::<[u8; 32]>()),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.session_secret.as_ref()),
        )
        .map_err(|e| AuthError::Token(e.to_string()))?;

        Ok(IssuedSession {
            token,
            csrf_token: claims.csrf,
            expires_at,
        })
    }

    pub fn validate_session(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.session_secret.as_ref()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            warn!(error = ?e, "Rejected session token.");
            AuthError::InvalidSession
        })
    }

    /// Replaces the admin password. When the config came from a file, the new
    /// hash is written there first so it survives a restart.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        if !self.verify_password(current).await? {
            return Err(AuthError::InvalidPassword);
        }

        let new_hash = hash(new, self.hash_cost).map_err(|e| AuthError::Hashing(e.to_string()))?;
        if let Some(path) = &self.config_path {
            save_admin_password_hash(path, &new_hash).map_err(AuthError::Persist)?;
        }
        *self.password_hash.write().await = Some(new_hash);

        info!("Admin password changed.");
        Ok(())
    }
}
