use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },
    #[error("{0}")]
    InvalidName(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ActiveScriptLocked(String),
    #[error("{0}")]
    SymlinkTargetMissing(String),
    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },
    #[error("Invalid or missing CSRF token")]
    Forbidden,
    #[error("Too many login attempts. Please try again in {} minute(s).", .remaining_secs / 60)]
    RateLimited { remaining_secs: i64 },
    #[error("{message}")]
    ServiceUnavailable { code: &'static str, message: String },
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn auth_required() -> Self {
        AppError::Unauthorized {
            code: "AUTH_REQUIRED",
            message: "Authentication required".to_string(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code),
            AppError::InvalidName(_) => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::ActiveScriptLocked(_) => (StatusCode::BAD_REQUEST, "ACTIVE_SCRIPT_LOCKED"),
            AppError::SymlinkTargetMissing(_) => (StatusCode::NOT_FOUND, "SYMLINK_TARGET_MISSING"),
            AppError::Unauthorized { code, .. } => (StatusCode::UNAUTHORIZED, *code),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "CSRF_ERROR"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::ServiceUnavailable { code, .. } => (StatusCode::SERVICE_UNAVAILABLE, *code),
            AppError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let mut body = serde_json::json!({ "error": self.to_string(), "code": code });
        if let AppError::RateLimited { remaining_secs } = self {
            body["remaining_time"] = serde_json::json!(remaining_secs);
        }
        (status, Json(body)).into_response()
    }
}
