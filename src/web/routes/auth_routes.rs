use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    middleware as axum_middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::services::AuthError;
use crate::services::auth_service::SESSION_COOKIE;
use crate::web::middleware::auth::{self, current_session};
use crate::web::models::{
    ActionResponse, AuthStatusResponse, ChangePasswordRequest, LoginRequest, LoginResponse,
};
use crate::web::{AppError, AppState};

const UNKNOWN_CLIENT: &str = "unknown";

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::NotConfigured => AppError::ServiceUnavailable {
                code: "AUTH_NOT_CONFIGURED",
                message,
            },
            AuthError::InvalidPassword => AppError::Unauthorized {
                code: "INVALID_PASSWORD",
                message,
            },
            AuthError::InvalidSession => AppError::auth_required(),
            AuthError::PasswordTooShort => AppError::BadRequest {
                code: "PASSWORD_TOO_SHORT",
                message,
            },
            AuthError::Hashing(_) | AuthError::Token(_) | AuthError::Persist(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}

pub fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/status", get(auth_status))
        .route("/login", post(login))
        .route("/logout", post(logout));

    let protected = Router::new()
        .route("/change-password", post(change_password))
        .route_layer(axum_middleware::from_fn_with_state(app_state, auth::auth));

    public.merge(protected)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Client address as reported by the reverse proxy in front of the panel.
pub fn client_ip(headers: &HeaderMap) -> String {
    header_value(headers, "x-real-ip")
        .or_else(|| {
            header_value(headers, "x-forwarded-for")
                .and_then(|forwarded| forwarded.split(',').next())
                .map(str::trim)
        })
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

async fn auth_status(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Json<AuthStatusResponse> {
    let response = match current_session(&app_state.auth, &headers, &jar) {
        Some(claims) => AuthStatusResponse {
            authenticated: true,
            expires_at: Some(claims.exp as i64),
            csrf_token: Some(claims.csrf),
        },
        None => AuthStatusResponse {
            authenticated: false,
            expires_at: None,
            csrf_token: None,
        },
    };
    Json(response)
}

async fn login(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let client = client_ip(&headers);
    let now = Utc::now().timestamp();

    if let Some(remaining_secs) = app_state.login_limiter.lockout_remaining(&client, now).await {
        warn!(client = %client, remaining_secs, "Login attempt while locked out.");
        return Err(AppError::RateLimited { remaining_secs });
    }
    if !app_state.auth.is_configured().await {
        return Err(AuthError::NotConfigured.into());
    }

    let Some(password) = payload.password else {
        app_state.login_limiter.record_failure(&client, now).await;
        return Err(AppError::BadRequest {
            code: "MISSING_PASSWORD",
            message: "Password is required".to_string(),
        });
    };

    let session = match app_state.auth.login(&password).await {
        Ok(session) => session,
        Err(AuthError::InvalidPassword) => {
            app_state.login_limiter.record_failure(&client, now).await;
            warn!(client = %client, "Failed login attempt.");
            return Err(AuthError::InvalidPassword.into());
        }
        Err(e) => return Err(e.into()),
    };
    app_state.login_limiter.record_success(&client).await;
    info!(client = %client, "Admin logged in.");

    let auth_cookie = Cookie::build((SESSION_COOKIE, session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(app_state.auth.https_enabled())
        .build();

    Ok((
        jar.add(auth_cookie),
        Json(LoginResponse {
            success: true,
            expires_at: session.expires_at,
            csrf_token: session.csrf_token,
        }),
    ))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<ActionResponse>) {
    (
        jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/")),
        Json(ActionResponse::ok("Logged out")),
    )
}

async fn change_password(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let (Some(current), Some(new)) = (payload.current_password, payload.new_password) else {
        return Err(AppError::BadRequest {
            code: "MISSING_PASSWORD",
            message: "Current password and new password are required".to_string(),
        });
    };

    match app_state.auth.change_password(&current, &new).await {
        Ok(()) => Ok(Json(ActionResponse::ok("Password changed successfully"))),
        Err(AuthError::InvalidPassword) => Err(AppError::Unauthorized {
            code: "INVALID_PASSWORD",
            message: "Current password is incorrect".to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}
