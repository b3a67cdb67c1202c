use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{HeaderMap, Method, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::services::auth_service::{SESSION_COOKIE, SessionClaims};
use crate::services::AuthService;
use crate::web::{AppState, error::AppError};

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Session token from the `Authorization: Bearer` header, falling back to the
/// session cookie.
pub fn session_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
}

pub fn current_session(
    auth: &AuthService,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Option<SessionClaims> {
    let token = session_token(headers, jar)?;
    auth.validate_session(&token).ok()
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn csrf_matches(presented: &str, expected: &str) -> bool {
    !presented.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

/// Requires a valid session, and on state-changing methods a matching
/// `X-CSRF-Token` header.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = current_session(&state.auth, req.headers(), &jar)
        .ok_or_else(AppError::auth_required)?;

    if !is_safe_method(req.method()) {
        let presented = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !csrf_matches(presented, &claims.csrf) {
            warn!(method = %req.method(), path = %req.uri().path(), "Rejected request with bad CSRF token.");
            return Err(AppError::Forbidden);
        }
    }

    Ok(next.run(req).await)
}
