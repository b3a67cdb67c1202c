use axum::{
    Json, Router,
    extract::State,
    http::Method,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::devices::DeviceTracker;
use crate::scripts::ScriptRegistry;
use crate::scripts::naming::POINTER_NAME;
use crate::server::config::ServerConfig;
use crate::services::{AuthService, LoginRateLimiter};
use crate::storage::DirLock;
use crate::web::models::StatusResponse;
use crate::web::routes::script_routes::with_registry;
use crate::web::routes::{auth_routes, device_routes, script_routes};

pub use crate::web::error::AppError;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub struct AppState {
    pub registry: ScriptRegistry,
    pub devices: DeviceTracker,
    pub auth: AuthService,
    pub login_limiter: LoginRateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, auth: AuthService) -> Self {
        Self::with_dir_lock(config, auth, DirLock::new())
    }

    /// Registry and tracker rewrite files in the same directory, so they
    /// share `lock`.
    pub fn with_dir_lock(config: Arc<ServerConfig>, auth: AuthService, lock: DirLock) -> Self {
        Self {
            registry: ScriptRegistry::new(config.config_dir.clone(), lock.clone()),
            devices: DeviceTracker::new(&config.config_dir, config.access_log.clone(), lock)
                .with_error_log(config.error_log.clone()),
            auth,
            login_limiter: LoginRateLimiter::new(),
            config,
        }
    }
}

async fn health_check_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    let config_dir = &app_state.config.config_dir;
    let pointer = config_dir.join(POINTER_NAME);
    let active_script = with_registry(&app_state, |registry| Ok(registry.active_script())).await?;
    Ok(Json(StatusResponse {
        config_dir_exists: config_dir.is_dir(),
        bootstrap_script_exists: pointer.exists(),
        active_script,
        access_log_exists: app_state.devices.access_log().exists(),
        auth_configured: app_state.auth.is_configured().await,
    }))
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/api/status", get(status_handler))
        .nest("/api/auth", auth_routes::auth_routes(app_state.clone()))
        .nest(
            "/api",
            script_routes::script_routes(app_state.clone())
                .merge(device_routes::device_routes(app_state.clone())),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
