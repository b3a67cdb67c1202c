use axum::{
    Json, Router,
    extract::{Query, State},
    middleware as axum_middleware,
    routing::{get, post},
};
use chrono::Utc;
use std::io;
use std::sync::Arc;
use tracing::{error, info};

use crate::devices::{self, LogSource, tracker};
use crate::web::middleware::auth;
use crate::web::models::{
    DeviceConnectionsResponse, LogsQuery, LogsResponse, MarkQuery, MarkResponse,
};
use crate::web::{AppError, AppState};

pub const DEFAULT_LOG_LINES: usize = 100;
pub const MAX_LOG_LINES: usize = 1000;

pub fn device_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/device-connections", get(device_connections))
        .route("/logs", get(recent_logs));

    let protected = Router::new()
        .route("/logs/mark", post(mark_logs))
        .route_layer(axum_middleware::from_fn_with_state(app_state, auth::auth));

    public.merge(protected)
}

async fn device_connections(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<DeviceConnectionsResponse>, AppError> {
    let now = Utc::now().timestamp();
    let state = app_state.clone();
    let connections = tokio::task::spawn_blocking(move || state.devices.refresh(now))
        .await
        .map_err(|e| {
            error!(error = %e, "Device connection refresh task failed.");
            AppError::InternalServerError(format!("Device refresh failed: {e}"))
        })?;

    Ok(Json(DeviceConnectionsResponse {
        devices: devices::summarize(&connections),
    }))
}

async fn recent_logs(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, AppError> {
    let count = query.lines.unwrap_or(DEFAULT_LOG_LINES).clamp(1, MAX_LOG_LINES);
    let source = query.source;
    let path = app_state
        .devices
        .log_path(source)
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let state = app_state.clone();
    let result = tokio::task::spawn_blocking(move || state.devices.recent_lines(source, count))
        .await
        .map_err(|e| AppError::InternalServerError(format!("Log read failed: {e}")))?;

    match result {
        Ok(logs) => {
            let note = (logs.is_empty() && source == LogSource::Access).then(|| {
                "No device requests found in recent log entries (UI/API requests filtered out)"
                    .to_string()
            });
            Ok(Json(LogsResponse {
                logs,
                source: path,
                note,
            }))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Json(LogsResponse {
            logs: Vec::new(),
            note: Some(format!("Nginx {} log not found at {path}", source.label())),
            source: path,
        })),
        Err(e) => Err(AppError::InternalServerError(format!(
            "Failed to read {} log: {e}",
            source.label()
        ))),
    }
}

async fn mark_logs(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<MarkQuery>,
) -> Result<Json<MarkResponse>, AppError> {
    let now = Utc::now();
    let state = app_state.clone();
    let results = tokio::task::spawn_blocking(move || {
        query
            .source
            .sources()
            .iter()
            .map(|&source| (source, state.devices.mark_log(source, now)))
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Log marker task failed: {e}")))?;

    let mut failures = Vec::new();
    let mut all_missing = true;
    for (source, result) in results {
        match result {
            Ok(_) => info!(log = source.label(), "Inserted log marker."),
            Err(e) => {
                all_missing &= e.kind() == io::ErrorKind::NotFound;
                failures.push(format!("Failed to write MARK to {} log: {e}", source.label()));
            }
        }
    }

    if !failures.is_empty() {
        let message = failures.join("; ");
        error!(error = %message, "Log marker not written.");
        return Err(if all_missing {
            AppError::NotFound(message)
        } else {
            AppError::InternalServerError(message)
        });
    }

    let marker = tracker::mark_line(now);
    Ok(Json(MarkResponse {
        success: true,
        message: format!("MARK inserted: {marker}"),
        marker,
    }))
}
