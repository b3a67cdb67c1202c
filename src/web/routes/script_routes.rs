use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::scripts::{
    BackupInfo, RegistryError, RestoreOutcome, ScriptContent, ScriptListing, ScriptMetadata,
    ScriptRegistry,
};
use crate::web::middleware::auth;
use crate::web::models::{ActionResponse, MetadataRequest, RenameRequest, RestoreRequest};
use crate::web::{AppError, AppState};

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::NotFound(_) => AppError::NotFound(message),
            RegistryError::InvalidName(_) => AppError::InvalidName(message),
            RegistryError::Conflict(_) => AppError::Conflict(message),
            RegistryError::ActiveScriptLocked(_) => AppError::ActiveScriptLocked(message),
            RegistryError::SymlinkTargetMissing(_) => AppError::SymlinkTargetMissing(message),
            RegistryError::Io(_) => AppError::InternalServerError(message),
        }
    }
}

#[derive(Serialize)]
struct ActivateResponse {
    success: bool,
    message: String,
    active: String,
}

#[derive(Serialize)]
struct RenameResponse {
    success: bool,
    message: String,
    old_name: String,
    new_name: String,
}

#[derive(Serialize)]
struct BackupListing {
    backups: Vec<BackupInfo>,
}

#[derive(Serialize)]
struct RestoreResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    outcome: RestoreOutcome,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    filename: String,
}

#[derive(Serialize)]
struct MetadataResponse {
    success: bool,
    name: String,
    metadata: ScriptMetadata,
}

/// Runs a registry operation on the blocking pool. Registry calls wait on the
/// directory lock and touch the filesystem, so they stay off the runtime.
pub(crate) async fn with_registry<T, F>(app_state: &AppState, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&ScriptRegistry) -> Result<T, RegistryError> + Send + 'static,
{
    let registry = app_state.registry.clone();
    tokio::task::spawn_blocking(move || op(&registry))
        .await
        .map_err(|e| {
            error!(error = %e, "Script registry task failed.");
            AppError::InternalServerError(format!("Registry task failed: {e}"))
        })?
        .map_err(AppError::from)
}

pub fn script_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/bootstrap-scripts", get(list_scripts))
        .route("/bootstrap-scripts/backups", get(list_backups))
        .route("/bootstrap-script/{name}", get(get_script));

    let protected = Router::new()
        .route("/bootstrap-script/{name}", delete(delete_script))
        .route("/bootstrap-script/{name}/set-active", post(set_active))
        .route("/bootstrap-script/{name}/rename", post(rename_script))
        .route("/bootstrap-script/{name}/metadata", put(update_metadata))
        .route("/bootstrap-script/backup/{name}/restore", post(restore_backup))
        .route("/bootstrap-script/upload", post(upload_script))
        .route_layer(axum_middleware::from_fn_with_state(app_state, auth::auth));

    public.merge(protected)
}

async fn list_scripts(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ScriptListing>, AppError> {
    Ok(Json(with_registry(&app_state, |registry| registry.list()).await?))
}

async fn get_script(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ScriptContent>, AppError> {
    Ok(Json(
        with_registry(&app_state, move |registry| registry.get(&name)).await?,
    ))
}

async fn set_active(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ActivateResponse>, AppError> {
    let target = name.clone();
    with_registry(&app_state, move |registry| registry.activate(&target)).await?;
    Ok(Json(ActivateResponse {
        success: true,
        message: format!("{name} is now the active bootstrap script"),
        active: name,
    }))
}

async fn rename_script(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    let requested = payload
        .new_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest {
            code: "MISSING_NAME",
            message: "New name is required".to_string(),
        })?;

    let old = name.clone();
    let new_name =
        with_registry(&app_state, move |registry| registry.rename(&old, &requested)).await?;
    Ok(Json(RenameResponse {
        success: true,
        message: format!("Script renamed from {name} to {new_name}"),
        old_name: name,
        new_name,
    }))
}

async fn delete_script(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let target = name.clone();
    with_registry(&app_state, move |registry| registry.delete(&target)).await?;
    Ok(Json(ActionResponse::ok(format!(
        "Script {name} deleted successfully"
    ))))
}

async fn list_backups(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<BackupListing>, AppError> {
    let backups =
        with_registry(&app_state, |registry| Ok(registry.list_backups())).await?;
    Ok(Json(BackupListing { backups }))
}

async fn restore_backup(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<RestoreResponse>, AppError> {
    // The body is optional; without one the backup is restored as a new file.
    let request: RestoreRequest = if body.is_empty() {
        RestoreRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest {
            code: "INVALID_REQUEST",
            message: format!("Invalid restore request: {e}"),
        })?
    };
    let backup = name.clone();
    let outcome = with_registry(&app_state, move |registry| {
        registry.restore_backup(&backup, request.restore_as, Utc::now())
    })
    .await?;

    let message = match &outcome {
        RestoreOutcome::Active => format!("Backup {name} restored as bootstrap.py (active)"),
        RestoreOutcome::New { new_filename } => format!("Backup {name} restored as {new_filename}"),
    };
    Ok(Json(RestoreResponse {
        success: true,
        message,
        outcome,
    }))
}

async fn upload_script(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let bad_request = |code: &'static str, message: String| AppError::BadRequest { code, message };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request("INVALID_UPLOAD", e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(bad_request("NO_FILE", "No file selected".to_string()));
        }
        if !original.ends_with(".py") {
            return Err(bad_request(
                "INVALID_FILE_TYPE",
                "File must be a Python script (.py)".to_string(),
            ));
        }

        let contents = field
            .bytes()
            .await
            .map_err(|e| bad_request("INVALID_UPLOAD", e.to_string()))?;
        let filename = with_registry(&app_state, move |registry| {
            registry.upload(&original, &contents)
        })
        .await?;
        return Ok(Json(UploadResponse {
            success: true,
            message: format!("Script {filename} uploaded successfully"),
            filename,
        }));
    }

    Err(bad_request("NO_FILE", "No file provided".to_string()))
}

async fn update_metadata(
    State(app_state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<MetadataRequest>,
) -> Result<Json<MetadataResponse>, AppError> {
    let target = name.clone();
    let metadata = with_registry(&app_state, move |registry| {
        registry.set_metadata(&target, payload.serve_as_filename)
    })
    .await?;
    Ok(Json(MetadataResponse {
        success: true,
        name,
        metadata,
    }))
}
