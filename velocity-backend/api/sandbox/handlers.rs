use axum::extract::{Path, Query, State};
use axum::Json;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::sandbox::SandboxError;

use super::repository::{bad_request, recovery, recovery_error, ApiError};

/// GET /api/sandbox/info: configured backend and capabilities.
pub(crate) async fn sandbox_info(State(state): State<AppState>) -> Json<Value> {
    let info = state.sandbox_factory.backend_info();
    Json(json!({
        "provider": info.kind.as_str(),
        "supports_public_http": info.supports_public_http,
        "supports_bulk_write": info.supports_bulk_write,
        "deferred_output": info.deferred_output,
    }))
}

/// GET /api/sandbox/list: sandboxes registered in this process.
pub(crate) async fn sandbox_list(State(state): State<AppState>) -> Json<Value> {
    let items: Vec<Value> = state
        .sandbox_manager
        .entries()
        .await
        .into_iter()
        .map(|(id, provider)| {
            let info = provider.info();
            json!({
                "id": id,
                "url": provider.url(),
                "state": provider.state(),
                "created_at": info.map(|i| i.created_at),
            })
        })
        .collect();
    Json(json!({ "sandboxes": items }))
}

/// GET /api/sandbox/{sandbox_id}/files
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn list_files(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let files = recovery(&state)
        .run(&sandbox_id, |p| async move { p.list_files(None).await })
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    tracing::info!(count = files.len(), "listed sandbox files");
    Ok(Json(json!({ "files": files })))
}

#[derive(Deserialize)]
pub(crate) struct ReadQuery {
    pub path: Option<String>,
}

/// GET /api/sandbox/{sandbox_id}/read?path=...
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn read_file(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Value>, ApiError> {
    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| bad_request("File path is required"))?;

    let content = recovery(&state)
        .run(&sandbox_id, |p| async move { p.read_file(&path).await })
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    Ok(Json(json!({ "content": content })))
}

#[derive(Deserialize)]
pub(crate) struct WriteBody {
    pub path: String,
    pub content: String,
}

/// POST /api/sandbox/{sandbox_id}/write: redeploy one file into the preview.
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn write_file(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    Json(body): Json<WriteBody>,
) -> Result<Json<Value>, ApiError> {
    if body.path.trim().is_empty() {
        return Err(bad_request("File path is required"));
    }

    let path = body.path.clone();
    recovery(&state)
        .run(&sandbox_id, |p| async move {
            p.write_file(&body.path, &body.content).await
        })
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    tracing::info!(path = %path, "file written");
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub(crate) struct PackagesBody {
    #[serde(default)]
    pub packages: Vec<String>,
}

/// POST /api/sandbox/{sandbox_id}/packages
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn install_packages(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
    Json(body): Json<PackagesBody>,
) -> Result<Json<Value>, ApiError> {
    let packages: Vec<String> = body
        .packages
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if packages.is_empty() {
        return Err(bad_request("At least one package is required"));
    }

    let result = recovery(&state)
        .run(&sandbox_id, |p| async move { p.install_packages(&packages).await })
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    Ok(Json(json!(result)))
}

/// POST /api/sandbox/{sandbox_id}/restart
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn restart_dev_server(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let url = recovery(&state)
        .run(&sandbox_id, |p| async move {
            p.restart_dev_server().await?;
            Ok::<_, SandboxError>(p.url())
        })
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    Ok(Json(json!({ "ok": true, "url": url })))
}

/// DELETE /api/sandbox/{sandbox_id}
#[tracing::instrument(skip_all, fields(sandbox_id = %sandbox_id))]
pub(crate) async fn terminate_sandbox(
    State(state): State<AppState>,
    Path(sandbox_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let provider = recovery(&state)
        .resolve(&sandbox_id)
        .await
        .map_err(|e| recovery_error(&sandbox_id, e))?;

    state.sandbox_manager.remove(&sandbox_id).await;
    provider.terminate().await;

    Ok((StatusCode::OK, Json(json!({ "ok": true }))))
}
