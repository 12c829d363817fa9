use axum::Json;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::sandbox::recovery::{Recovery, RecoveryError};
use crate::sandbox::SandboxError;

pub type ApiError = (StatusCode, Json<Value>);

/// Recovery path bound to the shared state.
pub fn recovery(state: &AppState) -> Recovery<'_> {
    Recovery {
        manager: &state.sandbox_manager,
        factory: &state.sandbox_factory,
        generations: state.generations.as_ref(),
    }
}

/// Map a recovery failure to the HTTP shape the preview UI understands.
/// A gone sandbox gets 410 with `stopped: true` so the client stops polling.
pub fn recovery_error(sandbox_id: &str, err: RecoveryError) -> ApiError {
    if err.is_gone() {
        return (
            StatusCode::GONE,
            Json(json!({
                "error": "Sandbox has stopped",
                "message": "This sandbox is no longer active. The sandbox may have timed out.",
                "stopped": true,
            })),
        );
    }

    match err {
        RecoveryError::UnknownSandbox(_) | RecoveryError::Sandbox(SandboxError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Sandbox not found" })),
        ),
        RecoveryError::Sandbox(SandboxError::NotConfigured(msg)) => {
            tracing::error!(sandbox_id = %sandbox_id, error = %msg, "sandbox backend not configured");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": format!("Sandbox backend not configured: {msg}") })),
            )
        }
        other => {
            tracing::error!(sandbox_id = %sandbox_id, error = %other, "sandbox operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
        }
    }
}

pub fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}
