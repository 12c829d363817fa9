use axum::extract::{Path, State};
use axum::{Extension, Json};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::AuthUser;
use crate::api::AppState;
use crate::credits::CreditError;
use crate::generations::GenerationError;

type ApiError = (StatusCode, Json<Value>);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub ai_model: String,
}

fn generation_error(err: GenerationError) -> ApiError {
    match err {
        GenerationError::MissingInput | GenerationError::InvalidModel(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        ),
        GenerationError::Credits(CreditError::Insufficient { balance, required }) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "Insufficient credits. Please top up your wallet.",
                "balance": balance,
                "required": required,
            })),
        ),
        other => {
            tracing::error!(error = %other, "generation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
        }
    }
}

/// POST /api/projects/generate: charge credits and start a run.
pub(crate) async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state
        .orchestrator
        .submit(&user.id, &body.prompt, &body.ai_model)
        .await
        .map_err(generation_error)?;

    tracing::info!(generation_id = %record.id, user_id = %user.id, "generation queued");
    Ok((StatusCode::CREATED, Json(json!({ "generation": record }))))
}

/// GET /api/generations/{generation_id}
pub(crate) async fn get_generation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(generation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.generations.get_generation(&generation_id).await {
        Some(record) if record.user_id == user.id => Ok(Json(json!({ "generation": record }))),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Generation not found" })),
        )),
    }
}

/// GET /api/credits
pub(crate) async fn credit_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Value> {
    let balance = state.credits.balance(&user.id).await;
    Json(json!({ "balance": balance }))
}
