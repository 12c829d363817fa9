pub mod handlers;

use axum::routing::{get, post};
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/generate", post(handlers::generate))
        .route("/generations/{generation_id}", get(handlers::get_generation))
        .route("/credits", get(handlers::credit_balance))
}
