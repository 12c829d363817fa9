pub mod handlers;
pub mod repository;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sandbox/info", get(handlers::sandbox_info))
        .route("/sandbox/list", get(handlers::sandbox_list))
        .route("/sandbox/{sandbox_id}", delete(handlers::terminate_sandbox))
        .route("/sandbox/{sandbox_id}/files", get(handlers::list_files))
        .route("/sandbox/{sandbox_id}/read", get(handlers::read_file))
        .route("/sandbox/{sandbox_id}/write", post(handlers::write_file))
        .route("/sandbox/{sandbox_id}/packages", post(handlers::install_packages))
        .route("/sandbox/{sandbox_id}/restart", post(handlers::restart_dev_server))
}
