pub mod middleware;
pub mod projects;
mod routes;
pub mod sandbox;

use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;

use crate::credits::CreditLedger;
use crate::generations::orchestrator::GenerationOrchestrator;
use crate::generations::repository::GenerationRepository;
use crate::sandbox::{SandboxFactory, SandboxManager};

#[derive(Clone)]
pub struct AppState {
    /// Live providers keyed by sandbox id. Emptied by every restart.
    pub sandbox_manager: Arc<SandboxManager>,
    /// Builds providers for the configured backend.
    pub sandbox_factory: SandboxFactory,
    /// Durable generation records; the recovery path reads sandbox ids from here.
    pub generations: Arc<dyn GenerationRepository>,
    pub credits: Arc<dyn CreditLedger>,
    pub orchestrator: GenerationOrchestrator,
    /// Bearer token -> user id. Empty disables authentication.
    pub auth_tokens: Arc<HashMap<String, String>>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
