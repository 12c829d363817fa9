//! Reattaching to sandboxes this process has lost track of.
//!
//! The manager is emptied by every restart while remote sandboxes keep
//! running. When a request names an id the manager cannot resolve, the
//! generation record that created it supplies enough to reconnect.

use std::future::Future;
use std::sync::Arc;

use super::error::SandboxError;
use super::manager::SandboxManager;
use super::provider::SandboxProvider;
use super::SandboxFactory;
use crate::generations::repository::GenerationRepository;

#[derive(thiserror::Error, Debug)]
pub enum RecoveryError {
    /// Neither registered nor referenced by any generation record.
    #[error("sandbox not found: {0}")]
    UnknownSandbox(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl RecoveryError {
    pub fn is_gone(&self) -> bool {
        matches!(self, RecoveryError::Sandbox(e) if e.is_gone())
    }
}

pub struct Recovery<'a> {
    pub manager: &'a SandboxManager,
    pub factory: &'a SandboxFactory,
    pub generations: &'a dyn GenerationRepository,
}

impl Recovery<'_> {
    /// The registered provider for `sandbox_id`, reconnecting one from the
    /// generation record when the manager has none or holds a dead one.
    pub async fn resolve(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxProvider>, RecoveryError> {
        if let Some(provider) = self.manager.get(sandbox_id).await {
            if provider.is_alive() {
                return Ok(provider);
            }
            self.manager.remove(sandbox_id).await;
        }

        tracing::info!(sandbox_id = %sandbox_id, "provider not registered, attempting reconnect");

        let record = self
            .generations
            .find_by_sandbox_id(sandbox_id)
            .await
            .ok_or_else(|| RecoveryError::UnknownSandbox(sandbox_id.to_string()))?;

        let provider = self.factory.build_provider();
        provider
            .reconnect(sandbox_id, record.preview_url.as_deref())
            .await?;

        let winner = self
            .manager
            .register_if_absent(sandbox_id, provider.clone())
            .await;
        if !Arc::ptr_eq(&winner, &provider) {
            tracing::debug!(sandbox_id = %sandbox_id, "concurrent recovery won, discarding duplicate provider");
        } else {
            tracing::info!(sandbox_id = %sandbox_id, "reconnected to sandbox");
        }
        Ok(winner)
    }

    /// Run `op` against the sandbox, recovering it first if needed. A gone
    /// sandbox is dropped from the manager before the error is returned.
    pub async fn run<T, F, Fut>(&self, sandbox_id: &str, op: F) -> Result<T, RecoveryError>
    where
        F: FnOnce(Arc<dyn SandboxProvider>) -> Fut,
        Fut: Future<Output = Result<T, SandboxError>>,
    {
        let provider = self.resolve(sandbox_id).await?;
        match op(provider).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_gone() => {
                self.manager.remove(sandbox_id).await;
                tracing::warn!(sandbox_id = %sandbox_id, "sandbox has stopped, removed from manager");
                Err(RecoveryError::Sandbox(SandboxError::SandboxGone(sandbox_id.to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }
}
