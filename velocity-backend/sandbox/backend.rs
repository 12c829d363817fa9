use std::sync::Arc;

use async_trait::async_trait;

use super::error::SandboxError;
use super::handle::SandboxHandle;
use super::types::{SandboxBackendInfo, SandboxSpec};

/// Creates handles against one backing infrastructure.
///
/// One backend instance is shared by every provider the factory builds.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn info(&self) -> SandboxBackendInfo;

    /// Create a new sandbox from the given spec.
    async fn provision(&self, spec: &SandboxSpec) -> Result<Arc<dyn SandboxHandle>, SandboxError>;

    /// Build a handle for a sandbox this process did not create.
    ///
    /// Does not probe liveness; a dead sandbox shows up on the next call.
    async fn attach(
        &self,
        id: &str,
        spec: &SandboxSpec,
    ) -> Result<Arc<dyn SandboxHandle>, SandboxError>;
}
