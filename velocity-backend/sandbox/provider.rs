use std::collections::BTreeSet;

use async_trait::async_trait;

use super::error::SandboxError;
use super::types::{CommandResult, SandboxBackendKind, SandboxInfo, SandboxState};

/// One sandbox's lifecycle.
///
/// A provider owns at most one live handle. The `SandboxManager` indexes
/// providers by sandbox id; the factory builds fresh ones.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    fn kind(&self) -> SandboxBackendKind;

    /// Create a new remote sandbox, stopping any previous one first.
    async fn create_sandbox(&self) -> Result<SandboxInfo, SandboxError>;

    /// Point this provider at a sandbox it did not create. Optimistic: no
    /// liveness probe is made.
    async fn reconnect(
        &self,
        sandbox_id: &str,
        known_url: Option<&str>,
    ) -> Result<SandboxInfo, SandboxError>;

    /// Run a whitespace-split command line in the sandbox root.
    async fn run_command(&self, command_line: &str) -> Result<CommandResult, SandboxError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    /// Files under `directory` (default: the sandbox root), relative to it.
    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, SandboxError>;

    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult, SandboxError>;

    /// Write the toolchain, install dependencies, start the dev server.
    async fn setup_vite_app(&self) -> Result<(), SandboxError>;

    async fn restart_dev_server(&self) -> Result<(), SandboxError>;

    fn url(&self) -> Option<String>;

    fn info(&self) -> Option<SandboxInfo>;

    fn state(&self) -> SandboxState;

    /// Paths this provider wrote. Not authoritative for remote contents.
    fn known_files(&self) -> BTreeSet<String>;

    /// Stop the remote sandbox best-effort and drop the handle.
    async fn terminate(&self);

    /// Whether a handle is held. Local knowledge only.
    fn is_alive(&self) -> bool;
}
