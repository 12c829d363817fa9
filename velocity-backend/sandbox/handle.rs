use async_trait::async_trait;

use super::error::SandboxError;
use super::types::*;

/// Live connection to one remote sandbox.
///
/// Backends implement this trait; `DevSandbox` owns exactly one at a time.
/// Errors that mean "the sandbox was torn down" must surface either as
/// `SandboxError::SandboxGone` or with the gone signal in their message.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Working directory relative paths resolve against.
    fn root(&self) -> &str;

    /// Run a command. Output may come back inline or deferred.
    async fn exec(&self, req: ExecRequest) -> Result<RawExecOutput, SandboxError>;

    /// Bulk write. Paths are absolute inside the sandbox.
    async fn write_files(&self, files: Vec<PutFileRequest>) -> Result<(), SandboxError>;

    /// Externally reachable address for an exposed port.
    fn domain(&self, port: u16) -> Option<String>;

    async fn stop(&self) -> Result<(), SandboxError>;
}
