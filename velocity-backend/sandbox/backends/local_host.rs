use std::sync::Arc;

use async_trait::async_trait;

use crate::sandbox::backend::SandboxBackend;
use crate::sandbox::error::SandboxError;
use crate::sandbox::handle::SandboxHandle;
use crate::sandbox::local_host::fs_jail::FsJail;
use crate::sandbox::local_host::process_supervisor::ProcessSupervisor;
use crate::sandbox::types::*;

/// Runs sandboxes as plain directories on this machine.
///
/// Each sandbox gets its own workspace directory under `config.root_dir`.
/// Processes run as the current user with a filtered env. Not a security
/// boundary; meant for local development without cloud credentials.
pub struct LocalHostBackend {
    config: LocalHostConfig,
}

impl LocalHostBackend {
    pub fn new(config: LocalHostConfig) -> Result<Self, SandboxError> {
        std::fs::create_dir_all(&config.root_dir).map_err(|e| {
            SandboxError::Provision(format!(
                "failed to create sandboxes root {}: {e}",
                config.root_dir.display()
            ))
        })?;
        Ok(Self { config })
    }

    fn supervisor(&self) -> Arc<ProcessSupervisor> {
        Arc::new(ProcessSupervisor::new(
            self.config.inherit_env_allowlist.clone(),
            self.config.max_output_bytes,
        ))
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/') && !id.contains("..")
}

#[async_trait]
impl SandboxBackend for LocalHostBackend {
    fn info(&self) -> SandboxBackendInfo {
        SandboxBackendInfo {
            kind: SandboxBackendKind::LocalHost,
            supports_public_http: false,
            supports_bulk_write: true,
            deferred_output: false,
        }
    }

    async fn provision(&self, _spec: &SandboxSpec) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let sandbox_id = format!("local-{}", uuid::Uuid::new_v4().simple());
        let workspace_dir = self.config.root_dir.join(&sandbox_id);

        tracing::info!(
            sandbox_id = %sandbox_id,
            workspace_dir = %workspace_dir.display(),
            "provisioning local sandbox"
        );

        let jail = FsJail::create(workspace_dir)?;
        Ok(Arc::new(LocalHandle::new(sandbox_id, jail, self.supervisor())))
    }

    async fn attach(
        &self,
        id: &str,
        _spec: &SandboxSpec,
    ) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        if !valid_id(id) {
            return Err(SandboxError::NotFound(format!("invalid sandbox id: {id}")));
        }
        let jail = FsJail::attach(self.config.root_dir.join(id));
        Ok(Arc::new(LocalHandle::new(id.to_string(), jail, self.supervisor())))
    }
}

struct LocalHandle {
    id: String,
    root: String,
    jail: FsJail,
    supervisor: Arc<ProcessSupervisor>,
}

impl LocalHandle {
    fn new(id: String, jail: FsJail, supervisor: Arc<ProcessSupervisor>) -> Self {
        let root = jail.root().to_string_lossy().into_owned();
        Self {
            id,
            root,
            jail,
            supervisor,
        }
    }

    fn ensure_present(&self) -> Result<(), SandboxError> {
        if self.jail.exists() {
            Ok(())
        } else {
            Err(SandboxError::SandboxGone(self.id.clone()))
        }
    }
}

#[async_trait]
impl SandboxHandle for LocalHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn root(&self) -> &str {
        &self.root
    }

    async fn exec(&self, req: ExecRequest) -> Result<RawExecOutput, SandboxError> {
        self.ensure_present()?;
        let out = self.supervisor.exec(&req, self.jail.root()).await?;
        if out.timed_out {
            tracing::warn!(sandbox_id = %self.id, command = %req.display(), "local command timed out");
        }
        Ok(RawExecOutput {
            exit_code: out.exit_code,
            stdout: OutputField::Inline(out.stdout),
            stderr: OutputField::Inline(out.stderr),
        })
    }

    async fn write_files(&self, files: Vec<PutFileRequest>) -> Result<(), SandboxError> {
        self.ensure_present()?;
        for file in &files {
            self.jail.put_file(file)?;
        }
        Ok(())
    }

    fn domain(&self, port: u16) -> Option<String> {
        Some(format!("http://localhost:{port}"))
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        tracing::info!(sandbox_id = %self.id, "removing local sandbox workspace");
        self.jail.destroy()
    }
}
