//! `DevSandbox`: the provider implementation, generic over the backend.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::backend::SandboxBackend;
use super::bootstrap;
use super::error::{is_gone_signal, SandboxError};
use super::executor;
use super::handle::SandboxHandle;
use super::listing;
use super::provider::SandboxProvider;
use super::transport;
use super::types::*;

#[derive(Debug, Clone)]
pub struct DevSandboxOptions {
    pub spec: SandboxSpec,
    /// Appended to every `npm install`.
    pub npm_flags: Vec<String>,
    pub auto_restart_dev_server: bool,
    /// Per-command limit. `None` leaves it to the remote infrastructure.
    pub command_timeout: Option<Duration>,
    /// Wait after starting the dev server before its URL is usable.
    pub dev_server_settle: Duration,
    /// Pause between killing and restarting the dev server.
    pub restart_pause: Duration,
}

impl Default for DevSandboxOptions {
    fn default() -> Self {
        Self {
            spec: SandboxSpec::default(),
            npm_flags: Vec::new(),
            auto_restart_dev_server: false,
            command_timeout: None,
            dev_server_settle: Duration::from_secs(7),
            restart_pause: Duration::from_secs(2),
        }
    }
}

struct Session {
    handle: Option<Arc<dyn SandboxHandle>>,
    info: Option<SandboxInfo>,
    known_files: BTreeSet<String>,
    state: SandboxState,
}

pub struct DevSandbox {
    backend: Arc<dyn SandboxBackend>,
    options: DevSandboxOptions,
    session: Mutex<Session>,
}

/// Puts a transient state back to `Ready` when the operation ends, unless
/// something else (termination, the gone signal) moved it meanwhile.
struct TransientState<'a> {
    sandbox: &'a DevSandbox,
    state: SandboxState,
}

impl Drop for TransientState<'_> {
    fn drop(&mut self) {
        let mut session = self.sandbox.session.lock();
        if session.state == self.state {
            session.state = SandboxState::Ready;
        }
    }
}

impl DevSandbox {
    pub fn new(backend: Arc<dyn SandboxBackend>, options: DevSandboxOptions) -> Self {
        Self {
            backend,
            options,
            session: Mutex::new(Session {
                handle: None,
                info: None,
                known_files: BTreeSet::new(),
                state: SandboxState::Uninitialized,
            }),
        }
    }

    fn dev_port(&self) -> u16 {
        self.options.spec.ports.first().copied().unwrap_or(DEV_SERVER_PORT)
    }

    fn handle(&self) -> Option<Arc<dyn SandboxHandle>> {
        self.session.lock().handle.clone()
    }

    fn require_handle(&self) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        self.handle().ok_or(SandboxError::NoActiveSandbox)
    }

    fn enter(&self, state: SandboxState) -> TransientState<'_> {
        let mut session = self.session.lock();
        if session.state.is_live() {
            session.state = state;
        }
        TransientState { sandbox: self, state }
    }

    /// The remote side tore the sandbox down: forget the handle so nothing
    /// calls it again until create/reconnect.
    fn mark_gone(&self, sandbox_id: &str) {
        let mut session = self.session.lock();
        session.handle = None;
        session.info = None;
        session.state = SandboxState::Unreachable;
        tracing::warn!(sandbox_id = %sandbox_id, "sandbox has stopped, marking unreachable");
    }

    fn observe<T>(&self, sandbox_id: &str, res: Result<T, SandboxError>) -> Result<T, SandboxError> {
        match res {
            Err(e) if e.is_gone() => {
                self.mark_gone(sandbox_id);
                Err(SandboxError::SandboxGone(sandbox_id.to_string()))
            }
            other => other,
        }
    }

    fn install_request(&self, root: &str, packages: &[String]) -> ExecRequest {
        let args = std::iter::once("install".to_string())
            .chain(self.options.npm_flags.iter().cloned())
            .chain(packages.iter().cloned());
        ExecRequest::new("npm", args)
            .with_cwd(root)
            .with_timeout(self.options.command_timeout)
    }

    /// Kill any dev server, optionally pause, start a detached one, settle.
    async fn cycle_dev_server(
        &self,
        handle: &Arc<dyn SandboxHandle>,
        pause: Option<Duration>,
    ) -> Result<(), SandboxError> {
        let kill = ExecRequest::shell(bootstrap::kill_dev_server_script())
            .with_cwd("/")
            .with_timeout(self.options.command_timeout);
        executor::run_command(Some(handle.clone()), kill).await?;

        if let Some(pause) = pause {
            tokio::time::sleep(pause).await;
        }

        let start = ExecRequest::shell(bootstrap::start_dev_server_script())
            .with_cwd(handle.root())
            .with_timeout(self.options.command_timeout);
        let res = executor::run_command(Some(handle.clone()), start).await?;
        if !res.success {
            tracing::warn!(
                sandbox_id = %handle.id(),
                stderr = %res.stderr,
                "dev server start command failed"
            );
        }

        tokio::time::sleep(self.options.dev_server_settle).await;
        Ok(())
    }
}

#[async_trait]
impl SandboxProvider for DevSandbox {
    fn kind(&self) -> SandboxBackendKind {
        self.backend.info().kind
    }

    async fn create_sandbox(&self) -> Result<SandboxInfo, SandboxError> {
        let previous = {
            let mut session = self.session.lock();
            session.state = SandboxState::Creating;
            session.known_files.clear();
            session.info = None;
            session.handle.take()
        };

        if let Some(prev) = previous {
            if let Err(e) = prev.stop().await {
                tracing::warn!(sandbox_id = %prev.id(), error = %e, "failed to stop previous sandbox");
            }
        }

        let handle = match self.backend.provision(&self.options.spec).await {
            Ok(h) => h,
            Err(e) => {
                self.session.lock().state = SandboxState::Uninitialized;
                tracing::error!(error = %e, "sandbox creation failed");
                return Err(e);
            }
        };

        let info = SandboxInfo {
            sandbox_id: handle.id().to_string(),
            url: handle.domain(self.dev_port()),
            provider: self.backend.info().kind,
            created_at: Utc::now(),
        };

        {
            let mut session = self.session.lock();
            session.handle = Some(handle);
            session.info = Some(info.clone());
            session.state = SandboxState::Ready;
        }

        tracing::info!(
            sandbox_id = %info.sandbox_id,
            url = ?info.url,
            provider = info.provider.as_str(),
            "sandbox created"
        );
        Ok(info)
    }

    async fn reconnect(
        &self,
        sandbox_id: &str,
        known_url: Option<&str>,
    ) -> Result<SandboxInfo, SandboxError> {
        tracing::info!(sandbox_id = %sandbox_id, "reconnecting to sandbox");

        let handle = match self.backend.attach(sandbox_id, &self.options.spec).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(sandbox_id = %sandbox_id, error = %e, "reconnect failed");
                return Err(e);
            }
        };

        let url = known_url
            .filter(|u| !u.is_empty())
            .map(String::from)
            .or_else(|| handle.domain(self.dev_port()));

        let info = SandboxInfo {
            sandbox_id: sandbox_id.to_string(),
            url,
            provider: self.backend.info().kind,
            created_at: Utc::now(),
        };

        let mut session = self.session.lock();
        session.handle = Some(handle);
        session.info = Some(info.clone());
        session.known_files.clear();
        session.state = SandboxState::Ready;
        Ok(info)
    }

    async fn run_command(&self, command_line: &str) -> Result<CommandResult, SandboxError> {
        let handle = self.require_handle()?;
        let Some(req) = ExecRequest::from_command_line(command_line) else {
            return Ok(CommandResult::transport_failure("empty command"));
        };
        let req = req
            .with_cwd(handle.root())
            .with_timeout(self.options.command_timeout);
        executor::run_command(Some(handle), req).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let handle = self.require_handle()?;
        let _writing = self.enter(SandboxState::Writing);

        let res = transport::write_file(
            Some(handle.clone()),
            path,
            content,
            self.options.command_timeout,
        )
        .await;
        self.observe(handle.id(), res)?;

        self.session.lock().known_files.insert(path.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let handle = self.require_handle()?;
        let res = transport::read_file(Some(handle.clone()), path, self.options.command_timeout).await;
        self.observe(handle.id(), res)
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, SandboxError> {
        let handle = self.require_handle()?;
        let dir = directory
            .map(|d| transport::resolve_path(handle.root(), d))
            .unwrap_or_else(|| handle.root().to_string());

        let req = listing::listing_request(&dir);
        let exec = match self.options.command_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.exec(req))
                .await
                .unwrap_or(Err(SandboxError::Timeout)),
            None => handle.exec(req).await,
        };

        let raw = match self.observe(handle.id(), exec) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(sandbox_id = %handle.id(), dir = %dir, error = %e, "listing files failed");
                return Err(e);
            }
        };

        let res = executor::normalize(raw).await;
        if is_gone_signal(&res.stderr) {
            self.mark_gone(handle.id());
            return Err(SandboxError::SandboxGone(handle.id().to_string()));
        }
        if !res.success || res.stdout.is_empty() {
            tracing::debug!(
                sandbox_id = %handle.id(),
                exit_code = res.exit_code,
                stderr = %res.stderr,
                "listing produced no output"
            );
            return Ok(Vec::new());
        }

        let files = listing::parse_ls_recursive(&res.stdout, &dir);
        tracing::debug!(sandbox_id = %handle.id(), count = files.len(), "listed files");
        Ok(files)
    }

    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult, SandboxError> {
        let handle = self.require_handle()?;
        let _installing = self.enter(SandboxState::Installing);

        tracing::info!(sandbox_id = %handle.id(), packages = ?packages, "installing packages");
        let res = executor::run_command(
            Some(handle.clone()),
            self.install_request(handle.root(), packages),
        )
        .await?;

        if !res.success {
            tracing::warn!(sandbox_id = %handle.id(), stderr = %res.stderr, "npm install failed");
        } else if self.options.auto_restart_dev_server {
            drop(_installing);
            if let Err(e) = self.restart_dev_server().await {
                tracing::warn!(sandbox_id = %handle.id(), error = %e, "dev server restart after install failed");
            }
        }

        Ok(res)
    }

    async fn setup_vite_app(&self) -> Result<(), SandboxError> {
        let handle = self.require_handle()?;
        let sandbox_id = handle.id().to_string();
        let root = handle.root().to_string();
        let writing = self.enter(SandboxState::Writing);

        tracing::info!(sandbox_id = %sandbox_id, "bootstrapping dev server toolchain");

        let mkdir = ExecRequest::new("mkdir", ["-p".to_string(), format!("{root}/src")])
            .with_timeout(self.options.command_timeout);
        executor::run_command(Some(handle.clone()), mkdir).await?;

        let files = bootstrap::toolchain_files(self.dev_port());
        for file in &files {
            let res = transport::write_file(
                Some(handle.clone()),
                file.path,
                &file.content,
                self.options.command_timeout,
            )
            .await;
            match self.observe(&sandbox_id, res) {
                Ok(()) => {}
                Err(e @ (SandboxError::SandboxGone(_) | SandboxError::NoActiveSandbox)) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(sandbox_id = %sandbox_id, path = file.path, error = %e, "bootstrap file write failed");
                }
            }
        }

        drop(writing);
        let installing = self.enter(SandboxState::Installing);
        let res = executor::run_command(Some(handle.clone()), self.install_request(&root, &[])).await?;
        if res.success {
            tracing::info!(sandbox_id = %sandbox_id, "dependencies installed");
        } else {
            tracing::warn!(sandbox_id = %sandbox_id, stderr = %res.stderr, "npm install had issues, continuing");
        }
        drop(installing);

        let _restarting = self.enter(SandboxState::Restarting);
        self.cycle_dev_server(&handle, None).await?;

        self.session
            .lock()
            .known_files
            .extend(files.iter().map(|f| f.path.to_string()));

        let verify = ExecRequest::new("ls", ["-la", root.as_str()])
            .with_cwd("/")
            .with_timeout(self.options.command_timeout);
        match executor::run_command(Some(handle.clone()), verify).await {
            Ok(res) => tracing::debug!(sandbox_id = %sandbox_id, listing = %res.stdout, "bootstrap complete"),
            Err(e) => tracing::debug!(sandbox_id = %sandbox_id, error = %e, "bootstrap verification skipped"),
        }

        Ok(())
    }

    async fn restart_dev_server(&self) -> Result<(), SandboxError> {
        let handle = self.require_handle()?;
        let _restarting = self.enter(SandboxState::Restarting);
        tracing::info!(sandbox_id = %handle.id(), "restarting dev server");
        self.cycle_dev_server(&handle, Some(self.options.restart_pause)).await
    }

    fn url(&self) -> Option<String> {
        self.session.lock().info.as_ref().and_then(|i| i.url.clone())
    }

    fn info(&self) -> Option<SandboxInfo> {
        self.session.lock().info.clone()
    }

    fn state(&self) -> SandboxState {
        self.session.lock().state
    }

    fn known_files(&self) -> BTreeSet<String> {
        self.session.lock().known_files.clone()
    }

    async fn terminate(&self) {
        let handle = {
            let mut session = self.session.lock();
            session.info = None;
            session.state = SandboxState::Terminated;
            session.handle.take()
        };

        if let Some(handle) = handle {
            match handle.stop().await {
                Ok(()) => tracing::info!(sandbox_id = %handle.id(), "sandbox terminated"),
                Err(e) => tracing::warn!(sandbox_id = %handle.id(), error = %e, "failed to stop sandbox"),
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.session.lock().handle.is_some()
    }
}
