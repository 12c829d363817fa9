//! In-memory backend for tests.
//!
//! The "remote" side lives behind one shared map, so a handle obtained by
//! `attach` sees the files written through a handle from `provision`, the
//! same way two clients of the real API would.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::SandboxBackend;
use super::error::SandboxError;
use super::handle::SandboxHandle;
use super::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Inline,
    Deferred,
    FailingDeferred,
}

#[derive(Default)]
struct FakeSandbox {
    files: BTreeMap<String, String>,
    commands: Vec<String>,
    exec_attempts: usize,
    gone: bool,
    stopped: bool,
}

struct FakeRemote {
    next_id: u64,
    sandboxes: HashMap<String, FakeSandbox>,
    output_mode: OutputMode,
    fail_bulk_write: bool,
    fail_shell_write: bool,
    fail_exec: bool,
    fail_stop: bool,
    unconfigured: bool,
    failing_programs: HashSet<String>,
    exec_delay: Option<Duration>,
    provisioned: usize,
    attached: usize,
}

#[derive(Clone)]
pub struct FakeBackend {
    remote: Arc<Mutex<FakeRemote>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            remote: Arc::new(Mutex::new(FakeRemote {
                next_id: 1,
                sandboxes: HashMap::new(),
                output_mode: OutputMode::Inline,
                fail_bulk_write: false,
                fail_shell_write: false,
                fail_exec: false,
                fail_stop: false,
                unconfigured: false,
                failing_programs: HashSet::new(),
                exec_delay: None,
                provisioned: 0,
                attached: 0,
            })),
        }
    }

    /// Create a remote sandbox without going through a provider.
    pub fn seed_sandbox(&self, id: &str) {
        self.remote.lock().sandboxes.entry(id.to_string()).or_default();
    }

    pub fn seed_file(&self, id: &str, path: &str, content: &str) {
        self.remote
            .lock()
            .sandboxes
            .entry(id.to_string())
            .or_default()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, id: &str, path: &str) -> Option<String> {
        self.remote
            .lock()
            .sandboxes
            .get(id)
            .and_then(|s| s.files.get(path).cloned())
    }

    pub fn commands(&self, id: &str) -> Vec<String> {
        self.remote
            .lock()
            .sandboxes
            .get(id)
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    pub fn exec_attempts(&self, id: &str) -> usize {
        self.remote
            .lock()
            .sandboxes
            .get(id)
            .map(|s| s.exec_attempts)
            .unwrap_or_default()
    }

    pub fn was_stopped(&self, id: &str) -> bool {
        self.remote
            .lock()
            .sandboxes
            .get(id)
            .is_some_and(|s| s.stopped)
    }

    /// Simulate the infrastructure reclaiming the sandbox.
    pub fn mark_gone(&self, id: &str) {
        self.remote.lock().sandboxes.entry(id.to_string()).or_default().gone = true;
    }

    pub fn provision_count(&self) -> usize {
        self.remote.lock().provisioned
    }

    pub fn attach_count(&self) -> usize {
        self.remote.lock().attached
    }

    pub fn set_output_mode(&self, mode: OutputMode) {
        self.remote.lock().output_mode = mode;
    }

    pub fn fail_bulk_write(&self, fail: bool) {
        self.remote.lock().fail_bulk_write = fail;
    }

    pub fn fail_shell_write(&self, fail: bool) {
        self.remote.lock().fail_shell_write = fail;
    }

    pub fn fail_exec(&self, fail: bool) {
        self.remote.lock().fail_exec = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.remote.lock().fail_stop = fail;
    }

    pub fn unconfigure(&self) {
        self.remote.lock().unconfigured = true;
    }

    pub fn fail_program(&self, program: &str) {
        self.remote.lock().failing_programs.insert(program.to_string());
    }

    pub fn set_exec_delay(&self, delay: Option<Duration>) {
        self.remote.lock().exec_delay = delay;
    }

    fn handle(&self, id: String) -> Arc<dyn SandboxHandle> {
        Arc::new(FakeHandle {
            id,
            remote: self.remote.clone(),
        })
    }
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    fn info(&self) -> SandboxBackendInfo {
        SandboxBackendInfo {
            kind: SandboxBackendKind::Vercel,
            supports_public_http: true,
            supports_bulk_write: true,
            deferred_output: self.remote.lock().output_mode != OutputMode::Inline,
        }
    }

    async fn provision(&self, _spec: &SandboxSpec) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let id = {
            let mut remote = self.remote.lock();
            if remote.unconfigured {
                return Err(SandboxError::NotConfigured("no credentials".into()));
            }
            let id = format!("sbx_fake{}", remote.next_id);
            remote.next_id += 1;
            remote.provisioned += 1;
            remote.sandboxes.insert(id.clone(), FakeSandbox::default());
            id
        };
        Ok(self.handle(id))
    }

    async fn attach(
        &self,
        id: &str,
        _spec: &SandboxSpec,
    ) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        {
            let mut remote = self.remote.lock();
            if remote.unconfigured {
                return Err(SandboxError::NotConfigured("no credentials".into()));
            }
            remote.attached += 1;
        }
        Ok(self.handle(id.to_string()))
    }
}

struct FakeHandle {
    id: String,
    remote: Arc<Mutex<FakeRemote>>,
}

struct FakeDeferred(Option<String>);

#[async_trait]
impl DeferredOutput for FakeDeferred {
    async fn fetch(&self) -> Result<String, SandboxError> {
        self.0
            .clone()
            .ok_or_else(|| SandboxError::Backend("logs unavailable".into()))
    }
}

/// `ls -Rp` rendering of every file under `dir`, depth first like GNU ls.
fn render_ls(files: &BTreeMap<String, String>, dir: &str) -> Option<String> {
    let dir = dir.trim_end_matches('/');
    let prefix = format!("{dir}/");
    let mut children: BTreeMap<String, BTreeSet<(String, bool)>> = BTreeMap::new();
    children.entry(dir.to_string()).or_default();

    let mut any = false;
    for path in files.keys().filter(|p| p.starts_with(&prefix)) {
        any = true;
        let rel = &path[prefix.len()..];
        let segments: Vec<&str> = rel.split('/').collect();
        let mut cur = dir.to_string();
        for (i, seg) in segments.iter().enumerate() {
            let is_dir = i + 1 < segments.len();
            children
                .entry(cur.clone())
                .or_default()
                .insert((seg.to_string(), is_dir));
            if is_dir {
                cur = format!("{cur}/{seg}");
                children.entry(cur.clone()).or_default();
            }
        }
    }
    if !any && dir != VERCEL_SANDBOX_ROOT {
        return None;
    }

    fn walk(out: &mut String, children: &BTreeMap<String, BTreeSet<(String, bool)>>, cur: &str) {
        out.push_str(&format!("{cur}:\n"));
        let entries = children.get(cur).cloned().unwrap_or_default();
        for (name, is_dir) in &entries {
            out.push_str(name);
            if *is_dir {
                out.push('/');
            }
            out.push('\n');
        }
        for (name, is_dir) in &entries {
            if *is_dir {
                out.push('\n');
                walk(out, children, &format!("{cur}/{name}"));
            }
        }
    }

    let mut out = String::new();
    walk(&mut out, &children, dir);
    Some(out)
}

#[async_trait]
impl SandboxHandle for FakeHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn root(&self) -> &str {
        VERCEL_SANDBOX_ROOT
    }

    async fn exec(&self, req: ExecRequest) -> Result<RawExecOutput, SandboxError> {
        let delay = self.remote.lock().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut remote = self.remote.lock();
        let fail_exec = remote.fail_exec;
        let fail_shell_write = remote.fail_shell_write;
        let mode = remote.output_mode;
        let failing = remote.failing_programs.contains(&req.program);

        let Some(sbx) = remote.sandboxes.get_mut(&self.id) else {
            return Err(SandboxError::SandboxGone(self.id.clone()));
        };
        sbx.exec_attempts += 1;
        if sbx.gone {
            return Err(SandboxError::SandboxGone(self.id.clone()));
        }
        if fail_exec {
            return Err(SandboxError::Backend("connection reset by peer".into()));
        }
        sbx.commands.push(req.display());

        let arg = |i: usize| req.args.get(i).map(String::as_str).unwrap_or_default();
        let (exit_code, stdout, stderr) = if failing {
            (1, String::new(), format!("{}: command failed", req.program))
        } else {
            match req.program.as_str() {
                "cat" => match sbx.files.get(arg(0)) {
                    Some(content) => (0, content.clone(), String::new()),
                    None => (
                        1,
                        String::new(),
                        format!("cat: {}: No such file or directory", arg(0)),
                    ),
                },
                "ls" if arg(0) == "-Rp" => match render_ls(&sbx.files, arg(1)) {
                    Some(out) => (0, out, String::new()),
                    None => (
                        2,
                        String::new(),
                        format!("ls: cannot access '{}': No such file or directory", arg(1)),
                    ),
                },
                "sh" if fail_shell_write && arg(1).contains("printf") => (
                    1,
                    String::new(),
                    "sh: 1: cannot create file: Read-only file system".to_string(),
                ),
                _ => (0, String::new(), String::new()),
            }
        };

        let wrap = |s: String| match mode {
            OutputMode::Inline => OutputField::Inline(s),
            OutputMode::Deferred => OutputField::Deferred(Box::new(FakeDeferred(Some(s)))),
            OutputMode::FailingDeferred => OutputField::Deferred(Box::new(FakeDeferred(None))),
        };

        Ok(RawExecOutput {
            exit_code: Some(exit_code),
            stdout: wrap(stdout),
            stderr: wrap(stderr),
        })
    }

    async fn write_files(&self, files: Vec<PutFileRequest>) -> Result<(), SandboxError> {
        let mut remote = self.remote.lock();
        let fail = remote.fail_bulk_write;
        let sbx = match remote.sandboxes.get_mut(&self.id) {
            Some(s) if !s.gone => s,
            _ => return Err(SandboxError::SandboxGone(self.id.clone())),
        };
        if fail {
            return Err(SandboxError::Backend(
                "fs/write returned 500 Internal Server Error".into(),
            ));
        }
        for f in files {
            sbx.files
                .insert(f.path, String::from_utf8_lossy(&f.bytes).into_owned());
        }
        Ok(())
    }

    fn domain(&self, port: u16) -> Option<String> {
        Some(format!("https://{}-{port}.fake.run", self.id))
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        let mut remote = self.remote.lock();
        if remote.fail_stop {
            return Err(SandboxError::Backend("stop failed".into()));
        }
        if let Some(sbx) = remote.sandboxes.get_mut(&self.id) {
            sbx.stopped = true;
            sbx.gone = true;
        }
        Ok(())
    }
}
