use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::SandboxError;

/// Port the dev server binds inside every sandbox.
pub const DEV_SERVER_PORT: u16 = 5173;

/// Working root of a Vercel sandbox.
pub const VERCEL_SANDBOX_ROOT: &str = "/vercel/sandbox";

// ── Sandbox identity ────────────────────────────────────────────────

pub type SandboxId = String;

// ── Backend kind ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackendKind {
    Vercel,
    LocalHost,
}

impl SandboxBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxBackendKind::Vercel => "vercel",
            SandboxBackendKind::LocalHost => "local",
        }
    }
}

// ── Backend info ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SandboxBackendInfo {
    pub kind: SandboxBackendKind,
    pub supports_public_http: bool,
    pub supports_bulk_write: bool,
    pub deferred_output: bool,
}

// ── Sandbox spec (input to provision) ───────────────────────────────

#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Overall session budget enforced by the remote infrastructure.
    pub timeout: Duration,
    pub runtime: String,
    pub ports: Vec<u16>,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(300_000),
            runtime: "node22".into(),
            ports: vec![DEV_SERVER_PORT],
        }
    }
}

// ── Session state ───────────────────────────────────────────────────

/// Lifecycle of one provider. `Unreachable` is entered from any live state
/// when the remote side reports the sandbox was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Uninitialized,
    Creating,
    Ready,
    Installing,
    Writing,
    Restarting,
    Terminated,
    Unreachable,
}

impl SandboxState {
    /// States in which a handle is held and work is in progress or possible.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SandboxState::Ready
                | SandboxState::Installing
                | SandboxState::Writing
                | SandboxState::Restarting
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxInfo {
    pub sandbox_id: SandboxId,
    pub url: Option<String>,
    pub provider: SandboxBackendKind,
    pub created_at: DateTime<Utc>,
}

// ── Exec model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Split a command line on whitespace into program + args.
    ///
    /// No quoting is honoured: `echo "a b"` yields the args `"a` and `b"`.
    /// Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), script.into()])
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and args joined for logging.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Output that has to be fetched after the command finished.
#[async_trait]
pub trait DeferredOutput: Send + Sync {
    async fn fetch(&self) -> Result<String, SandboxError>;
}

/// A stdout/stderr value as a backend hands it back: either already
/// captured, or an accessor that must be awaited.
pub enum OutputField {
    Inline(String),
    Deferred(Box<dyn DeferredOutput>),
}

impl std::fmt::Debug for OutputField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputField::Inline(s) => f.debug_tuple("Inline").field(s).finish(),
            OutputField::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<String> for OutputField {
    fn from(s: String) -> Self {
        OutputField::Inline(s)
    }
}

impl From<&str> for OutputField {
    fn from(s: &str) -> Self {
        OutputField::Inline(s.to_string())
    }
}

#[derive(Debug)]
pub struct RawExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: OutputField,
    pub stderr: OutputField,
}

/// Normalised command result. A nonzero exit is a normal value here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl CommandResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            success: exit_code == 0,
        }
    }

    /// Result standing in for a transport failure.
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::new(String::new(), message.into(), 1)
    }
}

// ── File operations ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PutFileRequest {
    /// Absolute path inside the sandbox.
    pub path: String,
    pub bytes: Vec<u8>,
}

// ── Backend configs ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VercelCredentials {
    Team {
        team_id: String,
        project_id: String,
        token: String,
    },
    Oidc {
        token: String,
    },
}

#[derive(Debug, Clone)]
pub struct VercelConfig {
    pub api_base_url: String,
    /// `None` surfaces as `NotConfigured` at create/reconnect time.
    pub credentials: Option<VercelCredentials>,
}

#[derive(Debug, Clone)]
pub struct LocalHostConfig {
    pub root_dir: PathBuf,
    pub inherit_env_allowlist: Vec<String>,
    pub max_output_bytes: usize,
}

impl Default for LocalHostConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(""), // must be set by caller
            inherit_env_allowlist: vec![
                "PATH".into(),
                "HOME".into(),
                "LANG".into(),
                "TERM".into(),
            ],
            max_output_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

#[derive(Debug, Clone)]
pub enum SandboxRuntimeConfig {
    Vercel(VercelConfig),
    LocalHost(LocalHostConfig),
}
