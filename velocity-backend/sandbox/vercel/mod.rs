//! HTTP client for the Vercel Sandbox REST API.
//!
//! API: POST /v1/sandboxes, POST /v1/sandboxes/{id}/cmd,
//! GET /v1/sandboxes/{id}/cmd/{cmd}?wait=true, GET /v1/sandboxes/{id}/cmd/{cmd}/logs,
//! POST /v1/sandboxes/{id}/fs/write, POST /v1/sandboxes/{id}/stop

pub mod auth;

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sandbox::error::{SandboxError, SANDBOX_STOPPED_CODE};
use crate::sandbox::types::{PutFileRequest, SandboxSpec};

pub use auth::VercelAuth;

/// Characters escaped when an id is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'%');

// ── Request / Response types ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxRequest {
    pub project_id: String,
    pub ports: Vec<u16>,
    /// Milliseconds.
    pub timeout: u64,
    pub runtime: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxMetadata {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SandboxRoute {
    pub port: u16,
    pub subdomain: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl SandboxRoute {
    pub fn public_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("https://{}.vercel.run", self.subdomain))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSandboxResponse {
    pub sandbox: SandboxMetadata,
    #[serde(default)]
    pub routes: Vec<SandboxRoute>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCommandRequest<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub cwd: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub sudo: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandMetadata {
    pub id: String,
    #[serde(rename = "exitCode", default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommandResponse {
    command: CommandMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct LogLine {
    stream: String,
    #[serde(default)]
    data: String,
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLogs {
    pub stdout: String,
    pub stderr: String,
}

/// Parse the newline-delimited JSON the logs endpoint streams.
/// Lines that fail to parse are skipped.
pub fn parse_log_lines(body: &str) -> CommandLogs {
    let mut logs = CommandLogs::default();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<LogLine>(line) {
            Ok(entry) if entry.stream == "stdout" => logs.stdout.push_str(&entry.data),
            Ok(entry) if entry.stream == "stderr" => logs.stderr.push_str(&entry.data),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "skipping malformed log line"),
        }
    }
    logs
}

/// Gzipped tar of `files`, entry paths relative to `/`.
pub fn build_tarball(files: &[PutFileRequest]) -> Result<Vec<u8>, SandboxError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder.append_data(&mut header, file.path.trim_start_matches('/'), file.bytes.as_slice())?;
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for the Vercel Sandbox API.
#[derive(Debug, Clone)]
pub struct VercelSandboxClient {
    base_url: String,
    client: reqwest::Client,
}

impl VercelSandboxClient {
    pub fn new(base_url: &str) -> Result<Self, SandboxError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SandboxError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn sandbox_url(&self, sandbox_id: &str, suffix: &str) -> String {
        format!(
            "{}/v1/sandboxes/{}{}",
            self.base_url,
            utf8_percent_encode(sandbox_id, PATH_SEGMENT),
            suffix
        )
    }

    /// Map a non-success response to the error taxonomy. 410 or the
    /// `sandbox_stopped` code means the sandbox is gone.
    async fn check(
        resp: reqwest::Response,
        sandbox_id: Option<&str>,
        what: &str,
    ) -> Result<reqwest::Response, SandboxError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();

        if let Some(id) = sandbox_id {
            if status == StatusCode::GONE || body.contains(SANDBOX_STOPPED_CODE) {
                return Err(SandboxError::SandboxGone(id.to_string()));
            }
            if status == StatusCode::NOT_FOUND {
                return Err(SandboxError::NotFound(format!("{what}: sandbox {id}: {body}")));
            }
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(SandboxError::NotConfigured(format!(
                "{what} rejected credentials ({status}): {body}"
            )));
        }
        Err(SandboxError::Backend(format!("{what} returned {status}: {body}")))
    }

    /// Create a new sandbox.
    pub async fn create_sandbox(
        &self,
        auth: &VercelAuth,
        spec: &SandboxSpec,
    ) -> Result<CreateSandboxResponse, SandboxError> {
        let url = format!("{}/v1/sandboxes", self.base_url);
        let req = CreateSandboxRequest {
            project_id: auth.project_id.clone(),
            ports: spec.ports.clone(),
            timeout: spec.timeout.as_millis() as u64,
            runtime: spec.runtime.clone(),
        };

        tracing::info!(runtime = %req.runtime, ports = ?req.ports, "creating Vercel sandbox");

        let resp = self
            .client
            .post(&url)
            .query(&[("teamId", auth.team_id.as_str())])
            .bearer_auth(&auth.token)
            .json(&req)
            .send()
            .await
            .map_err(|e| SandboxError::Provision(format!("sandbox create failed: {e}")))?;

        let resp = Self::check(resp, None, "sandbox create").await.map_err(|e| match e {
            SandboxError::Backend(msg) => SandboxError::Provision(msg),
            other => other,
        })?;

        let created = resp
            .json::<CreateSandboxResponse>()
            .await
            .map_err(|e| SandboxError::Serde(format!("failed to parse sandbox response: {e}")))?;

        tracing::info!(
            sandbox_id = %created.sandbox.id,
            status = ?created.sandbox.status,
            routes = created.routes.len(),
            "Vercel sandbox created"
        );
        Ok(created)
    }

    /// Start a command. Returns as soon as the command is accepted.
    pub async fn run_command(
        &self,
        auth: &VercelAuth,
        sandbox_id: &str,
        req: &RunCommandRequest<'_>,
    ) -> Result<CommandMetadata, SandboxError> {
        let url = self.sandbox_url(sandbox_id, "/cmd");
        let resp = self
            .client
            .post(&url)
            .query(&[("teamId", auth.team_id.as_str())])
            .bearer_auth(&auth.token)
            .json(req)
            .send()
            .await
            .map_err(|e| SandboxError::Exec(format!("run command failed: {e}")))?;

        let resp = Self::check(resp, Some(sandbox_id), "run command").await?;
        resp.json::<CommandResponse>()
            .await
            .map(|r| r.command)
            .map_err(|e| SandboxError::Serde(format!("failed to parse command response: {e}")))
    }

    /// Block until the command finishes and return its exit code.
    pub async fn wait_command(
        &self,
        auth: &VercelAuth,
        sandbox_id: &str,
        cmd_id: &str,
    ) -> Result<CommandMetadata, SandboxError> {
        let url = self.sandbox_url(
            sandbox_id,
            &format!("/cmd/{}", utf8_percent_encode(cmd_id, PATH_SEGMENT)),
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("teamId", auth.team_id.as_str()), ("wait", "true")])
            .bearer_auth(&auth.token)
            .send()
            .await
            .map_err(|e| SandboxError::Exec(format!("wait for command failed: {e}")))?;

        let resp = Self::check(resp, Some(sandbox_id), "wait for command").await?;
        resp.json::<CommandResponse>()
            .await
            .map(|r| r.command)
            .map_err(|e| SandboxError::Serde(format!("failed to parse command response: {e}")))
    }

    /// Fetch the full stdout/stderr of a command.
    pub async fn command_logs(
        &self,
        auth: &VercelAuth,
        sandbox_id: &str,
        cmd_id: &str,
    ) -> Result<CommandLogs, SandboxError> {
        let url = self.sandbox_url(
            sandbox_id,
            &format!("/cmd/{}/logs", utf8_percent_encode(cmd_id, PATH_SEGMENT)),
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("teamId", auth.team_id.as_str())])
            .bearer_auth(&auth.token)
            .send()
            .await
            .map_err(|e| SandboxError::Backend(format!("fetch command logs failed: {e}")))?;

        let resp = Self::check(resp, Some(sandbox_id), "fetch command logs").await?;
        let body = resp
            .text()
            .await
            .map_err(|e| SandboxError::Backend(format!("read command logs failed: {e}")))?;
        Ok(parse_log_lines(&body))
    }

    /// Upload files as a gzipped tarball extracted at `/`.
    pub async fn write_files(
        &self,
        auth: &VercelAuth,
        sandbox_id: &str,
        files: &[PutFileRequest],
    ) -> Result<(), SandboxError> {
        let url = self.sandbox_url(sandbox_id, "/fs/write");
        let body = build_tarball(files)?;

        let resp = self
            .client
            .post(&url)
            .query(&[("teamId", auth.team_id.as_str())])
            .bearer_auth(&auth.token)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .header("x-cwd", "/")
            .body(body)
            .send()
            .await
            .map_err(|e| SandboxError::Backend(format!("file write failed: {e}")))?;

        Self::check(resp, Some(sandbox_id), "file write").await?;
        Ok(())
    }

    /// Stop a sandbox. Already-stopped sandboxes are not an error.
    pub async fn stop_sandbox(&self, auth: &VercelAuth, sandbox_id: &str) -> Result<(), SandboxError> {
        let url = self.sandbox_url(sandbox_id, "/stop");

        tracing::info!(sandbox_id = %sandbox_id, "stopping Vercel sandbox");

        let resp = self
            .client
            .post(&url)
            .query(&[("teamId", auth.team_id.as_str())])
            .bearer_auth(&auth.token)
            .send()
            .await
            .map_err(|e| SandboxError::Backend(format!("sandbox stop failed: {e}")))?;

        match Self::check(resp, Some(sandbox_id), "sandbox stop").await {
            Ok(_) => Ok(()),
            Err(SandboxError::SandboxGone(_)) | Err(SandboxError::NotFound(_)) => {
                tracing::warn!(sandbox_id = %sandbox_id, "sandbox already stopped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
