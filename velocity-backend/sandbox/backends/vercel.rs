//! Vercel Sandbox backend.
//!
//! Each handle is a thin wrapper around the REST client plus the sandbox id
//! and its public routes. Command output is not returned by the run call;
//! it is fetched lazily from the logs endpoint, once per command.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::sandbox::backend::SandboxBackend;
use crate::sandbox::error::SandboxError;
use crate::sandbox::handle::SandboxHandle;
use crate::sandbox::types::*;
use crate::sandbox::vercel::{
    CommandLogs, RunCommandRequest, SandboxRoute, VercelAuth, VercelSandboxClient,
};

pub struct VercelBackend {
    client: VercelSandboxClient,
    config: VercelConfig,
}

impl VercelBackend {
    pub fn new(config: VercelConfig) -> Result<Self, SandboxError> {
        let client = VercelSandboxClient::new(&config.api_base_url)?;
        Ok(Self { client, config })
    }

    fn auth(&self) -> Result<VercelAuth, SandboxError> {
        VercelAuth::resolve(self.config.credentials.as_ref())
    }
}

#[async_trait]
impl SandboxBackend for VercelBackend {
    fn info(&self) -> SandboxBackendInfo {
        SandboxBackendInfo {
            kind: SandboxBackendKind::Vercel,
            supports_public_http: true,
            supports_bulk_write: true,
            deferred_output: true,
        }
    }

    async fn provision(&self, spec: &SandboxSpec) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let auth = self.auth()?;
        let created = self.client.create_sandbox(&auth, spec).await?;

        Ok(Arc::new(VercelHandle {
            id: created.sandbox.id,
            client: self.client.clone(),
            auth,
            routes: created.routes,
        }))
    }

    async fn attach(
        &self,
        id: &str,
        _spec: &SandboxSpec,
    ) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let auth = self.auth()?;
        tracing::debug!(sandbox_id = %id, "attaching to Vercel sandbox");

        Ok(Arc::new(VercelHandle {
            id: id.to_string(),
            client: self.client.clone(),
            auth,
            routes: Vec::new(),
        }))
    }
}

pub struct VercelHandle {
    id: String,
    client: VercelSandboxClient,
    auth: VercelAuth,
    /// Empty for attached handles; callers fall back to the stored URL.
    routes: Vec<SandboxRoute>,
}

/// Logs of one command, fetched on first access and shared by both streams.
struct LogFetch {
    client: VercelSandboxClient,
    auth: VercelAuth,
    sandbox_id: String,
    cmd_id: String,
    cell: OnceCell<Result<CommandLogs, String>>,
}

impl LogFetch {
    async fn get(&self) -> Result<&CommandLogs, SandboxError> {
        let res = self
            .cell
            .get_or_init(|| async {
                self.client
                    .command_logs(&self.auth, &self.sandbox_id, &self.cmd_id)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;
        res.as_ref().map_err(|msg| SandboxError::Backend(msg.clone()))
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

struct LogStream {
    logs: Arc<LogFetch>,
    stream: Stream,
}

#[async_trait]
impl DeferredOutput for LogStream {
    async fn fetch(&self) -> Result<String, SandboxError> {
        let logs = self.logs.get().await?;
        Ok(match self.stream {
            Stream::Stdout => logs.stdout.clone(),
            Stream::Stderr => logs.stderr.clone(),
        })
    }
}

#[async_trait]
impl SandboxHandle for VercelHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn root(&self) -> &str {
        VERCEL_SANDBOX_ROOT
    }

    async fn exec(&self, req: ExecRequest) -> Result<RawExecOutput, SandboxError> {
        let cwd = req.cwd.as_deref().unwrap_or(VERCEL_SANDBOX_ROOT);
        let started = self
            .client
            .run_command(
                &self.auth,
                &self.id,
                &RunCommandRequest {
                    command: &req.program,
                    args: &req.args,
                    cwd,
                    env: &req.env,
                    sudo: false,
                },
            )
            .await?;

        let finished = self
            .client
            .wait_command(&self.auth, &self.id, &started.id)
            .await?;

        tracing::debug!(
            sandbox_id = %self.id,
            cmd_id = %finished.id,
            command = %req.display(),
            exit_code = ?finished.exit_code,
            "command finished"
        );

        let logs = Arc::new(LogFetch {
            client: self.client.clone(),
            auth: self.auth.clone(),
            sandbox_id: self.id.clone(),
            cmd_id: finished.id,
            cell: OnceCell::new(),
        });

        Ok(RawExecOutput {
            exit_code: finished.exit_code,
            stdout: OutputField::Deferred(Box::new(LogStream {
                logs: logs.clone(),
                stream: Stream::Stdout,
            })),
            stderr: OutputField::Deferred(Box::new(LogStream {
                logs,
                stream: Stream::Stderr,
            })),
        })
    }

    async fn write_files(&self, files: Vec<PutFileRequest>) -> Result<(), SandboxError> {
        self.client.write_files(&self.auth, &self.id, &files).await
    }

    fn domain(&self, port: u16) -> Option<String> {
        self.routes
            .iter()
            .find(|r| r.port == port)
            .map(SandboxRoute::public_url)
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        self.client.stop_sandbox(&self.auth, &self.id).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::sandbox::dev_sandbox::{DevSandbox, DevSandboxOptions};
    use crate::sandbox::executor;
    use crate::sandbox::provider::SandboxProvider;

    fn backend(server: &MockServer) -> VercelBackend {
        VercelBackend::new(VercelConfig {
            api_base_url: server.uri(),
            credentials: Some(VercelCredentials::Team {
                team_id: "team_1".into(),
                project_id: "prj_1".into(),
                token: "tok".into(),
            }),
        })
        .unwrap()
    }

    async fn mount_create(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sandbox": { "id": "sbx_1" },
                "routes": [{ "port": 5173, "subdomain": "sb-1" }]
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn backend_info() {
        let b = VercelBackend::new(VercelConfig {
            api_base_url: "https://api.vercel.com".into(),
            credentials: None,
        })
        .unwrap();
        let info = b.info();
        assert_eq!(info.kind, SandboxBackendKind::Vercel);
        assert!(info.deferred_output);
        assert!(info.supports_public_http);
    }

    #[tokio::test]
    async fn provision_without_credentials_is_not_configured() {
        let b = VercelBackend::new(VercelConfig {
            api_base_url: "http://127.0.0.1:9".into(),
            credentials: None,
        })
        .unwrap();
        let err = b.provision(&SandboxSpec::default()).await.err().unwrap();
        assert!(matches!(err, SandboxError::NotConfigured(_)));
        let err = b.attach("sbx_1", &SandboxSpec::default()).await.err().unwrap();
        assert!(matches!(err, SandboxError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn provisioned_handle_exposes_route_domain() {
        let server = MockServer::start().await;
        mount_create(&server).await;

        let handle = backend(&server).provision(&SandboxSpec::default()).await.unwrap();
        assert_eq!(handle.id(), "sbx_1");
        assert_eq!(handle.domain(5173).as_deref(), Some("https://sb-1.vercel.run"));
        assert!(handle.domain(3000).is_none());
    }

    #[tokio::test]
    async fn exec_output_is_deferred_and_fetched_once() {
        let server = MockServer::start().await;
        mount_create(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes/sbx_1/cmd"))
            .and(body_partial_json(json!({
                "command": "cat",
                "args": ["/vercel/sandbox/src/App.jsx"],
                "cwd": "/vercel/sandbox",
                "sudo": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "command": { "id": "cmd_1", "exitCode": null }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/sandboxes/sbx_1/cmd/cmd_1"))
            .and(query_param("wait", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "command": { "id": "cmd_1", "exitCode": 0 }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/sandboxes/sbx_1/cmd/cmd_1/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                r#"{"stream":"stdout","data":"export default App"}"#,
                "\n",
                r#"{"stream":"stderr","data":""}"#,
                "\n"
            )))
            .expect(1)
            .mount(&server)
            .await;

        let handle = backend(&server).provision(&SandboxSpec::default()).await.unwrap();
        let req = ExecRequest::new("cat", ["/vercel/sandbox/src/App.jsx"]);
        let res = executor::run_command(Some(handle), req).await.unwrap();
        assert_eq!(res.stdout, "export default App");
        assert_eq!(res.stderr, "");
        assert!(res.success);
    }

    #[tokio::test]
    async fn provider_over_vercel_detects_gone_on_list() {
        let server = MockServer::start().await;
        mount_create(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/sandboxes/sbx_1/cmd"))
            .respond_with(ResponseTemplate::new(410).set_body_json(json!({
                "error": { "code": "sandbox_stopped" }
            })))
            .mount(&server)
            .await;

        let provider = DevSandbox::new(Arc::new(backend(&server)), DevSandboxOptions::default());
        let info = provider.create_sandbox().await.unwrap();
        assert_eq!(info.url.as_deref(), Some("https://sb-1.vercel.run"));

        let err = provider.list_files(None).await.unwrap_err();
        assert!(matches!(err, SandboxError::SandboxGone(_)));
        assert!(!provider.is_alive());
    }
}
