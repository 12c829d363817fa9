//! Command executor: the one place backend output is normalised.
//!
//! Backends hand back stdout/stderr either as plain strings or as deferred
//! accessors. Everything above this module only ever sees `CommandResult`.

use std::sync::Arc;

use super::error::SandboxError;
use super::handle::SandboxHandle;
use super::types::{CommandResult, ExecRequest, OutputField, RawExecOutput};

/// Run `req` against `handle` and normalise the result.
///
/// Fails only with `NoActiveSandbox` when there is no handle. Transport
/// errors and timeouts become a synthetic result with exit code 1.
pub async fn run_command(
    handle: Option<Arc<dyn SandboxHandle>>,
    req: ExecRequest,
) -> Result<CommandResult, SandboxError> {
    let handle = handle.ok_or(SandboxError::NoActiveSandbox)?;
    let shown = req.display();

    let outcome = match req.timeout {
        Some(limit) => match tokio::time::timeout(limit, handle.exec(req)).await {
            Ok(res) => res,
            Err(_) => Err(SandboxError::Timeout),
        },
        None => handle.exec(req).await,
    };

    match outcome {
        Ok(raw) => Ok(normalize(raw).await),
        Err(e) => {
            tracing::warn!(
                sandbox_id = %handle.id(),
                command = %shown,
                error = %e,
                "command transport failed"
            );
            Ok(CommandResult::transport_failure(e.to_string()))
        }
    }
}

/// Resolve both output fields and derive `success` from the exit code.
pub async fn normalize(raw: RawExecOutput) -> CommandResult {
    let stdout = resolve_output(raw.stdout).await;
    let stderr = resolve_output(raw.stderr).await;
    CommandResult::new(stdout, stderr, raw.exit_code.unwrap_or(-1))
}

/// Inline values pass through; deferred ones are awaited, and a failed
/// fetch yields an empty string.
pub async fn resolve_output(field: OutputField) -> String {
    match field {
        OutputField::Inline(s) => s,
        OutputField::Deferred(accessor) => match accessor.fetch().await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(error = %e, "discarding unreadable command output");
                String::new()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sandbox::testing::{FakeBackend, OutputMode};
    use crate::sandbox::backend::SandboxBackend;
    use crate::sandbox::types::SandboxSpec;

    async fn fake_handle(backend: &FakeBackend) -> Arc<dyn SandboxHandle> {
        backend.provision(&SandboxSpec::default()).await.unwrap()
    }

    #[tokio::test]
    async fn missing_handle_is_no_active_sandbox() {
        let err = run_command(None, ExecRequest::new("ls", ["-la"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::NoActiveSandbox));
    }

    #[tokio::test]
    async fn inline_output_passes_through() {
        let backend = FakeBackend::new();
        let handle = fake_handle(&backend).await;
        backend.seed_file(handle.id(), "/vercel/sandbox/a.txt", "hello");

        let res = run_command(Some(handle), ExecRequest::new("cat", ["/vercel/sandbox/a.txt"]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "hello");
        assert_eq!(res.exit_code, 0);
        assert!(res.success);
    }

    #[tokio::test]
    async fn deferred_output_is_awaited() {
        let backend = FakeBackend::new();
        backend.set_output_mode(OutputMode::Deferred);
        let handle = fake_handle(&backend).await;
        backend.seed_file(handle.id(), "/vercel/sandbox/a.txt", "deferred body");

        let res = run_command(Some(handle), ExecRequest::new("cat", ["/vercel/sandbox/a.txt"]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "deferred body");
    }

    #[tokio::test]
    async fn failing_deferred_output_becomes_empty() {
        let backend = FakeBackend::new();
        backend.set_output_mode(OutputMode::FailingDeferred);
        let handle = fake_handle(&backend).await;
        backend.seed_file(handle.id(), "/vercel/sandbox/a.txt", "unreachable");

        let res = run_command(Some(handle), ExecRequest::new("cat", ["/vercel/sandbox/a.txt"]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "");
        assert_eq!(res.stderr, "");
        assert!(res.success);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_normal_result() {
        let backend = FakeBackend::new();
        let handle = fake_handle(&backend).await;

        let res = run_command(Some(handle), ExecRequest::new("cat", ["/nope"]))
            .await
            .unwrap();
        assert_eq!(res.exit_code, 1);
        assert!(!res.success);
        assert!(res.stderr.contains("No such file"));
    }

    #[tokio::test]
    async fn transport_error_becomes_synthetic_result() {
        let backend = FakeBackend::new();
        let handle = fake_handle(&backend).await;
        backend.fail_exec(true);

        let res = run_command(Some(handle), ExecRequest::new("ls", ["-la"]))
            .await
            .unwrap();
        assert_eq!(res.stdout, "");
        assert_eq!(res.exit_code, 1);
        assert!(!res.success);
        assert!(res.stderr.contains("connection reset"));
    }

    #[tokio::test]
    async fn timeout_becomes_synthetic_result() {
        let backend = FakeBackend::new();
        let handle = fake_handle(&backend).await;
        backend.set_exec_delay(Some(Duration::from_millis(500)));

        let req = ExecRequest::new("ls", ["-la"]).with_timeout(Some(Duration::from_millis(20)));
        let res = run_command(Some(handle), req).await.unwrap();
        assert_eq!(res.exit_code, 1);
        assert_eq!(res.stderr, "timeout");
    }

    #[tokio::test]
    async fn missing_exit_code_is_failure() {
        let raw = RawExecOutput {
            exit_code: None,
            stdout: "partial".into(),
            stderr: OutputField::Inline(String::new()),
        };
        let res = normalize(raw).await;
        assert_eq!(res.exit_code, -1);
        assert!(!res.success);
        assert_eq!(res.stdout, "partial");
    }
}
