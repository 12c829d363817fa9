use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::sandbox::error::SandboxError;
use crate::sandbox::types::ExecRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Captured result of one host process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// `None` when the process was killed or died from a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Wraps `tokio::process::Command` with env filtering, output limits,
/// timeout, and kill. Used by the local host backend.
pub struct ProcessSupervisor {
    /// Environment variables to inherit from host (allowlist).
    pub env_allowlist: Vec<String>,
    /// Maximum bytes kept per stream; later lines are dropped.
    pub max_output_bytes: usize,
}

impl ProcessSupervisor {
    pub fn new(env_allowlist: Vec<String>, max_output_bytes: usize) -> Self {
        Self {
            env_allowlist,
            max_output_bytes,
        }
    }

    fn build_env(&self, extra: &BTreeMap<String, String>) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env_allowlist
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|val| (key.clone(), val)))
            .collect();
        env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Run a command to completion, capturing output.
    pub async fn exec(
        &self,
        req: &ExecRequest,
        working_dir: &Path,
    ) -> Result<ProcessOutput, SandboxError> {
        if req.program.trim().is_empty() {
            return Err(SandboxError::Exec("empty command".into()));
        }

        let mut cmd = Command::new(&req.program);
        cmd.args(&req.args);
        match req.cwd.as_deref() {
            Some(cwd) => cmd.current_dir(cwd),
            None => cmd.current_dir(working_dir),
        };
        cmd.env_clear();
        for (k, v) in self.build_env(&req.env) {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::Exec(format!("spawn failed: {e}")))?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(collect_capped(out, self.max_output_bytes)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_capped(err, self.max_output_bytes)));

        let timeout_dur = req.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let (timed_out, exit_code) = match tokio::time::timeout(timeout_dur, child.wait()).await {
            Ok(Ok(status)) => (false, status.code()),
            Ok(Err(e)) => return Err(SandboxError::Exec(format!("wait failed: {e}"))),
            Err(_) => {
                let _ = child.kill().await;
                (true, None)
            }
        };

        let (stdout, stderr) =
            futures::future::join(drained(stdout_task), drained(stderr_task)).await;

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}

async fn drained(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

async fn collect_capped<R>(reader: R, max_bytes: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if buf.len() + line.len() <= max_bytes {
                    buf.extend_from_slice(&line);
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(vec!["PATH".into()], 1024 * 1024)
    }

    fn req(program: &str, args: &[&str]) -> ExecRequest {
        ExecRequest::new(program, args.iter().copied()).with_timeout(Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn exec_echo() {
        let result = supervisor()
            .exec(&req("echo", &["hello sandbox"]), &PathBuf::from("."))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
        assert_eq!(result.stdout.trim(), "hello sandbox");
    }

    #[tokio::test]
    async fn exec_nonzero_exit() {
        let result = supervisor()
            .exec(&req("sh", &["-c", "echo oops >&2; exit 42"]), &PathBuf::from("."))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(42));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn exec_runs_in_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();

        let result = supervisor()
            .exec(&req("cat", &["marker.txt"]), tmp.path())
            .await
            .unwrap();
        assert_eq!(result.stdout, "here");
    }

    #[tokio::test]
    async fn exec_timeout() {
        let request = ExecRequest::new("sleep", ["60"]).with_timeout(Some(Duration::from_millis(200)));
        let result = supervisor().exec(&request, &PathBuf::from(".")).await.unwrap();
        assert!(result.timed_out);
        assert!(result.exit_code.is_none());
    }

    #[tokio::test]
    async fn exec_env_filtering() {
        let mut request = req("sh", &["-c", "echo \"$MY_VAR:$HOME\""]);
        request.env.insert("MY_VAR".into(), "my_value".into());

        let result = supervisor().exec(&request, &PathBuf::from(".")).await.unwrap();
        assert_eq!(result.stdout.trim(), "my_value:");
    }

    #[tokio::test]
    async fn exec_output_is_capped() {
        let sup = ProcessSupervisor::new(vec!["PATH".into()], 8);
        let result = sup
            .exec(&req("sh", &["-c", "echo 1234; echo 56789"]), &PathBuf::from("."))
            .await
            .unwrap();
        assert_eq!(result.stdout, "1234\n");
    }

    #[tokio::test]
    async fn exec_empty_command_errors() {
        let request = ExecRequest::new("", Vec::<String>::new());
        assert!(supervisor().exec(&request, &PathBuf::from(".")).await.is_err());
    }

    #[tokio::test]
    async fn exec_missing_binary_errors() {
        let err = supervisor()
            .exec(&req("definitely-not-a-binary-xyz", &[]), &PathBuf::from("."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("spawn failed"));
    }
}
