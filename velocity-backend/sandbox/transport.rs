//! File transport: bulk write with a shell fallback, and `cat`-based reads.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::error::{is_gone_signal, SandboxError};
use super::executor;
use super::handle::SandboxHandle;
use super::types::{ExecRequest, PutFileRequest};

/// Resolve `path` against the sandbox root unless it is already absolute.
pub fn resolve_path(root: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), path.trim_start_matches("./"))
    }
}

/// Escape for the inside of a double-quoted shell word.
fn escape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Encode `content` so that `printf '%b' "<encoded>"` reproduces it exactly.
///
/// Two layers: `%b` escapes first (backslash, newline, NUL), then the
/// double-quote layer (backslash, quote, dollar, backtick).
pub fn escape_for_printf(content: &str) -> String {
    let mut printf_layer = String::with_capacity(content.len() + 16);
    for c in content.chars() {
        match c {
            '\\' => printf_layer.push_str("\\\\"),
            '\n' => printf_layer.push_str("\\n"),
            '\0' => printf_layer.push_str("\\0000"),
            _ => printf_layer.push(c),
        }
    }
    escape_double_quoted(&printf_layer)
}

fn fallback_script(full_path: &str, content: &str) -> String {
    format!(
        "printf '%b' \"{}\" > \"{}\"",
        escape_for_printf(content),
        escape_double_quoted(full_path)
    )
}

/// Write `content` to `path` inside the sandbox.
///
/// Tries the backend's bulk write first. Any failure there falls back to
/// `mkdir -p` plus a `printf` redirect; a nonzero exit from that fails
/// with `FileWriteFailed` (or `SandboxGone` when stderr carries the signal).
pub async fn write_file(
    handle: Option<Arc<dyn SandboxHandle>>,
    path: &str,
    content: &str,
    timeout: Option<Duration>,
) -> Result<(), SandboxError> {
    let handle = handle.ok_or(SandboxError::NoActiveSandbox)?;
    let full_path = resolve_path(handle.root(), path);

    tracing::debug!(
        sandbox_id = %handle.id(),
        path = %full_path,
        bytes = content.len(),
        "writing file"
    );

    let primary = handle
        .write_files(vec![PutFileRequest {
            path: full_path.clone(),
            bytes: content.as_bytes().to_vec(),
        }])
        .await;

    let err = match primary {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    tracing::warn!(
        sandbox_id = %handle.id(),
        path = %full_path,
        error = %err,
        "bulk write failed, falling back to shell write"
    );

    if let Some(parent) = Path::new(&full_path).parent().and_then(|p| p.to_str()) {
        if !parent.is_empty() && parent != "/" {
            let mkdir = ExecRequest::new("mkdir", ["-p", parent]).with_timeout(timeout);
            let res = executor::run_command(Some(handle.clone()), mkdir).await?;
            if !res.success {
                tracing::debug!(dir = %parent, stderr = %res.stderr, "mkdir -p failed");
            }
        }
    }

    let write = ExecRequest::shell(fallback_script(&full_path, content)).with_timeout(timeout);
    let res = executor::run_command(Some(handle.clone()), write).await?;
    if res.success {
        tracing::debug!(path = %full_path, "shell fallback write succeeded");
        return Ok(());
    }

    if is_gone_signal(&res.stderr) {
        return Err(SandboxError::SandboxGone(handle.id().to_string()));
    }
    Err(SandboxError::FileWriteFailed {
        path: path.to_string(),
        stderr: res.stderr,
    })
}

/// Read a file through `cat`.
pub async fn read_file(
    handle: Option<Arc<dyn SandboxHandle>>,
    path: &str,
    timeout: Option<Duration>,
) -> Result<String, SandboxError> {
    let handle = handle.ok_or(SandboxError::NoActiveSandbox)?;
    let full_path = resolve_path(handle.root(), path);

    let req = ExecRequest::new("cat", [full_path]).with_timeout(timeout);
    let res = executor::run_command(Some(handle.clone()), req).await?;
    if res.success {
        return Ok(res.stdout);
    }

    if is_gone_signal(&res.stderr) {
        return Err(SandboxError::SandboxGone(handle.id().to_string()));
    }
    Err(SandboxError::FileReadFailed {
        path: path.to_string(),
        stderr: res.stderr,
    })
}
