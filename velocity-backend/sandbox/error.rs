use std::io;

/// Marker the remote infrastructure embeds in errors for a torn-down sandbox.
pub const SANDBOX_STOPPED_CODE: &str = "sandbox_stopped";

/// Errors from sandbox operations.
///
/// Backends map their transport errors into these variants. `SandboxGone`
/// is the one callers must tell apart from everything else: it means the
/// remote sandbox was reclaimed and the local handle is now useless.
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("sandbox credentials not configured: {0}")]
    NotConfigured(String),

    #[error("no active sandbox")]
    NoActiveSandbox,

    #[error("failed to write {path}: {stderr}")]
    FileWriteFailed { path: String, stderr: String },

    #[error("failed to read {path}: {stderr}")]
    FileReadFailed { path: String, stderr: String },

    #[error("sandbox_stopped: sandbox {0} is no longer available")]
    SandboxGone(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("provision failed: {0}")]
    Provision(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("timeout")]
    Timeout,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("serialization: {0}")]
    Serde(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl SandboxError {
    /// True when this error carries the remote "sandbox has been torn down"
    /// signal, either as the dedicated variant or embedded in a message.
    pub fn is_gone(&self) -> bool {
        match self {
            SandboxError::SandboxGone(_) => true,
            SandboxError::Backend(msg) | SandboxError::Exec(msg) => is_gone_signal(msg),
            _ => false,
        }
    }
}

/// Detect the gone signal in free text (stderr, HTTP error bodies).
pub fn is_gone_signal(text: &str) -> bool {
    text.contains(SANDBOX_STOPPED_CODE)
        || text.contains("410 Gone")
        || text.contains("Status code 410")
}
