use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::sandbox::dev_sandbox::DevSandboxOptions;
use crate::sandbox::types::{
    LocalHostConfig, SandboxBackendKind, SandboxRuntimeConfig, SandboxSpec, VercelConfig,
    VercelCredentials,
};

const DEFAULT_VERCEL_API: &str = "https://api.vercel.com";

/// Server configuration loaded from environment variables.
pub struct Config {
    pub port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub data_dir: PathBuf,
    /// Bearer token -> user id. Empty disables authentication.
    pub auth_tokens: HashMap<String, String>,
    pub default_credit_balance: i64,
    pub static_preview_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("SENTRY_DSN").ok().as_deref(),
            std::env::var("ENVIRONMENT").ok().as_deref(),
            std::env::var("VELOCITY_DATA_DIR").ok().as_deref(),
            std::env::var("AUTH_TOKENS").ok().as_deref(),
            std::env::var("DEFAULT_CREDIT_BALANCE").ok().as_deref(),
            std::env::var("STATIC_PREVIEW_BASE").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(
        port: Option<&str>,
        sentry_dsn: Option<&str>,
        environment: Option<&str>,
        data_dir: Option<&str>,
        auth_tokens: Option<&str>,
        default_credit_balance: Option<&str>,
        static_preview_base: Option<&str>,
    ) -> Self {
        let port = port.and_then(|v| v.parse().ok()).unwrap_or(8081);

        let sentry_dsn = non_empty(sentry_dsn).map(String::from);

        let environment = non_empty(environment)
            .map(String::from)
            .unwrap_or_else(|| "local".to_string());

        let data_dir = non_empty(data_dir).map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".velocity")
        });

        let auth_tokens = non_empty(auth_tokens)
            .map(parse_auth_tokens)
            .unwrap_or_default();

        let default_credit_balance = default_credit_balance
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(500);

        let static_preview_base = non_empty(static_preview_base)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "/dashboard/projects".to_string());

        Config {
            port,
            sentry_dsn,
            environment,
            data_dir,
            auth_tokens,
            default_credit_balance,
            static_preview_base,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// `alice=tok1,bob=tok2` -> {tok1: alice, tok2: bob}. Malformed pairs are skipped.
fn parse_auth_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (user, token) = pair.split_once('=')?;
            let (user, token) = (user.trim(), token.trim());
            (!user.is_empty() && !token.is_empty()).then(|| (token.to_string(), user.to_string()))
        })
        .collect()
}

/// Sandbox backend selection and tuning.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub provider: SandboxBackendKind,
    pub vercel: VercelConfig,
    pub local_root: PathBuf,
    pub npm_flags: Vec<String>,
    pub auto_restart_dev_server: bool,
    pub sandbox_timeout: Duration,
    pub command_timeout: Option<Duration>,
}

impl SandboxSettings {
    pub fn from_env(data_dir: &std::path::Path) -> Self {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Same as `from_env` with the variable source injected, for tests.
    pub fn from_lookup<F>(data_dir: &std::path::Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("SANDBOX_PROVIDER").as_deref() {
            Some("local") | Some("local_host") => SandboxBackendKind::LocalHost,
            _ => SandboxBackendKind::Vercel,
        };

        let credentials = match (
            get("VERCEL_TEAM_ID"),
            get("VERCEL_PROJECT_ID"),
            get("VERCEL_TOKEN"),
            get("VERCEL_OIDC_TOKEN"),
        ) {
            (Some(team_id), Some(project_id), Some(token), _) => Some(VercelCredentials::Team {
                team_id,
                project_id,
                token,
            }),
            (_, _, _, Some(token)) => Some(VercelCredentials::Oidc { token }),
            _ => None,
        };

        let vercel = VercelConfig {
            api_base_url: get("VERCEL_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_VERCEL_API.to_string()),
            credentials,
        };

        let local_root = get("LOCAL_SANDBOX_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("sandboxes"));

        let npm_flags = get("NPM_FLAGS")
            .map(|f| f.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let auto_restart_dev_server = get("AUTO_RESTART_VITE").as_deref() == Some("true");

        let sandbox_timeout = get("SANDBOX_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| SandboxSpec::default().timeout);

        let command_timeout = get("SANDBOX_COMMAND_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            provider,
            vercel,
            local_root,
            npm_flags,
            auto_restart_dev_server,
            sandbox_timeout,
            command_timeout,
        }
    }

    pub fn runtime_config(&self) -> SandboxRuntimeConfig {
        match self.provider {
            SandboxBackendKind::Vercel => SandboxRuntimeConfig::Vercel(self.vercel.clone()),
            SandboxBackendKind::LocalHost => SandboxRuntimeConfig::LocalHost(LocalHostConfig {
                root_dir: self.local_root.clone(),
                ..Default::default()
            }),
        }
    }

    pub fn dev_sandbox_options(&self) -> DevSandboxOptions {
        DevSandboxOptions {
            spec: SandboxSpec {
                timeout: self.sandbox_timeout,
                ..SandboxSpec::default()
            },
            npm_flags: self.npm_flags.clone(),
            auto_restart_dev_server: self.auto_restart_dev_server,
            command_timeout: self.command_timeout,
            ..DevSandboxOptions::default()
        }
    }
}

/// API keys for the code generation models. Missing keys fail the
/// generation that needs them, not startup.
#[derive(Debug, Clone, Default)]
pub struct AiSettings {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub groq_base_url: String,
}

impl AiSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let base = |key: &str, default: &str| {
            get(key)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            gemini_api_key: get("GEMINI_API_KEY"),
            groq_api_key: get("GROQ_API_KEY"),
            anthropic_base_url: base("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
            openai_base_url: base("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            gemini_base_url: base(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta/openai",
            ),
            groq_base_url: base("GROQ_BASE_URL", "https://api.groq.com/openai/v1"),
        }
    }
}
