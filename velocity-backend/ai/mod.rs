pub mod anthropic;
pub mod openai_compat;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::AiSettings;
use anthropic::AnthropicClient;
use openai_compat::OpenAiCompatClient;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 8000;

#[derive(thiserror::Error, Debug)]
pub enum AiError {
    #[error("unsupported AI model: {0}")]
    UnsupportedModel(String),

    #[error("{0} API key not configured")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{provider} API returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("model returned no content")]
    Empty,
}

/// Model families a user can pick when generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiModel {
    Claude,
    Anthropic,
    OpenAi,
    Gemini,
    Groq,
}

impl AiModel {
    pub fn parse(raw: &str) -> Result<Self, AiError> {
        match raw {
            "CLAUDE" => Ok(Self::Claude),
            "ANTHROPIC" => Ok(Self::Anthropic),
            "OPENAI" => Ok(Self::OpenAi),
            "GEMINI" => Ok(Self::Gemini),
            "GROQ" => Ok(Self::Groq),
            other => Err(AiError::UnsupportedModel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "CLAUDE",
            Self::Anthropic => "ANTHROPIC",
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
            Self::Groq => "GROQ",
        }
    }

    /// Concrete model id sent to the provider's API.
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Claude | Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4-turbo",
            Self::Gemini => "gemini-2.0-flash-exp",
            Self::Groq => "llama-3.3-70b-versatile",
        }
    }
}

/// Turns a description into App.jsx source.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, model: AiModel) -> Result<String, AiError>;
}

/// One request to a chat-style completion API.
pub struct Completion<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct HttpCodeGenerator {
    http: reqwest::Client,
    settings: AiSettings,
}

impl HttpCodeGenerator {
    pub fn new(settings: AiSettings) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AiError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, settings })
    }

    fn key(value: &Option<String>, name: &'static str) -> Result<String, AiError> {
        value.clone().ok_or(AiError::MissingApiKey(name))
    }
}

#[async_trait]
impl CodeGenerator for HttpCodeGenerator {
    async fn generate(&self, description: &str, model: AiModel) -> Result<String, AiError> {
        let user = prompt::user_prompt(description);
        let completion = Completion {
            model: model.model_id(),
            system: prompt::SYSTEM_PROMPT,
            user: &user,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::info!(model = model.model_id(), "requesting code generation");

        let text = match model {
            AiModel::Claude | AiModel::Anthropic => {
                let key = Self::key(&self.settings.anthropic_api_key, "Anthropic")?;
                AnthropicClient::new(self.http.clone(), &self.settings.anthropic_base_url, key)
                    .complete(&completion)
                    .await?
            }
            AiModel::OpenAi => {
                let key = Self::key(&self.settings.openai_api_key, "OpenAI")?;
                OpenAiCompatClient::new(self.http.clone(), "OpenAI", &self.settings.openai_base_url, key)
                    .complete(&completion)
                    .await?
            }
            AiModel::Gemini => {
                let key = Self::key(&self.settings.gemini_api_key, "Gemini")?;
                OpenAiCompatClient::new(self.http.clone(), "Gemini", &self.settings.gemini_base_url, key)
                    .complete(&completion)
                    .await?
            }
            AiModel::Groq => {
                let key = Self::key(&self.settings.groq_api_key, "Groq")?;
                OpenAiCompatClient::new(self.http.clone(), "Groq", &self.settings.groq_base_url, key)
                    .complete(&completion)
                    .await?
            }
        };

        tracing::debug!(model = model.model_id(), length = text.len(), "code generation finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_model() {
        for raw in ["CLAUDE", "ANTHROPIC", "OPENAI", "GEMINI", "GROQ"] {
            assert_eq!(AiModel::parse(raw).unwrap().as_str(), raw);
        }
        assert!(matches!(AiModel::parse("claude"), Err(AiError::UnsupportedModel(_))));
        assert!(AiModel::parse("LLAMA").is_err());
    }

    #[test]
    fn claude_and_anthropic_share_a_model() {
        assert_eq!(AiModel::Claude.model_id(), AiModel::Anthropic.model_id());
        assert_eq!(AiModel::Groq.model_id(), "llama-3.3-70b-versatile");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let generator = HttpCodeGenerator::new(AiSettings::default()).unwrap();
        let err = generator.generate("todo app", AiModel::OpenAi).await.unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey("OpenAI")));
    }
}
