pub mod file_repository;
pub mod orchestrator;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credits charged for one generation.
pub const MVP_COST: i64 = 100;

const PROJECT_NAME_LIMIT: usize = 50;

/// Why a generation request was refused before any work started.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("Prompt and AI model are required")]
    MissingInput,

    #[error("Invalid AI model selected")]
    InvalidModel(String),

    #[error(transparent)]
    Credits(#[from] crate::credits::CreditError),

    #[error("failed to store generation: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Durable record of one generation run. The sandbox routes use
/// `sandbox_id` + `preview_url` to reattach after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub prompt: String,
    pub ai_model: String,
    pub status: GenerationStatus,
    #[serde(default)]
    pub sandbox_id: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub generated_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub credits_reserved: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationRecord {
    pub fn queued(user_id: &str, prompt: &str, ai_model: &str, credits_reserved: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            project_id: uuid::Uuid::new_v4().to_string(),
            project_name: project_name(prompt),
            prompt: prompt.to_string(),
            ai_model: ai_model.to_string(),
            status: GenerationStatus::Queued,
            sandbox_id: None,
            preview_url: None,
            generated_code: None,
            error: None,
            credits_reserved,
            created_at: now,
            updated_at: now,
        }
    }
}

/// First 50 characters of the prompt, with `...` when cut.
pub fn project_name(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.chars().count() > PROJECT_NAME_LIMIT {
        let head: String = prompt.chars().take(PROJECT_NAME_LIMIT).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}
