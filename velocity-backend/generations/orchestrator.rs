//! Background generation run: credits, AI call, live preview.
//!
//! Sandbox failures never fail the run; the record falls back to the
//! static preview and keeps `sandbox_id` empty. Any other failure marks the
//! run failed and refunds the reserved credits.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use super::repository::GenerationRepository;
use super::{GenerationError, GenerationRecord, GenerationStatus, MVP_COST};
use crate::ai::prompt::clean_generated_code;
use crate::ai::{AiModel, CodeGenerator};
use crate::credits::CreditLedger;
use crate::sandbox::bootstrap::APP_COMPONENT_PATH;
use crate::sandbox::{SandboxError, SandboxFactory, SandboxManager};

/// Live preview produced for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub url: String,
    pub sandbox_id: Option<String>,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    pub generations: Arc<dyn GenerationRepository>,
    pub credits: Arc<dyn CreditLedger>,
    pub generator: Arc<dyn CodeGenerator>,
    pub factory: SandboxFactory,
    pub manager: Arc<SandboxManager>,
    pub static_preview_base: String,
}

impl GenerationOrchestrator {
    pub fn static_preview_url(&self, project_id: &str) -> String {
        format!("{}/{project_id}/preview", self.static_preview_base)
    }

    /// Validate a request, reserve credits, persist a queued record and run
    /// it in the background. Returns the queued record.
    pub async fn submit(
        &self,
        user_id: &str,
        prompt: &str,
        ai_model: &str,
    ) -> Result<GenerationRecord, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() || ai_model.trim().is_empty() {
            return Err(GenerationError::MissingInput);
        }
        let model = AiModel::parse(ai_model.trim())
            .map_err(|_| GenerationError::InvalidModel(ai_model.to_string()))?;

        let remaining = self.credits.reserve(user_id, MVP_COST).await?;
        tracing::info!(user_id = %user_id, remaining, "credits reserved");

        let record = GenerationRecord::queued(user_id, prompt, model.as_str(), MVP_COST);
        if let Err(e) = self.generations.save_generation(record.clone()).await {
            if let Err(refund) = self.credits.refund(user_id, MVP_COST).await {
                tracing::error!(user_id = %user_id, error = %refund, "credit refund failed");
            }
            return Err(e.into());
        }

        let orchestrator = self.clone();
        let queued = record.clone();
        tokio::spawn(async move {
            orchestrator.run(queued).await;
        });

        Ok(record)
    }

    /// Drive one queued record to `completed` or `failed`.
    #[tracing::instrument(skip_all, fields(generation_id = %record.id, model = %record.ai_model))]
    pub async fn run(&self, mut record: GenerationRecord) -> GenerationRecord {
        match self.generate(&mut record).await {
            Ok(()) => {
                tracing::info!(preview_url = ?record.preview_url, sandbox_id = ?record.sandbox_id, "generation completed");
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "generation failed");
                record.status = GenerationStatus::Failed;
                record.error = Some(format!("{e:#}"));
                self.save(&mut record).await;

                if record.credits_reserved > 0 {
                    if let Err(e) = self.credits.refund(&record.user_id, record.credits_reserved).await {
                        tracing::error!(user_id = %record.user_id, error = %e, "credit refund failed");
                    }
                }
            }
        }
        record
    }

    async fn generate(&self, record: &mut GenerationRecord) -> Result<()> {
        record.status = GenerationStatus::Running;
        self.generations
            .save_generation(record.clone())
            .await
            .context("failed to mark generation running")?;

        let model = AiModel::parse(&record.ai_model)?;
        let raw = self
            .generator
            .generate(&record.prompt, model)
            .await
            .context("code generation failed")?;
        let code = clean_generated_code(&raw);
        tracing::debug!(length = code.len(), "generated component");

        let preview = self.launch_preview(&record.project_id, &code).await;

        record.generated_code = Some(code);
        record.preview_url = Some(preview.url);
        record.sandbox_id = preview.sandbox_id;
        record.status = GenerationStatus::Completed;
        record.updated_at = Utc::now();
        self.generations
            .save_generation(record.clone())
            .await
            .context("failed to save completed generation")?;
        Ok(())
    }

    async fn save(&self, record: &mut GenerationRecord) {
        record.updated_at = Utc::now();
        if let Err(e) = self.generations.save_generation(record.clone()).await {
            tracing::error!(generation_id = %record.id, error = %e, "failed to persist generation");
        }
    }

    /// Create, bootstrap, and populate a sandbox. Falls back to the static
    /// preview on any sandbox error, cleaning up whatever was created.
    pub async fn launch_preview(&self, project_id: &str, code: &str) -> Preview {
        let provider = self.factory.build_provider();

        let info = match provider.create_sandbox().await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "sandbox creation failed, using static preview");
                return self.fallback(project_id);
            }
        };
        let sandbox_id = info.sandbox_id.clone();
        self.manager.register(&sandbox_id, provider.clone()).await;

        let setup: Result<(), SandboxError> = async {
            provider.setup_vite_app().await?;
            provider.write_file(APP_COMPONENT_PATH, code).await?;
            Ok(())
        }
        .await;

        match setup {
            Ok(()) => {
                let url = provider
                    .url()
                    .unwrap_or_else(|| self.static_preview_url(project_id));
                tracing::info!(sandbox_id = %sandbox_id, url = %url, "sandbox ready");
                Preview {
                    url,
                    sandbox_id: Some(sandbox_id),
                }
            }
            Err(e) => {
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "sandbox setup failed, using static preview");
                self.manager.remove(&sandbox_id).await;
                provider.terminate().await;
                self.fallback(project_id)
            }
        }
    }

    fn fallback(&self, project_id: &str) -> Preview {
        Preview {
            url: self.static_preview_url(project_id),
            sandbox_id: None,
        }
    }
}
