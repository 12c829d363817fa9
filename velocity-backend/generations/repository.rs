use anyhow::Result;
use async_trait::async_trait;

use super::GenerationRecord;

#[async_trait]
pub trait GenerationRepository: Send + Sync {
    async fn get_generation(&self, id: &str) -> Option<GenerationRecord>;
    /// Most recently updated record pointing at this sandbox.
    async fn find_by_sandbox_id(&self, sandbox_id: &str) -> Option<GenerationRecord>;
    async fn save_generation(&self, record: GenerationRecord) -> Result<()>;
    async fn load_all(&self) -> Result<()>;
}
