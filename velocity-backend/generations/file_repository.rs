use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::GenerationRecord;
use super::repository::GenerationRepository;

pub struct FileGenerationRepository {
    base_dir: PathBuf,
    generations: RwLock<HashMap<String, GenerationRecord>>,
}

impl FileGenerationRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            generations: RwLock::new(HashMap::new()),
        }
    }

    fn generations_dir(&self) -> PathBuf {
        self.base_dir.join("generations")
    }
}

#[async_trait]
impl GenerationRepository for FileGenerationRepository {
    async fn get_generation(&self, id: &str) -> Option<GenerationRecord> {
        self.generations.read().await.get(id).cloned()
    }

    async fn find_by_sandbox_id(&self, sandbox_id: &str) -> Option<GenerationRecord> {
        self.generations
            .read()
            .await
            .values()
            .filter(|g| g.sandbox_id.as_deref() == Some(sandbox_id))
            .max_by_key(|g| g.updated_at)
            .cloned()
    }

    async fn save_generation(&self, record: GenerationRecord) -> Result<()> {
        let dir = self.generations_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create generations dir: {}", dir.display()))?;

        let path = dir.join(format!("{}.json", record.id));
        let content =
            serde_json::to_string_pretty(&record).context("failed to serialize generation")?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write generation file: {}", path.display()))?;

        self.generations.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn load_all(&self) -> Result<()> {
        let dir = self.generations_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create generations dir: {}", dir.display()))?;

        let mut loaded = HashMap::new();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read generations dir: {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read generation file: {}", path.display()))?;
            match serde_json::from_str::<GenerationRecord>(&content) {
                Ok(record) => {
                    loaded.insert(record.id.clone(), record);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping invalid generation file");
                }
            }
        }

        if !loaded.is_empty() {
            tracing::info!(count = loaded.len(), "Loaded generation records");
        }
        *self.generations.write().await = loaded;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generations::GenerationStatus;

    fn record(sandbox_id: Option<&str>) -> GenerationRecord {
        let mut r = GenerationRecord::queued("alice", "todo app", "CLAUDE", 100);
        r.sandbox_id = sandbox_id.map(String::from);
        r
    }

    #[tokio::test]
    async fn save_then_reload_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileGenerationRepository::new(tmp.path());
        let mut r = record(Some("sbx_1"));
        r.status = GenerationStatus::Completed;
        r.preview_url = Some("https://x.example".into());
        repo.save_generation(r.clone()).await.unwrap();

        let fresh = FileGenerationRepository::new(tmp.path());
        assert!(fresh.get_generation(&r.id).await.is_none());
        fresh.load_all().await.unwrap();

        let loaded = fresh.get_generation(&r.id).await.unwrap();
        assert_eq!(loaded.status, GenerationStatus::Completed);
        assert_eq!(loaded.preview_url.as_deref(), Some("https://x.example"));
    }

    #[tokio::test]
    async fn find_by_sandbox_id_prefers_latest_update() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileGenerationRepository::new(tmp.path());

        let mut older = record(Some("sbx_1"));
        older.preview_url = Some("https://old.example".into());
        let mut newer = record(Some("sbx_1"));
        newer.preview_url = Some("https://new.example".into());
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);

        repo.save_generation(older).await.unwrap();
        repo.save_generation(newer).await.unwrap();
        repo.save_generation(record(None)).await.unwrap();

        let found = repo.find_by_sandbox_id("sbx_1").await.unwrap();
        assert_eq!(found.preview_url.as_deref(), Some("https://new.example"));
        assert!(repo.find_by_sandbox_id("sbx_2").await.is_none());
    }

    #[tokio::test]
    async fn invalid_files_are_skipped_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("generations");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let repo = FileGenerationRepository::new(tmp.path());
        repo.load_all().await.unwrap();
        assert!(repo.find_by_sandbox_id("anything").await.is_none());
    }
}
