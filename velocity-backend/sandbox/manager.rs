use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::provider::SandboxProvider;

/// Process-wide registry of live providers, keyed by sandbox id.
///
/// Entries are not evicted on expiry; a gone sandbox stays registered until
/// someone removes it after observing the gone signal.
#[derive(Default)]
pub struct SandboxManager {
    providers: RwLock<HashMap<String, Arc<dyn SandboxProvider>>>,
}

impl SandboxManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the provider for `sandbox_id`.
    pub async fn register(&self, sandbox_id: &str, provider: Arc<dyn SandboxProvider>) {
        let replaced = self
            .providers
            .write()
            .await
            .insert(sandbox_id.to_string(), provider)
            .is_some();
        tracing::debug!(sandbox_id = %sandbox_id, replaced, "registered sandbox provider");
    }

    /// Register unless another task got there first. Returns whichever
    /// provider ends up in the registry.
    pub async fn register_if_absent(
        &self,
        sandbox_id: &str,
        provider: Arc<dyn SandboxProvider>,
    ) -> Arc<dyn SandboxProvider> {
        let mut providers = self.providers.write().await;
        providers
            .entry(sandbox_id.to_string())
            .or_insert(provider)
            .clone()
    }

    pub async fn get(&self, sandbox_id: &str) -> Option<Arc<dyn SandboxProvider>> {
        self.providers.read().await.get(sandbox_id).cloned()
    }

    /// Drop the entry. Does not terminate the provider.
    pub async fn remove(&self, sandbox_id: &str) -> Option<Arc<dyn SandboxProvider>> {
        let removed = self.providers.write().await.remove(sandbox_id);
        if removed.is_some() {
            tracing::debug!(sandbox_id = %sandbox_id, "unregistered sandbox provider");
        }
        removed
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn entries(&self) -> Vec<(String, Arc<dyn SandboxProvider>)> {
        let mut entries: Vec<_> = self
            .providers
            .read()
            .await
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::dev_sandbox::{DevSandbox, DevSandboxOptions};
    use crate::sandbox::testing::FakeBackend;

    fn provider(backend: &FakeBackend) -> Arc<dyn SandboxProvider> {
        Arc::new(DevSandbox::new(
            Arc::new(backend.clone()),
            DevSandboxOptions::default(),
        ))
    }

    #[tokio::test]
    async fn register_get_remove() {
        let backend = FakeBackend::new();
        let manager = SandboxManager::new();
        assert!(manager.is_empty().await);

        manager.register("sbx_1", provider(&backend)).await;
        assert!(manager.get("sbx_1").await.is_some());
        assert!(manager.get("sbx_2").await.is_none());
        assert_eq!(manager.ids().await, vec!["sbx_1".to_string()]);

        assert!(manager.remove("sbx_1").await.is_some());
        assert!(manager.remove("sbx_1").await.is_none());
        assert!(manager.get("sbx_1").await.is_none());
    }

    #[tokio::test]
    async fn register_replaces_existing_entry() {
        let backend = FakeBackend::new();
        let manager = SandboxManager::new();
        let first = provider(&backend);
        let second = provider(&backend);

        manager.register("sbx_1", first).await;
        manager.register("sbx_1", second.clone()).await;

        let current = manager.get("sbx_1").await.unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn register_if_absent_keeps_first_winner() {
        let backend = FakeBackend::new();
        let manager = Arc::new(SandboxManager::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let candidate = provider(&backend);
            tasks.push(tokio::spawn(async move {
                manager.register_if_absent("sbx_1", candidate).await
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            winners.push(task.await.unwrap());
        }

        assert_eq!(manager.len().await, 1);
        let stored = manager.get("sbx_1").await.unwrap();
        assert!(winners.iter().all(|w| Arc::ptr_eq(w, &stored)));
    }

    #[tokio::test]
    async fn entries_are_sorted_by_id() {
        let backend = FakeBackend::new();
        let manager = SandboxManager::new();
        manager.register("sbx_b", provider(&backend)).await;
        manager.register("sbx_a", provider(&backend)).await;

        let ids: Vec<String> = manager.entries().await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["sbx_a".to_string(), "sbx_b".to_string()]);
    }
}
