pub mod backend;
pub mod backends;
pub mod bootstrap;
pub mod dev_sandbox;
pub mod error;
pub mod executor;
pub mod handle;
pub mod listing;
pub mod local_host;
pub mod manager;
pub mod provider;
pub mod recovery;
pub mod transport;
pub mod types;
pub mod vercel;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

pub use error::SandboxError;
pub use manager::SandboxManager;
pub use provider::SandboxProvider;
pub use types::*;

use crate::config::SandboxSettings;
use backend::SandboxBackend;
use backends::local_host::LocalHostBackend;
use backends::vercel::VercelBackend;
use dev_sandbox::{DevSandbox, DevSandboxOptions};

/// Build a sandbox backend from runtime config.
pub fn build_backend(config: SandboxRuntimeConfig) -> Result<Arc<dyn SandboxBackend>, SandboxError> {
    match config {
        SandboxRuntimeConfig::Vercel(c) => {
            tracing::info!(
                api_url = %c.api_base_url,
                credentials = c.credentials.is_some(),
                "initializing Vercel sandbox backend"
            );
            Ok(Arc::new(VercelBackend::new(c)?))
        }
        SandboxRuntimeConfig::LocalHost(c) => {
            tracing::info!(
                root_dir = %c.root_dir.display(),
                "initializing local host sandbox backend"
            );
            Ok(Arc::new(LocalHostBackend::new(c)?))
        }
    }
}

/// Builds providers for one configured backend. Every provider shares the
/// backend (and with it the HTTP client).
#[derive(Clone)]
pub struct SandboxFactory {
    backend: Arc<dyn SandboxBackend>,
    options: DevSandboxOptions,
}

impl SandboxFactory {
    pub fn new(backend: Arc<dyn SandboxBackend>, options: DevSandboxOptions) -> Self {
        Self { backend, options }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Result<Self, SandboxError> {
        let backend = build_backend(settings.runtime_config())?;
        Ok(Self::new(backend, settings.dev_sandbox_options()))
    }

    pub fn backend_info(&self) -> SandboxBackendInfo {
        self.backend.info()
    }

    /// A fresh provider with no sandbox yet.
    pub fn build_provider(&self) -> Arc<dyn SandboxProvider> {
        Arc::new(DevSandbox::new(self.backend.clone(), self.options.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn settings(vars: &[(&str, &str)], data_dir: &Path) -> SandboxSettings {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SandboxSettings::from_lookup(data_dir, |key| vars.get(key).cloned())
    }

    #[test]
    fn factory_selects_vercel_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = SandboxFactory::from_settings(&settings(&[], tmp.path())).unwrap();
        assert_eq!(factory.backend_info().kind, SandboxBackendKind::Vercel);

        let provider = factory.build_provider();
        assert_eq!(provider.kind(), SandboxBackendKind::Vercel);
        assert_eq!(provider.state(), SandboxState::Uninitialized);
        assert!(!provider.is_alive());
    }

    #[test]
    fn factory_selects_local_host() {
        let tmp = tempfile::tempdir().unwrap();
        let factory =
            SandboxFactory::from_settings(&settings(&[("SANDBOX_PROVIDER", "local")], tmp.path()))
                .unwrap();
        assert_eq!(factory.backend_info().kind, SandboxBackendKind::LocalHost);
        assert!(tmp.path().join("sandboxes").is_dir());
    }

    #[tokio::test]
    async fn providers_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let factory =
            SandboxFactory::from_settings(&settings(&[("SANDBOX_PROVIDER", "local")], tmp.path()))
                .unwrap();

        let a = factory.build_provider();
        let b = factory.build_provider();
        let info = a.create_sandbox().await.unwrap();
        assert!(a.is_alive());
        assert!(!b.is_alive());
        assert_eq!(info.provider, SandboxBackendKind::LocalHost);
    }

    #[tokio::test]
    async fn unconfigured_vercel_fails_at_create() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = SandboxFactory::from_settings(&settings(&[], tmp.path())).unwrap();
        let err = factory.build_provider().create_sandbox().await.unwrap_err();
        assert!(matches!(err, SandboxError::NotConfigured(_)));
    }
}
