//! Process-wide registry of dynamically registrable model providers.
//!
//! Handlers registered here take precedence over the built-in builders in
//! [`ExecutorFactory`](super::executor::ExecutorFactory). The table is
//! global; `clear()` exists for test isolation.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::NamedModelConfig;
use crate::error::Result;

use super::executor::LlmExecutor;

/// A provider handler that can build executors and report its models.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Whether the provider can currently build an executor (credentials
    /// discoverable, service reachable in principle).
    fn is_available(&self) -> bool;

    /// Build an executor; may perform asynchronous setup such as token
    /// exchange.
    async fn create_executor(&self, config: &NamedModelConfig) -> Result<Arc<dyn LlmExecutor>>;

    /// Models known without network access (cached or static).
    fn available_models(&self) -> Vec<String>;

    /// Refresh the model list from the provider.
    async fn fetch_available_models(&self) -> Result<Vec<String>>;

    fn default_base_url(&self) -> Option<String>;
}

static REGISTRY: LazyLock<DashMap<String, Arc<dyn ModelProvider>>> = LazyLock::new(DashMap::new);

pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn register(tag: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        let tag = tag.into();
        debug!(provider = %tag, "Provider registered");
        REGISTRY.insert(tag, provider);
    }

    pub fn get(tag: &str) -> Option<Arc<dyn ModelProvider>> {
        REGISTRY.get(tag).map(|entry| Arc::clone(entry.value()))
    }

    pub fn unregister(tag: &str) -> bool {
        REGISTRY.remove(tag).is_some()
    }

    pub fn tags() -> Vec<String> {
        REGISTRY.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drop every registered provider. Test isolation only.
    pub fn clear() {
        REGISTRY.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutaError;

    struct DummyProvider;

    #[async_trait]
    impl ModelProvider for DummyProvider {
        fn is_available(&self) -> bool {
            true
        }

        async fn create_executor(
            &self,
            _config: &NamedModelConfig,
        ) -> Result<Arc<dyn LlmExecutor>> {
            Err(RoutaError::ProviderUnavailable("dummy".into()))
        }

        fn available_models(&self) -> Vec<String> {
            vec!["dummy-1".into()]
        }

        async fn fetch_available_models(&self) -> Result<Vec<String>> {
            Ok(self.available_models())
        }

        fn default_base_url(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_register_get_clear() {
        ProviderRegistry::clear();
        assert!(ProviderRegistry::get("DUMMY").is_none());

        ProviderRegistry::register("DUMMY", Arc::new(DummyProvider));
        let provider = ProviderRegistry::get("DUMMY").unwrap();
        assert!(provider.is_available());
        assert_eq!(provider.available_models(), vec!["dummy-1"]);
        assert!(ProviderRegistry::tags().contains(&"DUMMY".to_string()));

        ProviderRegistry::clear();
        assert!(ProviderRegistry::get("DUMMY").is_none());
    }
}
