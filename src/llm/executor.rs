//! Executor selection: runtime-registered providers first, then built-in
//! OpenAI-compatible builders keyed by provider tag.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use crate::config::NamedModelConfig;
use crate::error::{Result, RoutaError};

use super::models::{default_base_url, Provider};
use super::openai_client::{normalize_base_url, OpenAiCompatExecutor};
use super::registry::ProviderRegistry;
use super::types::{ChatRequest, ChatResponse, StreamEvent};

/// The capability the rest of the runtime programs against: send a chat
/// request, receive a full response or a stream of events.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    async fn execute(&self, request: ChatRequest) -> Result<ChatResponse>;

    async fn execute_streaming(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>>;
}

pub struct ExecutorFactory;

impl ExecutorFactory {
    /// Build an executor for a named config.
    ///
    /// A provider registered at runtime under the config's tag always
    /// wins; otherwise the tag must parse to a built-in provider.
    pub async fn create(config: &NamedModelConfig) -> Result<Arc<dyn LlmExecutor>> {
        if let Some(registered) = ProviderRegistry::get(&config.provider) {
            if !registered.is_available() {
                return Err(RoutaError::ProviderUnavailable(format!(
                    "Provider '{}' is registered but unavailable; check its \
                     credentials or remove the registration",
                    config.provider
                )));
            }
            debug!(provider = %config.provider, "Using registered provider");
            return registered.create_executor(config).await;
        }

        let provider = Provider::parse(&config.provider)?;
        let base_url = Self::resolve_base_url(provider, config)?;
        debug!(provider = %provider, base_url = %base_url, "Built-in executor created");

        Ok(Arc::new(OpenAiCompatExecutor::new(
            base_url,
            config.api_key.clone().unwrap_or_default(),
        )))
    }

    fn resolve_base_url(provider: Provider, config: &NamedModelConfig) -> Result<String> {
        let configured = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());

        let base = match provider {
            Provider::CustomOpenAiBase => configured.ok_or_else(|| {
                RoutaError::BadInput(
                    "CUSTOM_OPENAI_BASE requires an explicit base_url".into(),
                )
            })?,
            _ => match configured {
                Some(url) => url,
                None => default_base_url(provider).ok_or_else(|| {
                    RoutaError::ProviderUnavailable(format!(
                        "Provider {} has no default base URL; set base_url in the \
                         model config",
                        provider
                    ))
                })?,
            },
        };
        Ok(normalize_base_url(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_provider_dispatch() {
        let config = NamedModelConfig::new("t", "DEEPSEEK", "deepseek-chat").with_api_key("k");
        assert!(ExecutorFactory::create(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_every_builtin_tag_covered() {
        for provider in Provider::all() {
            let mut config =
                NamedModelConfig::new("t", provider.as_str(), "some-model").with_api_key("k");
            if *provider == Provider::CustomOpenAiBase {
                config = config.with_base_url("https://llm.internal/v1");
            }
            assert!(
                ExecutorFactory::create(&config).await.is_ok(),
                "no executor for {}",
                provider.as_str()
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = NamedModelConfig::new("t", "GROQ", "llama3");
        let err = ExecutorFactory::create(&config).await.err().unwrap();
        assert_eq!(err.kind(), "BAD_INPUT");
    }

    #[tokio::test]
    async fn test_custom_base_requires_url() {
        let config = NamedModelConfig::new("t", "CUSTOM_OPENAI_BASE", "local");
        let err = ExecutorFactory::create(&config).await.err().unwrap();
        assert_eq!(err.kind(), "BAD_INPUT");
    }

    #[test]
    fn test_base_url_normalized() {
        let config = NamedModelConfig::new("t", "OPENAI", "gpt-4.1")
            .with_base_url("https://proxy.example.com/v1");
        let url = ExecutorFactory::resolve_base_url(Provider::OpenAi, &config).unwrap();
        assert_eq!(url, "https://proxy.example.com/v1/");
    }

    #[test]
    fn test_ollama_default() {
        let config = NamedModelConfig::new("t", "OLLAMA", "llama3");
        let url = ExecutorFactory::resolve_base_url(Provider::Ollama, &config).unwrap();
        assert_eq!(url, "http://localhost:11434/v1/");
    }
}
