//! GitHub Copilot as a runtime-registrable provider.
//!
//! The local Copilot client's OAuth token is exchanged for a short-lived
//! API token; both the token and the model catalog are cached behind
//! independent locks so a token refresh never blocks a catalog read.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::NamedModelConfig;
use crate::error::{Result, RoutaError};

use super::executor::LlmExecutor;
use super::openai_client::OpenAiCompatExecutor;
use super::registry::{ModelProvider, ProviderRegistry};

pub const COPILOT_PROVIDER_TAG: &str = "COPILOT";

const TOKEN_EXCHANGE_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const MODELS_URL: &str = "https://api.githubcopilot.com/models";
const API_BASE_URL: &str = "https://api.githubcopilot.com/";

const EDITOR_VERSION: &str = "Zed/Unknown";
const INTEGRATION_ID: &str = "vscode-chat";

/// Tokens with less remaining lifetime than this are re-exchanged.
const TOKEN_REFRESH_MARGIN_MINS: i64 = 5;

/// Model catalog cache lifetime.
const MODELS_CACHE_TTL_MINS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CopilotApiToken {
    pub token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl CopilotApiToken {
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or_else(Utc::now)
    }

    /// Fresh means at least the refresh margin of lifetime remains.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc() - now >= Duration::minutes(TOKEN_REFRESH_MARGIN_MINS)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CopilotModel {
    id: String,

    #[serde(default)]
    model_picker_enabled: bool,

    #[serde(default)]
    capabilities: CopilotModelCapabilities,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CopilotModelCapabilities {
    #[serde(default, rename = "type")]
    kind: String,
}

impl CopilotModel {
    fn is_usable(&self) -> bool {
        self.model_picker_enabled && self.capabilities.kind != "embeddings"
    }
}

#[derive(Debug, Clone)]
struct CachedModels {
    models: Vec<String>,
    fetched_at: DateTime<Utc>,
}

/// Locate the Copilot client config written by an external Copilot
/// installation. Never written by this runtime.
pub fn copilot_config_path() -> Option<PathBuf> {
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata).join("github-copilot").join("apps.json"));
        }
    }
    std::env::var("HOME").ok().map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("github-copilot")
            .join("apps.json")
    })
}

/// Recursively search a JSON document for any `oauth_token` value. The
/// apps.json layout varies across Copilot client versions; the token key
/// is the stable part.
pub fn search_oauth_token(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(token) = map.get("oauth_token").and_then(|t| t.as_str()) {
                return Some(token.to_string());
            }
            map.values().find_map(search_oauth_token)
        }
        serde_json::Value::Array(items) => items.iter().find_map(search_oauth_token),
        _ => None,
    }
}

fn read_oauth_token() -> Result<String> {
    let path = copilot_config_path().ok_or_else(|| {
        RoutaError::ProviderUnavailable("No home directory for Copilot config discovery".into())
    })?;
    let content = std::fs::read_to_string(&path).map_err(|_| {
        RoutaError::ProviderUnavailable(format!(
            "Copilot config not found at {}; sign in with a Copilot-enabled editor first",
            path.display()
        ))
    })?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    search_oauth_token(&json).ok_or_else(|| {
        RoutaError::ProviderUnavailable("No oauth_token in Copilot config".into())
    })
}

pub struct CopilotProvider {
    http: reqwest::Client,
    token_cache: Mutex<Option<CopilotApiToken>>,
    models_cache: Mutex<Option<CachedModels>>,
}

impl Default for CopilotProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CopilotProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            token_cache: Mutex::new(None),
            models_cache: Mutex::new(None),
        }
    }

    /// Register this provider in the process-wide registry.
    pub fn register() {
        ProviderRegistry::register(COPILOT_PROVIDER_TAG, Arc::new(Self::new()));
    }

    /// The cached API token, if it still has enough lifetime left.
    fn cached_api_token(&self, now: DateTime<Utc>) -> Option<CopilotApiToken> {
        self.token_cache
            .lock()
            .as_ref()
            .filter(|token| token.is_fresh(now))
            .cloned()
    }

    /// Current API token, exchanging the local OAuth token when the cache
    /// is empty or within the refresh margin.
    pub async fn get_api_token(&self) -> Result<CopilotApiToken> {
        if let Some(token) = self.cached_api_token(Utc::now()) {
            return Ok(token);
        }

        let oauth_token = read_oauth_token()?;
        debug!("Exchanging Copilot OAuth token for API token");

        let response = self
            .http
            .get(TOKEN_EXCHANGE_URL)
            .header("Authorization", format!("token {}", oauth_token))
            .header("Editor-Version", EDITOR_VERSION)
            .send()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Token exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutaError::Upstream(format!(
                "Token exchange failed with {}",
                status
            )));
        }

        let token: CopilotApiToken = response
            .json()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Malformed token response: {}", e)))?;

        info!(expires_at = token.expires_at, "Copilot API token refreshed");
        *self.token_cache.lock() = Some(token.clone());
        Ok(token)
    }

    fn cached_models(&self, now: DateTime<Utc>) -> Option<Vec<String>> {
        self.models_cache
            .lock()
            .as_ref()
            .filter(|cached| now - cached.fetched_at < Duration::minutes(MODELS_CACHE_TTL_MINS))
            .map(|cached| cached.models.clone())
    }

    /// Enabled, non-embedding model ids; cached for an hour unless a
    /// refresh is forced.
    pub async fn fetch_models(&self, force_refresh: bool) -> Result<Vec<String>> {
        if !force_refresh {
            if let Some(models) = self.cached_models(Utc::now()) {
                return Ok(models);
            }
        }

        let token = self.get_api_token().await?;
        let response = self
            .http
            .get(MODELS_URL)
            .bearer_auth(&token.token)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Copilot-Integration-Id", INTEGRATION_ID)
            .send()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Model catalog fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutaError::Upstream(format!(
                "Model catalog fetch failed with {}",
                status
            )));
        }

        #[derive(Deserialize)]
        struct Catalog {
            #[serde(default)]
            data: Vec<CopilotModel>,
        }

        let catalog: Catalog = response
            .json()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Malformed catalog response: {}", e)))?;

        let models: Vec<String> = catalog
            .data
            .into_iter()
            .filter(CopilotModel::is_usable)
            .map(|m| m.id)
            .collect();

        debug!(count = models.len(), "Copilot model catalog refreshed");
        *self.models_cache.lock() = Some(CachedModels {
            models: models.clone(),
            fetched_at: Utc::now(),
        });
        Ok(models)
    }
}

#[async_trait]
impl ModelProvider for CopilotProvider {
    fn is_available(&self) -> bool {
        read_oauth_token().is_ok()
    }

    async fn create_executor(&self, _config: &NamedModelConfig) -> Result<Arc<dyn LlmExecutor>> {
        let token = self.get_api_token().await?;
        Ok(Arc::new(
            OpenAiCompatExecutor::new(API_BASE_URL, token.token)
                .with_header("Editor-Version", EDITOR_VERSION)
                .with_header("Copilot-Integration-Id", INTEGRATION_ID),
        ))
    }

    fn available_models(&self) -> Vec<String> {
        self.cached_models(Utc::now()).unwrap_or_default()
    }

    async fn fetch_available_models(&self) -> Result<Vec<String>> {
        self.fetch_models(true).await
    }

    fn default_base_url(&self) -> Option<String> {
        Some(API_BASE_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(minutes: i64) -> CopilotApiToken {
        CopilotApiToken {
            token: "tid_test".into(),
            expires_at: (Utc::now() + Duration::minutes(minutes)).timestamp(),
        }
    }

    #[test]
    fn test_token_within_margin_is_stale() {
        let provider = CopilotProvider::new();
        *provider.token_cache.lock() = Some(token_expiring_in(4));

        // 4 minutes remaining is under the 5-minute margin, so the cache
        // misses and the next get_api_token() would re-exchange.
        assert!(provider.cached_api_token(Utc::now()).is_none());
    }

    #[test]
    fn test_token_outside_margin_is_reused() {
        let provider = CopilotProvider::new();
        *provider.token_cache.lock() = Some(token_expiring_in(10));

        let cached = provider.cached_api_token(Utc::now());
        assert_eq!(cached.unwrap().token, "tid_test");
    }

    #[test]
    fn test_is_fresh_boundary() {
        // Whole-second clock so the boundary comparison is exact.
        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let token = CopilotApiToken {
            token: "t".into(),
            expires_at: (now + Duration::minutes(5)).timestamp(),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(61)));
    }

    #[test]
    fn test_oauth_token_recursive_search() {
        let json = serde_json::json!({
            "github.com:59ae07": {
                "user": "someone",
                "oauth_token": "gho_abc123",
                "githubAppId": "Iv1.x"
            }
        });
        assert_eq!(search_oauth_token(&json).unwrap(), "gho_abc123");

        let nested = serde_json::json!({
            "apps": [{"auth": {"oauth_token": "gho_nested"}}]
        });
        assert_eq!(search_oauth_token(&nested).unwrap(), "gho_nested");

        let none = serde_json::json!({"user": "someone"});
        assert!(search_oauth_token(&none).is_none());
    }

    #[test]
    fn test_model_filtering() {
        let model = |id: &str, enabled: bool, kind: &str| CopilotModel {
            id: id.into(),
            model_picker_enabled: enabled,
            capabilities: CopilotModelCapabilities { kind: kind.into() },
        };

        assert!(model("gpt-4.1", true, "chat").is_usable());
        assert!(!model("gpt-4.1", false, "chat").is_usable());
        assert!(!model("text-embedding-3-small", true, "embeddings").is_usable());
    }

    #[test]
    fn test_models_cache_ttl() {
        let provider = CopilotProvider::new();
        *provider.models_cache.lock() = Some(CachedModels {
            models: vec!["gpt-4.1".into()],
            fetched_at: Utc::now() - Duration::minutes(30),
        });
        assert_eq!(provider.cached_models(Utc::now()).unwrap(), vec!["gpt-4.1"]);

        *provider.models_cache.lock() = Some(CachedModels {
            models: vec!["gpt-4.1".into()],
            fetched_at: Utc::now() - Duration::minutes(90),
        });
        assert!(provider.cached_models(Utc::now()).is_none());
    }
}
