//! Model configuration loaded from the user's YAML config file.
//!
//! One file holds any number of named configs; the `active` key selects
//! the one in use. The file lives at the platform-standard user-config
//! path and is only ever read by the runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoutaError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedModelConfig {
    pub name: String,
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub model: String,
}

impl NamedModelConfig {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            api_key: None,
            base_url: None,
            model: model.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfigFile {
    #[serde(default)]
    pub active: Option<String>,

    #[serde(default)]
    pub configs: Vec<NamedModelConfig>,
}

impl ModelConfigFile {
    /// The config selected by `active`, or the single entry when only one
    /// exists and no selection is set.
    pub fn active_config(&self) -> Result<&NamedModelConfig> {
        match &self.active {
            Some(active) => self
                .configs
                .iter()
                .find(|c| &c.name == active)
                .ok_or_else(|| {
                    RoutaError::BadInput(format!(
                        "Active config '{}' not present in configs",
                        active
                    ))
                }),
            None if self.configs.len() == 1 => Ok(&self.configs[0]),
            None => Err(RoutaError::BadInput(
                "No active model config selected".into(),
            )),
        }
    }
}

/// Platform-standard config file location.
pub fn default_config_path() -> Result<PathBuf> {
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Ok(PathBuf::from(appdata).join("routa").join("models.yaml"));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| RoutaError::BadInput("Neither HOME nor USERPROFILE is set".into()))?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("routa")
        .join("models.yaml"))
}

pub async fn load_config_file(path: &Path) -> Result<ModelConfigFile> {
    let content = tokio::fs::read_to_string(path).await?;
    let file: ModelConfigFile = serde_yaml_bw::from_str(&content)?;
    debug!(path = %path.display(), configs = file.configs.len(), "Model config loaded");
    Ok(file)
}

/// Load the active model config from the default location.
pub async fn load_active_model_config() -> Result<NamedModelConfig> {
    let path = default_config_path()?;
    let file = load_config_file(&path).await?;
    file.active_config().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_and_select_active() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            r#"
active: work
configs:
  - name: personal
    provider: OLLAMA
    model: llama3
  - name: work
    provider: OPENAI
    api_key: sk-test
    model: gpt-4.1
"#,
        )
        .unwrap();

        let file = load_config_file(&path).await.unwrap();
        let active = file.active_config().unwrap();
        assert_eq!(active.name, "work");
        assert_eq!(active.provider, "OPENAI");
        assert_eq!(active.model, "gpt-4.1");
    }

    #[test]
    fn test_single_config_without_active() {
        let file = ModelConfigFile {
            active: None,
            configs: vec![NamedModelConfig::new("only", "OPENAI", "gpt-4.1")],
        };
        assert_eq!(file.active_config().unwrap().name, "only");
    }

    #[test]
    fn test_missing_active_rejected() {
        let file = ModelConfigFile {
            active: Some("ghost".into()),
            configs: vec![NamedModelConfig::new("only", "OPENAI", "gpt-4.1")],
        };
        let err = file.active_config().unwrap_err();
        assert_eq!(err.kind(), "BAD_INPUT");
    }
}
