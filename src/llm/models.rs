//! Provider tags and pure model-metadata lookup.
//!
//! Capabilities and context lengths derive from model-name substrings per
//! a fixed table; unknown names fall back to a generic completion model
//! with a configurable default context length.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    Ollama,
    OpenRouter,
    Glm,
    Qwen,
    Kimi,
    MiniMax,
    CustomOpenAiBase,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::Google => "GOOGLE",
            Self::DeepSeek => "DEEPSEEK",
            Self::Ollama => "OLLAMA",
            Self::OpenRouter => "OPENROUTER",
            Self::Glm => "GLM",
            Self::Qwen => "QWEN",
            Self::Kimi => "KIMI",
            Self::MiniMax => "MINIMAX",
            Self::CustomOpenAiBase => "CUSTOM_OPENAI_BASE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "OPENAI" => Ok(Self::OpenAi),
            "ANTHROPIC" => Ok(Self::Anthropic),
            "GOOGLE" => Ok(Self::Google),
            "DEEPSEEK" => Ok(Self::DeepSeek),
            "OLLAMA" => Ok(Self::Ollama),
            "OPENROUTER" => Ok(Self::OpenRouter),
            "GLM" => Ok(Self::Glm),
            "QWEN" => Ok(Self::Qwen),
            "KIMI" => Ok(Self::Kimi),
            "MINIMAX" => Ok(Self::MiniMax),
            "CUSTOM_OPENAI_BASE" => Ok(Self::CustomOpenAiBase),
            other => Err(RoutaError::BadInput(format!("Unknown provider '{}'", other))),
        }
    }

    /// All providers with a built-in executor builder.
    pub fn all() -> &'static [Provider] {
        &[
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Google,
            Provider::DeepSeek,
            Provider::Ollama,
            Provider::OpenRouter,
            Provider::Glm,
            Provider::Qwen,
            Provider::Kimi,
            Provider::MiniMax,
            Provider::CustomOpenAiBase,
        ]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    Completion,
    Temperature,
    Tools,
    ToolChoice,
    VisionImage,
    VisionVideo,
    Audio,
    Document,
    MultipleChoices,
    Speculation,
    Embed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMeta {
    pub provider: Provider,
    pub id: String,
    pub capabilities: BTreeSet<ModelCapability>,
    pub context_length: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

struct MetaRule {
    /// Any of these substrings in the model name selects the rule.
    needles: &'static [&'static str],
    context_length: u32,
    max_output_tokens: u32,
    capabilities: &'static [ModelCapability],
}

use ModelCapability as Cap;

const CHAT_CAPS: &[Cap] = &[
    Cap::Completion,
    Cap::Temperature,
    Cap::Tools,
    Cap::ToolChoice,
];
const VISION_CAPS: &[Cap] = &[
    Cap::Completion,
    Cap::Temperature,
    Cap::Tools,
    Cap::ToolChoice,
    Cap::VisionImage,
    Cap::Document,
];
const REASONING_CAPS: &[Cap] = &[Cap::Completion, Cap::Tools, Cap::ToolChoice];

/// First matching rule wins; order from most to least specific.
static META_RULES: LazyLock<Vec<MetaRule>> = LazyLock::new(|| {
    vec![
        MetaRule {
            needles: &["o1", "o3", "o4-mini"],
            context_length: 200_000,
            max_output_tokens: 100_000,
            capabilities: REASONING_CAPS,
        },
        MetaRule {
            needles: &["gpt-4.1"],
            context_length: 1_047_576,
            max_output_tokens: 32_768,
            capabilities: VISION_CAPS,
        },
        MetaRule {
            needles: &["gpt-4o"],
            context_length: 128_000,
            max_output_tokens: 16_384,
            capabilities: VISION_CAPS,
        },
        MetaRule {
            needles: &["claude-3-5", "claude-3.5"],
            context_length: 200_000,
            max_output_tokens: 8_192,
            capabilities: VISION_CAPS,
        },
        MetaRule {
            needles: &["claude-3-7", "claude-sonnet-4", "claude-opus-4"],
            context_length: 200_000,
            max_output_tokens: 64_000,
            capabilities: VISION_CAPS,
        },
        MetaRule {
            needles: &["gemini-2.5", "gemini-2.0"],
            context_length: 1_048_576,
            max_output_tokens: 65_536,
            capabilities: VISION_CAPS,
        },
        MetaRule {
            needles: &["deepseek-reasoner", "deepseek-r1"],
            context_length: 65_536,
            max_output_tokens: 8_192,
            capabilities: REASONING_CAPS,
        },
        MetaRule {
            needles: &["deepseek"],
            context_length: 65_536,
            max_output_tokens: 8_192,
            capabilities: CHAT_CAPS,
        },
        MetaRule {
            needles: &["glm-4"],
            context_length: 128_000,
            max_output_tokens: 16_384,
            capabilities: CHAT_CAPS,
        },
        MetaRule {
            needles: &["qwen"],
            context_length: 131_072,
            max_output_tokens: 8_192,
            capabilities: CHAT_CAPS,
        },
        MetaRule {
            needles: &["kimi", "moonshot"],
            context_length: 131_072,
            max_output_tokens: 16_384,
            capabilities: CHAT_CAPS,
        },
        MetaRule {
            needles: &["minimax", "abab"],
            context_length: 204_800,
            max_output_tokens: 16_384,
            capabilities: CHAT_CAPS,
        },
        MetaRule {
            needles: &["text-embedding", "embedding"],
            context_length: 8_192,
            max_output_tokens: 0,
            capabilities: &[Cap::Embed],
        },
    ]
});

/// Curated per-provider model names for UIs and validation; dynamic
/// providers (OpenRouter, Ollama, custom bases) report none.
pub fn available_models(provider: Provider) -> Vec<&'static str> {
    match provider {
        Provider::OpenAi => vec!["gpt-4.1", "gpt-4.1-mini", "gpt-4o", "gpt-4o-mini", "o3", "o4-mini"],
        Provider::Anthropic => vec![
            "claude-3-5-sonnet-latest",
            "claude-3-5-haiku-latest",
            "claude-3-7-sonnet-latest",
            "claude-sonnet-4-20250514",
        ],
        Provider::Google => vec!["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"],
        Provider::DeepSeek => vec!["deepseek-chat", "deepseek-reasoner"],
        Provider::Glm => vec!["glm-4-plus", "glm-4-air", "glm-4-flash"],
        Provider::Qwen => vec!["qwen-max", "qwen-plus", "qwen-turbo"],
        Provider::Kimi => vec!["kimi-k2-0711-preview", "moonshot-v1-128k"],
        Provider::MiniMax => vec!["MiniMax-Text-01", "abab6.5s-chat"],
        Provider::Ollama | Provider::OpenRouter | Provider::CustomOpenAiBase => vec![],
    }
}

/// Default chat-completions base URL per provider, trailing slash included
/// (downstream URL joining replaces the last segment otherwise).
pub fn default_base_url(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAi => Some("https://api.openai.com/v1/"),
        Provider::Anthropic => Some("https://api.anthropic.com/v1/"),
        Provider::Google => Some("https://generativelanguage.googleapis.com/v1beta/openai/"),
        Provider::DeepSeek => Some("https://api.deepseek.com/v1/"),
        Provider::Ollama => Some("http://localhost:11434/v1/"),
        Provider::OpenRouter => Some("https://openrouter.ai/api/v1/"),
        Provider::Glm => Some("https://open.bigmodel.cn/api/paas/v4/"),
        Provider::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1/"),
        Provider::Kimi => Some("https://api.moonshot.cn/v1/"),
        Provider::MiniMax => Some("https://api.minimax.io/v1/"),
        Provider::CustomOpenAiBase => None,
    }
}

/// Fallback context length when a model name matches no rule.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 32_768;

/// Pure metadata lookup keyed by name substrings. The provider argument is
/// carried into the result as given.
pub fn create_model(provider: Provider, name: &str) -> ModelMeta {
    create_model_with_default(provider, name, DEFAULT_CONTEXT_LENGTH)
}

pub fn create_model_with_default(
    provider: Provider,
    name: &str,
    default_context_length: u32,
) -> ModelMeta {
    let lowered = name.to_lowercase();
    for rule in META_RULES.iter() {
        if rule.needles.iter().any(|needle| lowered.contains(needle)) {
            return ModelMeta {
                provider,
                id: name.to_string(),
                capabilities: rule.capabilities.iter().copied().collect(),
                context_length: rule.context_length,
                max_output_tokens: (rule.max_output_tokens > 0).then_some(rule.max_output_tokens),
            };
        }
    }
    ModelMeta {
        provider,
        id: name.to_string(),
        capabilities: [Cap::Completion, Cap::Temperature].into_iter().collect(),
        context_length: default_context_length,
        max_output_tokens: None,
    }
}
