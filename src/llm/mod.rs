//! LLM executor façade: provider selection, model metadata, streaming.

pub mod copilot;
pub mod executor;
pub mod models;
pub mod openai_client;
pub mod registry;
pub mod stream;
pub mod types;

pub use copilot::{CopilotApiToken, CopilotProvider, COPILOT_PROVIDER_TAG};
pub use executor::{ExecutorFactory, LlmExecutor};
pub use models::{
    available_models, create_model, default_base_url, ModelCapability, ModelMeta, Provider,
};
pub use openai_client::{normalize_base_url, OpenAiCompatExecutor};
pub use registry::{ModelProvider, ProviderRegistry};
pub use stream::{StreamChunk, ThinkingPhase, ToolCallStatus};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ChatRole, NativeToolSpec, StreamEvent};
