//! Routa-Core: a multi-agent coordination runtime.
//!
//! A root planner (ROUTA) decomposes a request into task blocks, worker
//! agents (CRAFTER) implement them through a text-based LLM tool loop,
//! and a verifier (GATE) issues the final verdict. The runtime provides
//! the coordination store and event bus tying the agents together, the
//! task-block parser, the tool-call extraction/execution machinery, the
//! phase orchestrator, an LLM executor façade with a registrable
//! provider table, and the A2A command surface for remote clients.

pub mod a2a;
pub mod agent;
pub mod config;
pub mod coordination;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod planning;
pub mod tooling;
pub mod util;

pub use a2a::CommandDispatcher;
pub use agent::{CancellationRegistry, WorkspaceAgent};
pub use config::{load_active_model_config, ModelConfigFile, NamedModelConfig};
pub use coordination::{
    Agent, AgentRole, AgentStatus, AgentTools, CompletionReport, ConversationMessage,
    CoordinationStore, Event, EventBus, MessageKind, ModelTier, Task, TaskStatus, ToolCall,
    ToolOutcome, ToolResult,
};
pub use error::{Result, RoutaError};
pub use llm::{
    ChatMessage, ChatRequest, ChatResponse, CopilotProvider, ExecutorFactory, LlmExecutor,
    ModelProvider, Provider, ProviderRegistry, StreamChunk, StreamEvent,
};
pub use orchestrator::{
    AgentRunner, Orchestrator, OrchestratorConfig, Phase, RunOutcome, WorkspaceAgentRunner,
};
pub use planning::{format_task, parse_tasks};
pub use tooling::{extract_tool_calls, format_results, TextToolExecutor, ToolDescriptor, TypedTool};
