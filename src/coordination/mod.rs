//! Coordination state, event broadcast, and the typed agent-tool surface.

pub mod event_bus;
pub mod store;
pub mod tools;
pub mod types;

pub use event_bus::{BusStats, Event, EventBus, EventSubscriber, Subscription};
pub use store::CoordinationStore;
pub use tools::{AgentTools, ToolOutcome};
pub use types::{
    Agent, AgentRole, AgentStatus, CompletionReport, ConversationMessage, MessageKind, ModelTier,
    Task, TaskStatus, ToolCall, ToolResult,
};
