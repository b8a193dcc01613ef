//! Phase pipeline, agent runners, and the bounded debug log.

pub mod debug_log;
pub mod engine;
pub mod runner;

pub use debug_log::{DebugEntry, DebugKind, DebugLog, DEBUG_LOG_CAPACITY};
pub use engine::{Orchestrator, OrchestratorConfig, Phase, RunOutcome};
pub use runner::{AgentRunner, WorkspaceAgentRunner};
