//! How the orchestrator actually runs an agent of a given role.
//!
//! The trait exists so the phase pipeline can be driven by scripted
//! runners in tests; the production implementation wires a
//! [`WorkspaceAgent`] per invocation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::agent::{build_system_prompt, role_profile, CancellationRegistry, WorkspaceAgent};
use crate::coordination::types::AgentRole;
use crate::error::Result;
use crate::llm::stream::StreamChunk;
use crate::llm::LlmExecutor;
use crate::tooling::TextToolExecutor;

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, role: AgentRole, agent_id: &str, prompt: &str) -> Result<String>;

    /// Streaming variant; the default delegates to `run` without chunks.
    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        _chunks: UnboundedSender<StreamChunk>,
    ) -> Result<String> {
        self.run(role, agent_id, prompt).await
    }
}

/// Production runner: one workspace agent per invocation, sharing an LLM
/// executor, working directory, and cancellation registry.
pub struct WorkspaceAgentRunner {
    executor: Arc<dyn LlmExecutor>,
    model: String,
    cwd: PathBuf,
    cancellation: Arc<CancellationRegistry>,
}

impl WorkspaceAgentRunner {
    pub fn new(
        executor: Arc<dyn LlmExecutor>,
        model: impl Into<String>,
        cwd: impl Into<PathBuf>,
        cancellation: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            executor,
            model: model.into(),
            cwd: cwd.into(),
            cancellation,
        }
    }

    fn build_agent(&self, role: AgentRole, agent_id: &str) -> (WorkspaceAgent, String) {
        let tools = TextToolExecutor::new(&self.cwd);
        let system_prompt = build_system_prompt(role, &tools.descriptors());
        let agent = WorkspaceAgent::new(
            agent_id,
            &self.model,
            Arc::clone(&self.executor),
            tools,
            Arc::clone(&self.cancellation),
        )
        .with_max_iterations(role_profile(role).max_iterations);
        (agent, system_prompt)
    }
}

#[async_trait]
impl AgentRunner for WorkspaceAgentRunner {
    async fn run(&self, role: AgentRole, agent_id: &str, prompt: &str) -> Result<String> {
        let (agent, system_prompt) = self.build_agent(role, agent_id);
        agent.run(&system_prompt, prompt).await
    }

    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        chunks: UnboundedSender<StreamChunk>,
    ) -> Result<String> {
        let (agent, system_prompt) = self.build_agent(role, agent_id);
        agent.run_streaming(&system_prompt, prompt, chunks).await
    }
}
