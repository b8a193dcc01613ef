//! In-memory coordination state for a set of workspaces.
//!
//! Agents, tasks, and per-agent conversations live behind one store-level
//! reader-writer lock; writers validate referential integrity and
//! forward-only status transitions before mutating anything.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, RoutaError};

use super::types::{
    Agent, AgentRole, AgentStatus, ConversationMessage, Task, TaskStatus,
};

#[derive(Default)]
struct StoreInner {
    agents: HashMap<String, Agent>,
    agent_order: Vec<String>,
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
    conversations: HashMap<String, Vec<ConversationMessage>>,
}

/// Synchronous in-memory store. One lock per store; readers share.
#[derive(Default)]
pub struct CoordinationStore {
    inner: RwLock<StoreInner>,
}

impl CoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an agent.
    ///
    /// On update the status may only move forward; on insert a declared
    /// parent must already exist in the same workspace. A workspace holds
    /// exactly one ROUTA agent, so a second Routa-role write is rejected
    /// on every path, not just `initialize_workspace`.
    pub fn save_agent(&self, agent: Agent) -> Result<()> {
        let mut inner = self.inner.write();

        if agent.role == AgentRole::Routa {
            let duplicate = inner.agents.values().any(|existing| {
                existing.role == AgentRole::Routa
                    && existing.workspace_id == agent.workspace_id
                    && existing.id != agent.id
            });
            if duplicate {
                return Err(RoutaError::InvalidState(format!(
                    "Workspace {} already has a ROUTA agent",
                    agent.workspace_id
                )));
            }
        }

        if let Some(parent_id) = &agent.parent_id {
            let parent = inner
                .agents
                .get(parent_id)
                .ok_or_else(|| RoutaError::NotFound(format!("Parent agent {}", parent_id)))?;
            if parent.workspace_id != agent.workspace_id {
                return Err(RoutaError::InvalidState(format!(
                    "Parent agent {} belongs to workspace {}",
                    parent_id, parent.workspace_id
                )));
            }
        }

        match inner.agents.get(&agent.id) {
            Some(existing) => {
                if !existing.status.can_transition_to(agent.status) {
                    return Err(RoutaError::InvalidState(format!(
                        "Agent {} cannot move {} -> {}",
                        agent.id,
                        existing.status.as_str(),
                        agent.status.as_str()
                    )));
                }
            }
            None => {
                let id = agent.id.clone();
                inner.agent_order.push(id);
            }
        }

        debug!(agent_id = %agent.id, status = agent.status.as_str(), "Agent saved");
        inner.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Result<Agent> {
        self.inner
            .read()
            .agents
            .get(id)
            .cloned()
            .ok_or_else(|| RoutaError::NotFound(format!("Agent {}", id)))
    }

    /// Agents of a workspace, ordered by creation time.
    pub fn list_agents(&self, workspace_id: &str) -> Vec<Agent> {
        let inner = self.inner.read();
        inner
            .agent_order
            .iter()
            .filter_map(|id| inner.agents.get(id))
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Move an agent's status forward, refreshing `updated_at`.
    pub fn update_agent_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| RoutaError::NotFound(format!("Agent {}", id)))?;
        if !agent.status.can_transition_to(status) {
            return Err(RoutaError::InvalidState(format!(
                "Agent {} cannot move {} -> {}",
                id,
                agent.status.as_str(),
                status.as_str()
            )));
        }
        agent.status = status;
        agent.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Insert or update a task.
    ///
    /// A declared assignee must exist; on update the status may only move
    /// forward.
    pub fn save_task(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.write();

        if let Some(assignee) = &task.assigned_to {
            if !inner.agents.contains_key(assignee) {
                return Err(RoutaError::NotFound(format!("Agent {}", assignee)));
            }
        }

        match inner.tasks.get(&task.id) {
            Some(existing) => {
                if !existing.status.can_transition_to(task.status) {
                    return Err(RoutaError::InvalidState(format!(
                        "Task {} cannot move {} -> {}",
                        task.id,
                        existing.status.as_str(),
                        task.status.as_str()
                    )));
                }
            }
            None => {
                let id = task.id.clone();
                inner.task_order.push(id);
            }
        }

        debug!(task_id = %task.id, status = task.status.as_str(), "Task saved");
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        self.inner
            .read()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| RoutaError::NotFound(format!("Task {}", id)))
    }

    pub fn tasks_for_agent(&self, agent_id: &str) -> Vec<Task> {
        let inner = self.inner.read();
        inner
            .task_order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.assigned_to.as_deref() == Some(agent_id))
            .cloned()
            .collect()
    }

    /// Move a task's status forward and optionally (re)assign it.
    pub fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        assigned_to: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write();

        if let Some(assignee) = assigned_to {
            if !inner.agents.contains_key(assignee) {
                return Err(RoutaError::NotFound(format!("Agent {}", assignee)));
            }
        }

        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| RoutaError::NotFound(format!("Task {}", id)))?;
        if !task.status.can_transition_to(status) {
            return Err(RoutaError::InvalidState(format!(
                "Task {} cannot move {} -> {}",
                id,
                task.status.as_str(),
                status.as_str()
            )));
        }
        task.status = status;
        if let Some(assignee) = assigned_to {
            task.assigned_to = Some(assignee.to_string());
        }
        task.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Append to an agent's conversation. The store lock is the per-agent
    /// serialization point, so concurrent appends keep wall-clock order.
    pub fn append_message(&self, message: ConversationMessage) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.agents.contains_key(&message.agent_id) {
            return Err(RoutaError::NotFound(format!("Agent {}", message.agent_id)));
        }
        inner
            .conversations
            .entry(message.agent_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    /// Read an agent's conversation, most-recent-last.
    ///
    /// `last_n` limits to the trailing window after kind filtering;
    /// tool-call/tool-result traffic is dropped unless requested.
    pub fn read_conversation(
        &self,
        agent_id: &str,
        last_n: Option<usize>,
        include_tool_calls: bool,
    ) -> Result<Vec<ConversationMessage>> {
        let inner = self.inner.read();
        if !inner.agents.contains_key(agent_id) {
            return Err(RoutaError::NotFound(format!("Agent {}", agent_id)));
        }

        let filtered: Vec<ConversationMessage> = inner
            .conversations
            .get(agent_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| include_tool_calls || !m.kind.is_tool_traffic())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        match last_n {
            Some(n) if n < filtered.len() => Ok(filtered[filtered.len() - n..].to_vec()),
            _ => Ok(filtered),
        }
    }

    /// Idempotent workspace bootstrap: creates the singleton ROUTA agent if
    /// absent and returns its id.
    pub fn initialize_workspace(&self, workspace_id: &str) -> Result<String> {
        if let Some(existing) = self
            .list_agents(workspace_id)
            .into_iter()
            .find(|a| a.role == AgentRole::Routa)
        {
            return Ok(existing.id);
        }

        let routa = Agent::new("ROUTA", AgentRole::Routa, workspace_id)
            .with_status(AgentStatus::Active);
        let id = routa.id.clone();
        self.save_agent(routa)?;
        debug!(workspace_id, routa_id = %id, "Workspace initialized");
        Ok(id)
    }

    pub fn agent_count(&self) -> usize {
        self.inner.read().agents.len()
    }

    pub fn task_count(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Drop all state. Test isolation only.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = StoreInner::default();
    }
}
