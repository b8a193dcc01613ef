use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Root planner; decomposes a request into task blocks.
    Routa,
    /// Worker; implements a single task through the text tool loop.
    Crafter,
    /// Verifier; issues an approve/reject verdict.
    Gate,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routa => "ROUTA",
            Self::Crafter => "CRAFTER",
            Self::Gate => "GATE",
        }
    }

    /// Strict parse: unknown role strings are rejected, not defaulted.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ROUTA" => Ok(Self::Routa),
            "CRAFTER" => Ok(Self::Crafter),
            "GATE" => Ok(Self::Gate),
            other => Err(RoutaError::BadInput(format!(
                "Unknown agent role '{}' (expected ROUTA, CRAFTER, or GATE)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Active,
    Completed,
    Error,
    Cancelled,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed | Self::Error | Self::Cancelled => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Agent status only moves forward: PENDING → ACTIVE → terminal.
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Fast,
    Balanced,
    Smart,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "FAST",
            Self::Balanced => "BALANCED",
            Self::Smart => "SMART",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "FAST" => Ok(Self::Fast),
            "BALANCED" => Ok(Self::Balanced),
            "SMART" => Ok(Self::Smart),
            other => Err(RoutaError::BadInput(format!(
                "Unknown model tier '{}' (expected FAST, BALANCED, or SMART)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub workspace_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_tier: Option<ModelTier>,

    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, role: AgentRole, workspace_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            role,
            workspace_id: workspace_id.into(),
            parent_id: None,
            model_tier: None,
            status: AgentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_model_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = Some(tier);
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Task status only moves forward: PENDING → IN_PROGRESS → terminal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub objective: String,

    #[serde(default)]
    pub scope: Vec<String>,

    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    #[serde(default)]
    pub verification_commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    pub status: TaskStatus,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            objective: String::new(),
            scope: Vec::new(),
            acceptance_criteria: Vec::new(),
            verification_commands: Vec::new(),
            assigned_to: None,
            status: TaskStatus::Pending,
            workspace_id: workspace_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    pub fn with_verification_commands(mut self, commands: Vec<String>) -> Self {
        self.verification_commands = commands;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    System,
}

impl MessageKind {
    pub fn is_tool_traffic(&self) -> bool {
        matches!(self, Self::ToolCall | Self::ToolResult)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub agent_id: String,
    pub from_agent_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(
        agent_id: impl Into<String>,
        from_agent_id: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            from_agent_id: from_agent_id.into(),
            content: content.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Produced by a worker agent and handed to its parent when a task ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    pub agent_id: String,
    pub task_id: String,
    pub summary: String,

    #[serde(default)]
    pub files_modified: Vec<String>,

    pub success: bool,
}

/// A structured tool invocation extracted from LLM output text.
///
/// Argument values are the raw string forms produced by extraction; the
/// text-based executor rebuilds typed values against the tool descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,

    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
        }
    }

    pub fn error(tool_name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: format!("Error: {}", message),
        }
    }
}
